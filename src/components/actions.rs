use uuid::Uuid;

use crate::components::history::CursorMode;
use crate::session::EditingSession;

/// Every user-triggerable edit. Front ends query [`is_enabled`](Self::is_enabled)
/// to grey out controls and hand the action to [`EditingSession::perform`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditAction {
    Undo,
    Redo,
    ApplyMaterial,
    ClearLayers,
    RemoveOverlay(Uuid),
    MoveToFront(Uuid),
    MoveToBack(Uuid),
    SwitchCursor(CursorMode),
}

impl EditAction {
    pub fn label(&self) -> &'static str {
        match self {
            EditAction::Undo => "Undo",
            EditAction::Redo => "Redo",
            EditAction::ApplyMaterial => "Apply Material",
            EditAction::ClearLayers => "Clear Layers",
            EditAction::RemoveOverlay(_) => "Remove Overlay",
            EditAction::MoveToFront(_) => "Bring to Front",
            EditAction::MoveToBack(_) => "Send to Back",
            EditAction::SwitchCursor(CursorMode::Draw) => "Draw Polygon",
            EditAction::SwitchCursor(CursorMode::Move) => "Move Overlays",
        }
    }

    pub fn is_enabled(&self, session: &EditingSession) -> bool {
        match *self {
            EditAction::Undo => session.can_undo() && !session.is_applying(),
            EditAction::Redo => session.can_redo() && !session.is_applying(),
            EditAction::ApplyMaterial => session.can_apply(),
            EditAction::ClearLayers => !session.overlays().is_empty() || !session.draft().is_empty(),
            EditAction::RemoveOverlay(id) => session.overlays().find(id).is_some(),
            EditAction::MoveToFront(id) => session.overlays().can_move_to_front(id),
            EditAction::MoveToBack(id) => session.overlays().can_move_to_back(id),
            EditAction::SwitchCursor(mode) => session.cursor_mode() != mode,
        }
    }
}
