// ============================================================================
// EDITING SESSION — overlay state, draft polygon, history and applies
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbaImage;
use uuid::Uuid;

use crate::components::actions::EditAction;
use crate::components::history::{CursorMode, DraftPolygon, HistoryStack, UiSnapshot};
use crate::material::MaterialCatalog;
use crate::ops::geometry::Point;
use crate::ops::perspective::{ComposeError, Patch, warp_and_mask};
use crate::overlay::{Overlay, OverlaySequence};
use crate::settings::CompositorSettings;

/// Where the session is in the load / select / draw / apply cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    NoImage,
    ImageLoaded,
    MaterialSelected,
    PolygonClosed,
}

/// Why an apply did not add an overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyError {
    NoImage,
    NoMaterial,
    DegeneratePolygon,
    AlreadyApplied,
    /// Another apply is still running.
    Busy,
    /// The state changed while the apply ran; the result was discarded.
    Stale,
    Cancelled,
    Compose(ComposeError),
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::NoImage => write!(f, "no base image loaded"),
            ApplyError::NoMaterial => write!(f, "no material selected"),
            ApplyError::DegeneratePolygon => write!(f, "polygon does not enclose an area"),
            ApplyError::AlreadyApplied => write!(f, "polygon has already been applied"),
            ApplyError::Busy => write!(f, "an apply is already in progress"),
            ApplyError::Stale => write!(f, "editing state changed during apply; result discarded"),
            ApplyError::Cancelled => write!(f, "apply was cancelled"),
            ApplyError::Compose(e) => write!(f, "compositing failed: {}", e),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplyError::Compose(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ComposeError> for ApplyError {
    fn from(e: ComposeError) -> Self {
        ApplyError::Compose(e)
    }
}

// ---------------------------------------------------------------------------
//  Apply jobs
// ---------------------------------------------------------------------------

/// Inputs captured for one apply; runs without touching the session.
#[derive(Clone, Debug)]
pub struct ApplyRequest {
    generation: u64,
    material: Arc<RgbaImage>,
    polygon: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

impl ApplyRequest {
    pub fn run(self) -> ApplyOutcome {
        let result = warp_and_mask(&self.material, &self.polygon, &self.holes);
        ApplyOutcome {
            generation: self.generation,
            polygon: self.polygon,
            holes: self.holes,
            result,
        }
    }
}

/// A finished compositing job, handed back to [`EditingSession::complete_apply`].
#[derive(Debug)]
pub struct ApplyOutcome {
    pub generation: u64,
    pub polygon: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
    pub result: Result<Patch, ComposeError>,
}

/// Handle to an apply running on the rayon pool.
pub struct ApplyTask {
    generation: u64,
    receiver: async_channel::Receiver<ApplyOutcome>,
    cancelled: Arc<AtomicBool>,
}

impl ApplyTask {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the worker. `Cancelled` if it was cancelled or died.
    pub async fn wait(self) -> Result<ApplyOutcome, ApplyError> {
        self.receiver.recv().await.map_err(|_| ApplyError::Cancelled)
    }

    /// Non-blocking poll.
    pub fn try_outcome(&self) -> Option<Result<ApplyOutcome, ApplyError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(async_channel::TryRecvError::Empty) => None,
            Err(async_channel::TryRecvError::Closed) => Some(Err(ApplyError::Cancelled)),
        }
    }

    /// Ask the worker to skip the job if it has not started yet, and drop any
    /// result it still produces.
    pub fn cancel(self) {
        self.cancelled.store(true, Ordering::Release);
        self.receiver.close();
    }
}

// ---------------------------------------------------------------------------
//  Session
// ---------------------------------------------------------------------------

/// Owns the live editing state and its history.
pub struct EditingSession {
    state: UiSnapshot,
    history: HistoryStack,
    settings: CompositorSettings,
    /// Bumped whenever an in-flight apply's inputs may have changed.
    generation: u64,
    /// Generation the running apply was started at.
    pending: Option<u64>,
}

impl Default for EditingSession {
    fn default() -> Self {
        Self::new(CompositorSettings::default())
    }
}

impl EditingSession {
    pub fn new(settings: CompositorSettings) -> Self {
        let mut history = HistoryStack::new(settings.history_limit_opt());
        let state = UiSnapshot::default();
        history.reset(state.clone());
        Self {
            state,
            history,
            settings,
            generation: 0,
            pending: None,
        }
    }

    // --- accessors ---------------------------------------------------------

    pub fn state(&self) -> &UiSnapshot {
        &self.state
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn base_image(&self) -> Option<&RgbaImage> {
        self.state.base.as_deref()
    }

    pub fn catalog(&self) -> &MaterialCatalog {
        &self.state.catalog
    }

    pub fn selected_material(&self) -> Option<usize> {
        self.state.selected_material
    }

    pub fn overlays(&self) -> &OverlaySequence {
        &self.state.overlays
    }

    pub fn draft(&self) -> &DraftPolygon {
        &self.state.draft
    }

    pub fn cursor_mode(&self) -> CursorMode {
        self.state.cursor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_applying(&self) -> bool {
        self.pending.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.state.base.is_none() {
            SessionPhase::NoImage
        } else if self.selected_material_image().is_none() {
            SessionPhase::ImageLoaded
        } else if self.state.draft.is_ready() {
            SessionPhase::PolygonClosed
        } else {
            SessionPhase::MaterialSelected
        }
    }

    pub fn can_apply(&self) -> bool {
        self.pending.is_none() && self.phase() == SessionPhase::PolygonClosed
    }

    /// Base image with every overlay drawn on top.
    pub fn flatten(&self) -> Option<RgbaImage> {
        self.base_image().map(|base| self.state.overlays.flatten(base))
    }

    fn selected_material_image(&self) -> Option<&Arc<RgbaImage>> {
        let idx = self.state.selected_material?;
        self.state.catalog.get(idx).map(|m| &m.image)
    }

    // --- bookkeeping -------------------------------------------------------

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn sync_flags(&mut self) {
        self.state.can_undo = self.history.can_undo();
        self.state.can_redo = self.history.can_redo();
    }

    /// Push the live state; `false` when nothing changed.
    fn record(&mut self, description: &str) -> bool {
        let changed = self.history.push(description, self.state.clone());
        if changed {
            log::debug!("history: {} ({} undo steps)", description, self.history.undo_count());
        }
        self.sync_flags();
        changed
    }

    /// Fold the live state into the top history entry. Used for edits that
    /// are not undo steps of their own: draft geometry, selection, cursor.
    fn amend(&mut self, description: &str) -> bool {
        let changed = self.history.amend(self.state.clone());
        if changed {
            log::trace!("history: {} folded into live entry", description);
        }
        self.sync_flags();
        changed
    }

    // --- image and materials -----------------------------------------------

    /// Replace the base image. Overlays and the draft are dropped and history
    /// restarts from the new image.
    pub fn load_base_image(&mut self, image: RgbaImage) {
        log::info!("base image loaded: {}x{}", image.width(), image.height());
        self.state.base = Some(Arc::new(image));
        self.state.overlays.clear();
        self.state.draft = DraftPolygon::default();
        self.history.reset(self.state.clone());
        self.sync_flags();
        self.bump();
    }

    /// Replace the material catalog. The selection is kept only if it still
    /// points at a material. Loading materials is not undoable: every history
    /// entry switches to the new catalog.
    pub fn set_catalog(&mut self, catalog: MaterialCatalog) {
        let catalog = Arc::new(catalog);
        let fit = |s: &mut UiSnapshot| {
            s.catalog = Arc::clone(&catalog);
            if s.selected_material.is_some_and(|i| i >= catalog.len()) {
                s.selected_material = None;
            }
        };
        fit(&mut self.state);
        self.history.update_all(fit);
        log::info!("material catalog loaded: {} materials", catalog.len());
        self.sync_flags();
        self.bump();
    }

    /// Select a material by catalog index, or clear the selection with `None`.
    pub fn select_material(&mut self, index: Option<usize>) -> bool {
        if index.is_some_and(|i| i >= self.state.catalog.len()) {
            return false;
        }
        if self.state.selected_material == index {
            return false;
        }
        self.state.selected_material = index;
        self.bump();
        self.amend("Select material")
    }

    pub fn set_cursor_mode(&mut self, mode: CursorMode) -> bool {
        if self.state.cursor == mode {
            return false;
        }
        self.state.cursor = mode;
        self.amend("Switch cursor")
    }

    // --- draft polygon -----------------------------------------------------

    /// Add a vertex. Drawing after an apply starts a fresh polygon.
    pub fn add_point(&mut self, p: Point) -> bool {
        if !p.is_finite() {
            return false;
        }
        if self.state.draft.applied {
            self.state.draft = DraftPolygon::default();
        }
        self.state.draft.points.push(p);
        self.bump();
        self.amend("Add point")
    }

    pub fn move_point(&mut self, index: usize, p: Point) -> bool {
        if !p.is_finite() {
            return false;
        }
        let draft = &mut self.state.draft;
        match draft.points.get_mut(index) {
            Some(slot) if *slot != p => {
                *slot = p;
                draft.applied = false;
            }
            _ => return false,
        }
        self.bump();
        self.amend("Move point")
    }

    pub fn remove_last_point(&mut self) -> bool {
        if self.state.draft.points.pop().is_none() {
            return false;
        }
        self.state.draft.applied = false;
        self.bump();
        self.amend("Remove point")
    }

    /// Cut a hole out of the draft region. Needs at least three points.
    pub fn add_hole(&mut self, hole: Vec<Point>) -> bool {
        if hole.len() < 3 || hole.iter().any(|p| !p.is_finite()) {
            return false;
        }
        self.state.draft.holes.push(hole);
        self.state.draft.applied = false;
        self.bump();
        self.amend("Add hole")
    }

    pub fn clear_draft(&mut self) -> bool {
        if self.state.draft == DraftPolygon::default() {
            return false;
        }
        self.state.draft = DraftPolygon::default();
        self.bump();
        self.amend("Clear polygon")
    }

    // --- overlays ----------------------------------------------------------

    pub fn remove_overlay(&mut self, id: Uuid) -> bool {
        if self.state.overlays.remove(id).is_none() {
            return false;
        }
        self.record("Remove overlay")
    }

    pub fn move_to_front(&mut self, id: Uuid) -> bool {
        self.state.overlays.move_to_front(id) && self.record("Bring to front")
    }

    pub fn move_to_back(&mut self, id: Uuid) -> bool {
        self.state.overlays.move_to_back(id) && self.record("Send to back")
    }

    /// Drag an overlay. Each call is one history step.
    pub fn translate_overlay(&mut self, id: Uuid, dx: f64, dy: f64) -> bool {
        self.state.overlays.translate(id, dx, dy) && self.record("Move overlay")
    }

    /// Remove every overlay and the draft as one step.
    pub fn clear_layers(&mut self) -> bool {
        if self.state.overlays.is_empty() && self.state.draft == DraftPolygon::default() {
            return false;
        }
        self.state.overlays.clear();
        self.state.draft = DraftPolygon::default();
        self.bump();
        self.record("Clear layers")
    }

    /// Put back overlays loaded from disk, on top of any already present.
    pub fn restore_overlays(&mut self, overlays: impl IntoIterator<Item = Overlay>) -> usize {
        let mut added = 0;
        for o in overlays {
            self.state.overlays.push(o);
            added += 1;
        }
        if added > 0 {
            self.record("Restore overlays");
        }
        added
    }

    // --- history -----------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else { return false };
        self.state = snapshot.clone();
        self.sync_flags();
        self.bump();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else { return false };
        self.state = snapshot.clone();
        self.sync_flags();
        self.bump();
        true
    }

    // --- apply -------------------------------------------------------------

    /// Capture what an apply needs from the live state.
    pub fn prepare_apply(&self) -> Result<ApplyRequest, ApplyError> {
        if self.pending.is_some() {
            return Err(ApplyError::Busy);
        }
        if self.state.base.is_none() {
            return Err(ApplyError::NoImage);
        }
        let material = self.selected_material_image().ok_or(ApplyError::NoMaterial)?;
        let draft = &self.state.draft;
        if !draft.is_closed() {
            return Err(ApplyError::DegeneratePolygon);
        }
        if draft.applied {
            return Err(ApplyError::AlreadyApplied);
        }
        Ok(ApplyRequest {
            generation: self.generation,
            material: Arc::clone(material),
            polygon: draft.points.clone(),
            holes: draft.holes.clone(),
        })
    }

    /// Warp the selected material onto the draft polygon on the calling
    /// thread and add the result as the top overlay.
    pub fn apply_material(&mut self) -> Result<Uuid, ApplyError> {
        let outcome = self.prepare_apply()?.run();
        self.finish_apply(outcome)
    }

    /// Start an apply on the rayon pool. Hand the outcome to
    /// [`complete_apply`](Self::complete_apply) once it arrives.
    pub fn start_apply(&mut self) -> Result<ApplyTask, ApplyError> {
        let request = self.prepare_apply()?;
        let generation = request.generation;
        let (sender, receiver) = async_channel::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        rayon::spawn(move || {
            if flag.load(Ordering::Acquire) {
                return;
            }
            let outcome = request.run();
            if sender.send_blocking(outcome).is_err() {
                log::debug!("apply for generation {} finished after cancel", generation);
            }
        });

        self.pending = Some(generation);
        log::debug!("apply started at generation {}", generation);
        Ok(ApplyTask {
            generation,
            receiver,
            cancelled,
        })
    }

    /// Integrate a background apply. Results from an older generation are
    /// discarded with [`ApplyError::Stale`].
    pub fn complete_apply(&mut self, outcome: ApplyOutcome) -> Result<Uuid, ApplyError> {
        if self.pending == Some(outcome.generation) {
            self.pending = None;
        }
        self.finish_apply(outcome)
    }

    /// Forget the running apply, e.g. after [`ApplyTask::cancel`].
    pub fn cancel_apply(&mut self) {
        if let Some(generation) = self.pending.take() {
            log::info!("apply at generation {} cancelled", generation);
        }
    }

    fn finish_apply(&mut self, outcome: ApplyOutcome) -> Result<Uuid, ApplyError> {
        if outcome.generation != self.generation {
            log::warn!(
                "discarding apply from generation {} (now {})",
                outcome.generation,
                self.generation
            );
            return Err(ApplyError::Stale);
        }

        let patch = match outcome.result {
            Ok(patch) if patch.is_placeholder() => return Err(ApplyError::DegeneratePolygon),
            Ok(patch) => patch,
            Err(e @ ComposeError::TooLarge { .. }) => {
                log::warn!("apply failed: {}; clearing polygon", e);
                self.state.draft = DraftPolygon::default();
                self.bump();
                self.amend("Clear polygon");
                return Err(e.into());
            }
            Err(e) => {
                log::warn!("apply failed: {}", e);
                return Err(e.into());
            }
        };

        let overlay = Overlay::from_patch(patch, outcome.polygon, outcome.holes);
        let id = overlay.id();
        let z = self.state.overlays.push(overlay);
        if self.settings.clear_polygon_after_apply {
            self.state.draft = DraftPolygon::default();
        } else {
            self.state.draft.applied = true;
        }
        self.bump();
        self.record("Apply material");
        log::info!("overlay {} added at z {}", id, z);
        Ok(id)
    }

    // --- actions -----------------------------------------------------------

    /// Run an action. `Ok(false)` means it was disabled or changed nothing.
    pub fn perform(&mut self, action: EditAction) -> Result<bool, ApplyError> {
        if !action.is_enabled(self) {
            return Ok(false);
        }
        let changed = match action {
            EditAction::Undo => self.undo(),
            EditAction::Redo => self.redo(),
            EditAction::ApplyMaterial => self.apply_material().map(|_| true)?,
            EditAction::ClearLayers => self.clear_layers(),
            EditAction::RemoveOverlay(id) => self.remove_overlay(id),
            EditAction::MoveToFront(id) => self.move_to_front(id),
            EditAction::MoveToBack(id) => self.move_to_back(id),
            EditAction::SwitchCursor(mode) => self.set_cursor_mode(mode),
        };
        Ok(changed)
    }
}
