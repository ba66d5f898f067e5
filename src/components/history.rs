use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbaImage;

use crate::material::MaterialCatalog;
use crate::ops::geometry::{Point, can_make_closed_shape};
use crate::overlay::OverlaySequence;

// ============================================================================
// EDITING STATE
// ============================================================================

/// What a pointer press on the canvas does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorMode {
    /// Add points to the draft polygon.
    #[default]
    Draw,
    /// Pick and drag overlays.
    Move,
}

/// The polygon being drawn, plus any interior holes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DraftPolygon {
    pub points: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
    /// Set once the draft has produced an overlay and is kept for reference.
    pub applied: bool,
}

impl DraftPolygon {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.holes.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        can_make_closed_shape(&self.points)
    }

    /// Closed and not yet used for an overlay.
    pub fn is_ready(&self) -> bool {
        self.is_closed() && !self.applied
    }
}

/// Everything undo/redo restores.
///
/// Image and catalog data are shared by `Arc`, so a snapshot costs a handful
/// of pointer copies plus the draft geometry.
#[derive(Clone, Debug, Default)]
pub struct UiSnapshot {
    pub base: Option<Arc<RgbaImage>>,
    pub catalog: Arc<MaterialCatalog>,
    pub selected_material: Option<usize>,
    pub overlays: OverlaySequence,
    pub draft: DraftPolygon,
    pub cursor: CursorMode,
    // Derived from the history stacks; not part of equality.
    pub can_undo: bool,
    pub can_redo: bool,
}

impl PartialEq for UiSnapshot {
    fn eq(&self, other: &Self) -> bool {
        let same_base = match (&self.base, &other.base) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || **a == **b,
            _ => false,
        };
        same_base
            && (Arc::ptr_eq(&self.catalog, &other.catalog) || *self.catalog == *other.catalog)
            && self.selected_material == other.selected_material
            && self.overlays == other.overlays
            && self.draft == other.draft
            && self.cursor == other.cursor
    }
}

// ============================================================================
// HISTORY STACK — whole-state snapshots
// ============================================================================

#[derive(Clone, Debug)]
struct HistoryEntry {
    description: String,
    snapshot: UiSnapshot,
}

/// Snapshot history. The top of the undo stack is always the live state;
/// undoing moves it to the redo stack and exposes the one beneath.
#[derive(Debug)]
pub struct HistoryStack {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    /// `None` keeps every entry.
    max_entries: Option<usize>,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HistoryStack {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_entries: max_entries.map(|n| n.max(1)),
        }
    }

    /// Drop everything and start again from `baseline`.
    pub fn reset(&mut self, baseline: UiSnapshot) {
        self.clear();
        self.undo_stack.push_back(HistoryEntry {
            description: "Open".to_string(),
            snapshot: baseline,
        });
    }

    /// Record a new live state. Returns `false` (and leaves both stacks
    /// untouched) when it equals the current top.
    pub fn push(&mut self, description: impl Into<String>, snapshot: UiSnapshot) -> bool {
        if self.current() == Some(&snapshot) {
            return false;
        }
        self.redo_stack.clear();
        self.undo_stack.push_back(HistoryEntry {
            description: description.into(),
            snapshot,
        });
        self.prune();
        true
    }

    /// Overwrite the live entry instead of adding a step. A real change
    /// still forks away from anything undone, so redo is cleared.
    pub fn amend(&mut self, snapshot: UiSnapshot) -> bool {
        match self.undo_stack.back_mut() {
            Some(top) if top.snapshot == snapshot => false,
            Some(top) => {
                top.snapshot = snapshot;
                self.redo_stack.clear();
                true
            }
            None => {
                self.reset(snapshot);
                true
            }
        }
    }

    /// Rewrite every stored snapshot, e.g. to swap in data that undo must
    /// not take back.
    pub fn update_all(&mut self, mut f: impl FnMut(&mut UiSnapshot)) {
        for entry in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            f(&mut entry.snapshot);
        }
    }

    /// Step back one entry and return the state to restore.
    pub fn undo(&mut self) -> Option<&UiSnapshot> {
        if !self.can_undo() {
            return None;
        }
        let entry = self.undo_stack.pop_back()?;
        self.redo_stack.push_back(entry);
        self.current()
    }

    /// Re-apply the most recently undone entry and return it.
    pub fn redo(&mut self) -> Option<&UiSnapshot> {
        let entry = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(entry);
        self.current()
    }

    pub fn current(&self) -> Option<&UiSnapshot> {
        self.undo_stack.back().map(|e| &e.snapshot)
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Description of the action `undo` would revert.
    pub fn undo_description(&self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|e| e.description.as_str())
    }

    /// Undoable action descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<&str> {
        self.undo_stack
            .iter()
            .skip(1)
            .rev()
            .map(|e| e.description.as_str())
            .collect()
    }

    /// Number of steps `undo` can take.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len().saturating_sub(1)
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn prune(&mut self) {
        if let Some(max) = self.max_entries {
            // the live entry always stays
            while self.undo_stack.len() > max.max(1) {
                self.undo_stack.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(n: usize) -> UiSnapshot {
        UiSnapshot {
            selected_material: Some(n),
            ..Default::default()
        }
    }

    #[test]
    fn undo_then_redo_restores() {
        let mut h = HistoryStack::default();
        h.reset(state(0));
        assert!(!h.can_undo());
        assert!(h.push("one", state(1)));
        assert!(h.push("two", state(2)));

        assert_eq!(h.undo_description(), Some("two"));
        assert_eq!(h.undo(), Some(&state(1)));
        assert_eq!(h.undo(), Some(&state(0)));
        assert_eq!(h.undo(), None);
        assert_eq!(h.current(), Some(&state(0)));

        assert_eq!(h.redo(), Some(&state(1)));
        assert_eq!(h.redo(), Some(&state(2)));
        assert_eq!(h.redo(), None);
    }

    #[test]
    fn duplicate_push_is_ignored() {
        let mut h = HistoryStack::default();
        h.reset(state(0));
        h.push("one", state(1));
        h.undo();
        assert!(h.can_redo());
        assert!(!h.push("same", state(0)));
        assert!(h.can_redo(), "a no-op push must not clear redo");
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn new_push_clears_redo() {
        let mut h = HistoryStack::default();
        h.reset(state(0));
        h.push("one", state(1));
        h.undo();
        h.push("other", state(7));
        assert!(!h.can_redo());
        assert_eq!(h.undo_history(), vec!["other"]);
    }

    #[test]
    fn flags_do_not_affect_equality() {
        let mut a = state(3);
        let b = state(3);
        a.can_undo = true;
        a.can_redo = true;
        assert_eq!(a, b);
    }

    #[test]
    fn limit_prunes_oldest() {
        let mut h = HistoryStack::new(Some(3));
        h.reset(state(0));
        for i in 1..=5 {
            h.push(format!("step {i}"), state(i));
        }
        assert_eq!(h.undo_count(), 2);
        assert_eq!(h.undo(), Some(&state(4)));
        assert_eq!(h.undo(), Some(&state(3)));
        assert_eq!(h.undo(), None);
    }

    #[test]
    fn n_overlays_undo_to_empty_and_redo_back() {
        use crate::overlay::Overlay;
        use image::Rgba;

        let mut h = HistoryStack::default();
        let mut live = UiSnapshot::default();
        h.reset(live.clone());

        let n = 6;
        for i in 0..n {
            let x = i as f64 * 3.0;
            live.overlays.push(Overlay::rehydrate(
                RgbaImage::from_pixel(2, 2, Rgba([i as u8, 0, 0, 255])),
                vec![Point::new(x, 0.0), Point::new(x + 2.0, 0.0), Point::new(x, 2.0)],
                Vec::new(),
                Point::new(x, 0.0),
            ));
            assert!(h.push("Apply material", live.clone()));
        }
        let full = live.overlays.clone();

        for _ in 0..n {
            assert!(h.undo().is_some());
        }
        assert!(h.current().unwrap().overlays.is_empty());
        assert!(!h.can_undo());

        for _ in 0..n {
            assert!(h.redo().is_some());
        }
        assert_eq!(h.current().unwrap().overlays, full);

        h.undo();
        live.overlays.clear();
        h.push("Clear layers", live);
        assert!(!h.can_redo());
    }

    #[test]
    fn amend_replaces_the_live_entry() {
        let mut h = HistoryStack::default();
        h.reset(state(0));
        assert!(h.amend(state(5)));
        assert!(!h.can_undo());
        assert_eq!(h.current(), Some(&state(5)));
        assert!(!h.amend(state(5)));

        h.push("one", state(1));
        h.undo();
        assert!(h.can_redo());
        assert!(!h.amend(state(5)), "an unchanged amend keeps redo");
        assert!(h.can_redo());
        assert!(h.amend(state(6)));
        assert!(!h.can_redo());
        assert_eq!(h.undo_count(), 0);
    }

    #[test]
    fn amend_on_empty_history_seeds_it() {
        let mut h = HistoryStack::default();
        assert!(h.amend(state(2)));
        assert_eq!(h.current(), Some(&state(2)));
        assert!(!h.can_undo());
    }

    #[test]
    fn update_all_reaches_both_stacks() {
        let mut h = HistoryStack::default();
        h.reset(state(0));
        h.push("one", state(1));
        h.push("two", state(2));
        h.undo();
        h.update_all(|s| s.cursor = CursorMode::Move);
        assert_eq!(h.current().unwrap().cursor, CursorMode::Move);
        assert_eq!(h.redo().unwrap().cursor, CursorMode::Move);
        assert_eq!(h.undo().unwrap().cursor, CursorMode::Move);
        assert_eq!(h.undo().unwrap().cursor, CursorMode::Move);
    }

    #[test]
    fn draft_readiness() {
        let mut d = DraftPolygon::default();
        assert!(d.is_empty() && !d.is_ready());
        d.points = vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(0.0, 5.0)];
        assert!(d.is_ready());
        d.applied = true;
        assert!(d.is_closed() && !d.is_ready());
    }
}
