//! MaterialFE — perspective material overlays for photos.
//!
//! A polygon drawn on a base image is reduced to a quadrilateral hull, a
//! material texture is warped onto it, masked by the polygon minus its
//! holes, and kept as a z-ordered overlay with snapshot undo/redo.

pub mod components;
pub mod io;
pub mod logger;
pub mod material;
pub mod ops;
pub mod overlay;
pub mod session;
pub mod settings;

pub use components::actions::EditAction;
pub use components::history::{CursorMode, DraftPolygon, HistoryStack, UiSnapshot};
pub use material::{Material, MaterialCatalog};
pub use ops::geometry::{Bounds, Point};
pub use ops::perspective::{ComposeError, Homography, Patch, PerspectiveMaterial};
pub use overlay::{Overlay, OverlaySequence};
pub use session::{ApplyError, ApplyOutcome, ApplyTask, EditingSession, SessionPhase};
pub use settings::CompositorSettings;
