//! Application state seam

use savestate_core::{Fields, SaveDocument};

/// Live application state the pipeline saves and restores
///
/// Both methods are only ever called on the owning context: from
/// [`Coordinator::save`](crate::Coordinator::save) and from
/// [`Coordinator::pump`](crate::Coordinator::pump).
pub trait StateProvider: Send + 'static {
    /// Capture the current state as plain fields
    ///
    /// The returned fields must not reference live objects; the coordinator
    /// stamps them with the current schema version.
    fn capture_snapshot(&mut self) -> Fields;

    /// Replace live state with a loaded document
    ///
    /// The document is always at the current schema version.
    fn apply_loaded(&mut self, document: SaveDocument);
}
