//! Event emitter trait for gateway lifecycle events.
//!
//! Implementations handle transport details (channels, log sinks, etc.).

use crate::events::AppEvent;

/// Trait for emitting application events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and contexts that don't need events
/// - Adapter-specific implementations (the CLI logs them through `tracing`)
pub trait AppEventEmitter: Send + Sync {
    /// Emit an application event. Must not block.
    fn emit(&self, event: AppEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn AppEventEmitter>;
}

/// A no-op event emitter for tests.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    /// Create a new no-op emitter.
    pub const fn new() -> Self {
        Self
    }
}

impl AppEventEmitter for NoopEmitter {
    fn emit(&self, _event: AppEvent) {}

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}
