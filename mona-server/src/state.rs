//! Application state shared across all request handlers.

use mona_core::registry::ConnectionRegistry;
use mona_core::state::StateStore;

/// Application state that is shared across all request handlers.
///
/// Cheap to clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Subscriber set; also owns the [`StateStore`] snapshots come from.
    pub registry: ConnectionRegistry,
}

impl AppState {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// The milestone state read by the informational endpoints.
    pub fn store(&self) -> &StateStore {
        self.registry.store()
    }
}
