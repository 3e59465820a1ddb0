//! Application state shared across request handlers.

use std::sync::Arc;

use crate::controller::ControllerHandle;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor. It
/// holds no fleet data itself; everything goes through the controller actor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    controller: ControllerHandle,
}

impl AppState {
    /// Create a new application state.
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            inner: Arc::new(AppStateInner { controller }),
        }
    }

    /// Get a handle to the controller actor.
    pub fn controller(&self) -> &ControllerHandle {
        &self.inner.controller
    }
}
