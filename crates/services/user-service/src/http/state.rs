//! Application state shared by the handlers.

use std::sync::Arc;

use messaging::EventChannel;

use crate::repository::UserRepository;
use crate::service::UserService;

/// Injected dependencies of the user facade.
#[derive(Clone)]
pub struct AppState {
    /// Registrar handling every user operation
    pub user_service: Arc<dyn UserService>,
    /// Record store, probed by the health check
    pub store: Arc<dyn UserRepository>,
    /// Event channel, probed by the health check
    pub channel: Arc<dyn EventChannel>,
}

impl AppState {
    pub fn new(
        user_service: Arc<dyn UserService>,
        store: Arc<dyn UserRepository>,
        channel: Arc<dyn EventChannel>,
    ) -> Self {
        Self {
            user_service,
            store,
            channel,
        }
    }
}
