//! Application state shared by the handlers.

use std::sync::Arc;

use messaging::EventChannel;

use crate::repository::EmailRepository;
use crate::service::EmailService;

/// Injected dependencies of the email facade.
#[derive(Clone)]
pub struct AppState {
    pub email_service: Arc<dyn EmailService>,
    pub store: Arc<dyn EmailRepository>,
    pub channel: Arc<dyn EventChannel>,
}

impl AppState {
    pub fn new(
        email_service: Arc<dyn EmailService>,
        store: Arc<dyn EmailRepository>,
        channel: Arc<dyn EventChannel>,
    ) -> Self {
        Self {
            email_service,
            store,
            channel,
        }
    }
}
