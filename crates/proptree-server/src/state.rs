use std::sync::Arc;

use proptree_core::PropService;

use crate::auth::IdentityGate;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PropService>,
    pub gate: Arc<dyn IdentityGate>,
}

impl AppState {
    pub fn new(service: PropService, gate: Arc<dyn IdentityGate>) -> Self {
        Self {
            service: Arc::new(service),
            gate,
        }
    }
}
