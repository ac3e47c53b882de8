//! Shared application state

use opsplatform_rbac::{AdminService, RbacEngine};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RbacEngine>,
    pub admin: Arc<AdminService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<RbacEngine>) -> Self {
        Self {
            admin: Arc::new(AdminService::new(engine.clone())),
            engine,
            started_at: Instant::now(),
        }
    }
}
