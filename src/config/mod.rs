//! # Configuration
//!
//! - `controller`: environment-driven controller settings

pub mod controller;

pub use controller::ControllerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;

#[must_use]
pub fn create_shared_config(config: ControllerConfig) -> SharedControllerConfig {
    Arc::new(RwLock::new(config))
}
