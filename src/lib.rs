//! GSLB Controller Library
//!
//! Multi-cluster reconciliation engine: member-cluster objects flow through
//! ingestion, admission policy and graph build into global load-balancing
//! services. Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use gslb_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
