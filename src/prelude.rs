//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use gslb_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Keys and stores
pub use crate::controller::key::{MultiClusterKey, ObjectRef, ObjectType, Operation};
pub use crate::controller::store::{ObjectSnapshot, ObjectStores, StoreKind};

// Pipeline
pub use crate::controller::coordination::{CoordinationContext, ShutdownOutcome, WorkerStage};
pub use crate::controller::ingestion::{InMemoryObjectSource, Ingestor, ObjectSource};
pub use crate::controller::pipeline::{Pipeline, PipelineSettings, WorkItem};
pub use crate::controller::policy::{GdpPolicy, HostRuleTable, PolicyEvaluator, PolicyStore};
pub use crate::controller::publish::{GraphPublisher, PublishOutcome};
pub use crate::controller::push::{GslbServicePusher, PushError, StatusPublisher};

// Config types
pub use crate::config::{ControllerConfig, SharedControllerConfig};
