//! # Controller
//!
//! Core modules of the GSLB controller.
//!
//! - `key`: multi-cluster keys and object identities
//! - `store`: accepted and rejected object stores
//! - `translate`: member-cluster objects to snapshots
//! - `events`: watch events to object source updates and keys
//! - `policy`: admission policy and host rules
//! - `ingestion`: per-key processing into the stores
//! - `checksum` / `health_monitor`: global service naming and fingerprints
//! - `graph`: global service synthesis
//! - `publish` / `push`: change-detected publication
//! - `retry`: work queues and the fast/slow retry tracker
//! - `coordination`: configuration gate, flags and worker groups
//! - `pipeline`: queues wired to worker groups

pub mod checksum;
pub mod coordination;
pub mod events;
pub mod graph;
pub mod health_monitor;
pub mod ingestion;
pub mod key;
pub mod pipeline;
pub mod policy;
pub mod publish;
pub mod push;
pub mod retry;
pub mod store;
pub mod translate;
