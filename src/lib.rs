//! PVC Disk Labeler
//!
//! A Kubernetes operator that mirrors PersistentVolumeClaim labels onto the
//! GCE persistent disks backing them, translating Kubernetes label semantics
//! into GCE's stricter label grammar.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        PVC Watcher                           │
//! │   annotation parse → PV lookup → add/delete label sets       │
//! ├──────────────────────────────────────────────────────────────┤
//! │                 Disk Label Reconciliation Engine             │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐   │
//! │  │ VolumeHandle │  │     Label     │  │  submit + poll   │   │
//! │  │    Parser    │  │   Sanitizer   │  │  (zone op, 60s)  │   │
//! │  └──────────────┘  └───────────────┘  └──────────────────┘   │
//! ├──────────────────────────────────────────────────────────────┤
//! │         GCE Compute v1 REST Client (metadata auth)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`gcp`]: volume-handle parsing, label sanitization, disk client and
//!   the reconciliation engine
//! - [`watcher`]: PVC watch loop driving the engine
//! - [`metrics`]: outcome counters for reconciliation attempts
//! - [`error`]: error types and handling

pub mod error;
pub mod gcp;
pub mod metrics;
pub mod watcher;

// Re-export commonly used types
pub use error::{Error, Result};
pub use gcp::{
    Disk, DiskClient, DiskLabelReconciler, GceClientConfig, GceDiskClient, Operation,
    ReconcilerConfig, SetLabelsRequest, VolumeHandle,
};
pub use metrics::{ActionOutcome, ActionRecorder, PromActionRecorder};
pub use watcher::{PvcWatcher, WatcherConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
