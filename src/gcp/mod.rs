//! GCE Persistent Disk Integration
//!
//! Everything the operator knows about GCE lives here: the volume-handle
//! parser, the label sanitizer, the compute API client port and its
//! production adapter, and the reconciliation engine tying them together.

pub mod client;
pub mod handle;
pub mod labels;
pub mod reconciler;

pub use client::{Disk, DiskClient, GceClientConfig, GceDiskClient, Operation, SetLabelsRequest};
pub use handle::VolumeHandle;
pub use reconciler::{DiskLabelReconciler, ReconcilerConfig};
