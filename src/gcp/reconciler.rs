//! Disk Label Reconciliation Engine
//!
//! Orchestrates the add and delete flows: fetch current disk state, compute
//! the minimal label mutation, skip when nothing changes, submit the write
//! and poll the resulting zone operation to completion.
//!
//! Both entry points are fire-and-forget: every failure is terminal for the
//! current call, logged where it happens, and never propagated. Callers
//! observe outcomes only through the injected [`ActionRecorder`]. Concurrent
//! calls against the same disk are not coordinated here; the provider's
//! fingerprint check rejects the losing write and it surfaces as an ordinary
//! submit error.

use crate::error::{Error, Result};
use crate::gcp::client::{Disk, DiskClient, Operation, SetLabelsRequest};
use crate::gcp::handle::VolumeHandle;
use crate::gcp::labels::{sanitize_keys, sanitize_labels};
use crate::metrics::{ActionOutcome, ActionRecorder};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

// =============================================================================
// Configuration
// =============================================================================

/// Polling policy for label operations
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Delay between operation status checks; the first check happens one
    /// interval after submit, not immediately
    pub poll_interval: Duration,
    /// Hard deadline for an operation to reach DONE
    pub poll_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Reconciles PVC labels onto the GCE disk backing the volume
pub struct DiskLabelReconciler {
    client: Arc<dyn DiskClient>,
    recorder: Arc<dyn ActionRecorder>,
    config: ReconcilerConfig,
}

impl DiskLabelReconciler {
    /// Create a new reconciler
    pub fn new(
        client: Arc<dyn DiskClient>,
        recorder: Arc<dyn ActionRecorder>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            recorder,
            config,
        }
    }

    /// Merge `labels` into the disk backing `volume_id`. Keys already on the
    /// disk but absent from `labels` are left untouched. No-ops when the
    /// merge changes nothing.
    pub async fn add_labels(
        &self,
        volume_id: &str,
        labels: &BTreeMap<String, String>,
        storage_class: &str,
    ) {
        let sanitized = sanitize_labels(labels);
        debug!("labels to add to disk {}: {:?}", volume_id, sanitized);

        let handle = match VolumeHandle::parse(volume_id) {
            Ok(handle) => handle,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        let disk = match self.fetch_disk(&handle).await {
            Ok(disk) => disk,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        // Merge existing disk labels with the new labels. A disk that has
        // never been labeled reports no label map at all; treat that the
        // same as an empty one.
        let current = disk.labels.clone().unwrap_or_default();
        let mut updated = current.clone();
        updated.extend(sanitized);
        if updated == current {
            debug!("labels already set on disk {}", handle.name);
            return;
        }

        self.submit_and_wait(&handle, &disk, updated, storage_class, "add")
            .await;
    }

    /// Remove the given label keys from the disk backing `volume_id`. Keys
    /// not present on the disk are silently ignored. No-ops when `keys` is
    /// empty, the disk carries no labels, or nothing matches.
    pub async fn delete_labels(&self, volume_id: &str, keys: &[String], storage_class: &str) {
        if keys.is_empty() {
            return;
        }
        let sanitized = sanitize_keys(keys);
        debug!("labels to delete from disk {}: {:?}", volume_id, sanitized);

        let handle = match VolumeHandle::parse(volume_id) {
            Ok(handle) => handle,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        let disk = match self.fetch_disk(&handle).await {
            Ok(disk) => disk,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        // No label map means there is nothing to delete.
        let Some(current) = disk.labels.clone() else {
            return;
        };
        let mut updated = current.clone();
        for key in &sanitized {
            updated.remove(key);
        }
        if updated == current {
            return;
        }

        self.submit_and_wait(&handle, &disk, updated, storage_class, "delete")
            .await;
    }

    async fn fetch_disk(&self, handle: &VolumeHandle) -> Result<Disk> {
        self.client
            .get_disk(&handle.project, &handle.location, &handle.name)
            .await
            .map_err(|e| Error::DiskFetch {
                disk: handle.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Submit the label write and wait for the operation to finish. Emits
    /// exactly one metric per attempt that reached the submit step: an error
    /// when the submit itself is rejected, a success when the operation
    /// completes. A failed or timed-out poll is logged but not metriced.
    async fn submit_and_wait(
        &self,
        handle: &VolumeHandle,
        disk: &Disk,
        labels: BTreeMap<String, String>,
        storage_class: &str,
        action: &str,
    ) {
        let req = SetLabelsRequest {
            labels,
            label_fingerprint: disk.label_fingerprint.clone(),
        };
        let op = match self
            .client
            .set_disk_labels(&handle.project, &handle.location, &handle.name, &req)
            .await
        {
            Ok(op) => op,
            Err(e) => {
                error!(
                    "{}",
                    Error::LabelSubmit {
                        disk: handle.name.clone(),
                        reason: e.to_string(),
                    }
                );
                self.recorder.record(ActionOutcome::Error, storage_class);
                return;
            }
        };

        if let Err(e) = self.wait_for_operation(handle, &op).await {
            error!("{} label operation failed: {}", action, e);
            return;
        }

        debug!("successfully reconciled labels on disk {}", handle.name);
        self.recorder.record(ActionOutcome::Success, storage_class);
    }

    /// Poll the operation until it reports DONE. Any other status, including
    /// provider-defined error statuses, keeps the poll going until the
    /// deadline; only a failed status check ends it early.
    async fn wait_for_operation(&self, handle: &VolumeHandle, op: &Operation) -> Result<()> {
        let poll = async {
            loop {
                tokio::time::sleep(self.config.poll_interval).await;
                let current = self
                    .client
                    .get_operation(&handle.project, &handle.location, &op.name)
                    .await
                    .map_err(|e| Error::OperationPoll {
                        operation: op.name.clone(),
                        reason: e.to_string(),
                    })?;
                if current.is_done() {
                    return Ok(());
                }
            }
        };
        match tokio::time::timeout(self.config.poll_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationTimeout {
                operation: op.name.clone(),
                timeout_secs: self.config.poll_timeout.as_secs(),
            }),
        }
    }
}
