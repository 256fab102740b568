//! PVC Watch Loop
//!
//! Watches PersistentVolumeClaims and drives the reconciliation engine.
//! Desired disk labels are declared on the PVC through a single annotation
//! holding a JSON object; the watcher diffs each update against the label
//! set it last applied for that PVC to produce add and delete calls. All
//! mutation semantics live in [`crate::gcp::reconciler`] — this module only
//! decides what to ask for.
//!
//! Watch restarts replay every PVC as an apply event. That is harmless: the
//! engine short-circuits when the disk already carries the requested labels.

use crate::error::Result;
use crate::gcp::DiskLabelReconciler;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::{
    api::Api,
    runtime::{watcher, watcher::Event, WatchStreamExt},
    Client, ResourceExt,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// CSI driver name for GCE persistent disks
pub const GCE_PD_CSI_DRIVER: &str = "pd.csi.storage.gke.io";

/// Default PVC annotation carrying the desired disk labels as a JSON object
pub const DEFAULT_LABEL_ANNOTATION: &str = "pvc-disk-labeler/labels";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the PVC watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Annotation holding the desired labels
    pub annotation: String,
    /// Restrict the watch to one namespace; all namespaces when unset
    pub namespace: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            annotation: DEFAULT_LABEL_ANNOTATION.to_string(),
            namespace: None,
        }
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Watches PVCs and reconciles their annotated labels onto backing disks
pub struct PvcWatcher {
    kube: Client,
    reconciler: Arc<DiskLabelReconciler>,
    config: WatcherConfig,
    /// Last applied label set per PVC UID, used to detect removed keys.
    /// Owned by the single watch task; dropped entries mean deletes for a
    /// PVC seen before this process started go undetected until its
    /// annotation changes again.
    applied: HashMap<String, BTreeMap<String, String>>,
}

impl PvcWatcher {
    /// Create a new watcher
    pub fn new(
        kube: Client,
        reconciler: Arc<DiskLabelReconciler>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            kube,
            reconciler,
            config,
            applied: HashMap::new(),
        }
    }

    /// Run the watch loop until the stream fails terminally
    pub async fn run(mut self) -> Result<()> {
        let pvcs: Api<PersistentVolumeClaim> = match &self.config.namespace {
            Some(ns) => Api::namespaced(self.kube.clone(), ns),
            None => Api::all(self.kube.clone()),
        };

        info!(
            "watching PVCs ({}), label annotation: {}",
            self.config
                .namespace
                .as_deref()
                .unwrap_or("all namespaces"),
            self.config.annotation
        );

        let mut stream = watcher(pvcs, watcher::Config::default())
            .default_backoff()
            .boxed();

        while let Some(event) = stream.try_next().await? {
            match event {
                Event::Applied(pvc) => self.handle_applied(pvc).await,
                Event::Deleted(pvc) => self.handle_deleted(&pvc),
                Event::Restarted(pvcs) => {
                    debug!("watch restarted, replaying {} PVCs", pvcs.len());
                    for pvc in pvcs {
                        self.handle_applied(pvc).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_applied(&mut self, pvc: PersistentVolumeClaim) {
        let name = format!("{}/{}", pvc.namespace().unwrap_or_default(), pvc.name_any());
        let Some(uid) = pvc.metadata.uid.clone() else {
            return;
        };

        let desired = match parse_label_annotation(&pvc, &self.config.annotation) {
            Ok(desired) => desired,
            Err(e) => {
                warn!("PVC {}: ignoring malformed label annotation: {}", name, e);
                return;
            }
        };
        let previous = self.applied.get(&uid).cloned().unwrap_or_default();
        let removed = removed_keys(&previous, &desired);
        if desired.is_empty() && removed.is_empty() {
            return;
        }

        let Some(volume_id) = self.resolve_volume_handle(&pvc, &name).await else {
            return;
        };
        let storage_class = pvc
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.clone())
            .unwrap_or_default();

        if !desired.is_empty() {
            self.reconciler
                .add_labels(&volume_id, &desired, &storage_class)
                .await;
        }
        if !removed.is_empty() {
            self.reconciler
                .delete_labels(&volume_id, &removed, &storage_class)
                .await;
        }
        self.applied.insert(uid, desired);
    }

    /// A deleted PVC only drops the cache entry; labels stay on the disk so
    /// they remain visible on snapshots and orphaned disks.
    fn handle_deleted(&mut self, pvc: &PersistentVolumeClaim) {
        if let Some(uid) = &pvc.metadata.uid {
            self.applied.remove(uid);
        }
    }

    /// Follow the PVC to its bound PV and return the CSI volume handle when
    /// the PV is backed by the GCE PD CSI driver.
    async fn resolve_volume_handle(
        &self,
        pvc: &PersistentVolumeClaim,
        name: &str,
    ) -> Option<String> {
        let volume_name = pvc.spec.as_ref()?.volume_name.clone()?;
        let pvs: Api<PersistentVolume> = Api::all(self.kube.clone());
        let pv = match pvs.get(&volume_name).await {
            Ok(pv) => pv,
            Err(e) => {
                warn!("PVC {}: failed to fetch PV {}: {}", name, volume_name, e);
                return None;
            }
        };
        let handle = csi_volume_handle(&pv);
        if handle.is_none() {
            debug!("PVC {}: PV {} is not a GCE PD CSI volume", name, volume_name);
        }
        handle
    }
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Parse the label annotation into the desired label map. A missing
/// annotation means no labels are desired.
fn parse_label_annotation(
    pvc: &PersistentVolumeClaim,
    annotation: &str,
) -> serde_json::Result<BTreeMap<String, String>> {
    match pvc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotation))
    {
        Some(raw) => serde_json::from_str(raw),
        None => Ok(BTreeMap::new()),
    }
}

/// Keys present in the previously applied set but absent from the desired
/// set, in the previous set's order.
fn removed_keys(
    previous: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> Vec<String> {
    previous
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect()
}

/// Extract the CSI volume handle from a PV bound to the GCE PD driver
fn csi_volume_handle(pv: &PersistentVolume) -> Option<String> {
    let csi = pv.spec.as_ref()?.csi.as_ref()?;
    if csi.driver != GCE_PD_CSI_DRIVER {
        return None;
    }
    Some(csi.volume_handle.clone())
}
