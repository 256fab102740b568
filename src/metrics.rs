//! Reconciliation Metrics
//!
//! The engine reports exactly one outcome per label mutation attempt that
//! reached the provider submit step. The recorder is injected as a trait so
//! tests can observe outcomes without a process-wide registry.

use crate::error::Result;
use prometheus::{IntCounterVec, Opts, Registry};

/// Terminal outcome of a label mutation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Error,
}

impl ActionOutcome {
    /// Metric label value for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Success => "success",
            ActionOutcome::Error => "error",
        }
    }
}

/// Receives one event per terminal add/delete attempt that reached the
/// submit step. Never invoked for early no-ops or parse/fetch failures.
pub trait ActionRecorder: Send + Sync {
    fn record(&self, outcome: ActionOutcome, storage_class: &str);
}

/// Prometheus-backed [`ActionRecorder`], counting attempts by outcome and
/// the storage class of the originating PVC.
pub struct PromActionRecorder {
    actions_total: IntCounterVec,
}

impl PromActionRecorder {
    /// Create the recorder and register its counter with the given registry
    pub fn register(registry: &Registry) -> Result<Self> {
        let actions_total = IntCounterVec::new(
            Opts::new(
                "pvc_disk_labeler_actions_total",
                "Disk label reconciliation attempts by outcome",
            ),
            &["status", "storageclass"],
        )?;
        registry.register(Box::new(actions_total.clone()))?;
        Ok(Self { actions_total })
    }
}

impl ActionRecorder for PromActionRecorder {
    fn record(&self, outcome: ActionOutcome, storage_class: &str) {
        self.actions_total
            .with_label_values(&[outcome.as_str(), storage_class])
            .inc();
    }
}
