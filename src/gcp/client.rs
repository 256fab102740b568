//! GCE Disk Client
//!
//! Defines the [`DiskClient`] port consumed by the reconciliation engine and
//! the production adapter speaking the GCE compute v1 REST API. The adapter
//! authenticates through the GCE metadata server, which is the ambient
//! identity available to pods on GKE nodes with workload identity or a
//! node service account.

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

// =============================================================================
// Wire Types
// =============================================================================

/// Terminal status of a GCE zone operation
pub const OPERATION_DONE: &str = "DONE";

/// Subset of a GCE disk resource relevant to label reconciliation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Disk {
    /// Disk name
    pub name: String,
    /// Current labels; absent when the disk has never been labeled
    pub labels: Option<BTreeMap<String, String>>,
    /// Optimistic-concurrency token; must be echoed back on label writes
    pub label_fingerprint: Option<String>,
}

/// A GCE zone operation, returned by mutating calls and polled by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Operation {
    /// Operation name, used to poll for completion
    pub name: String,
    /// Provider-defined status, e.g. PENDING, RUNNING, DONE
    pub status: String,
}

impl Operation {
    /// Whether the operation has reached its terminal state
    pub fn is_done(&self) -> bool {
        self.status == OPERATION_DONE
    }
}

/// Request body for the disk setLabels call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLabelsRequest {
    /// Full replacement label set
    pub labels: BTreeMap<String, String>,
    /// Fingerprint read in the same reconciliation cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_fingerprint: Option<String>,
}

// =============================================================================
// Client Port
// =============================================================================

/// The three provider calls the reconciliation engine needs. Implementations
/// must be safe for concurrent use across distinct volumes.
#[async_trait]
pub trait DiskClient: Send + Sync {
    /// Read current disk state
    async fn get_disk(&self, project: &str, zone: &str, name: &str) -> Result<Disk>;

    /// Replace the disk's label set; returns the async operation to poll
    async fn set_disk_labels(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        req: &SetLabelsRequest,
    ) -> Result<Operation>;

    /// Read the status of a zone operation by name
    async fn get_operation(&self, project: &str, zone: &str, name: &str) -> Result<Operation>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the production GCE client
#[derive(Debug, Clone)]
pub struct GceClientConfig {
    /// Compute API base URL
    pub api_endpoint: String,
    /// Metadata server token URL
    pub token_endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for GceClientConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://compute.googleapis.com/compute/v1".to_string(),
            token_endpoint: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Production Adapter
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Production [`DiskClient`] backed by the GCE compute v1 REST API
pub struct GceDiskClient {
    config: GceClientConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GceDiskClient {
    /// Create a new client
    pub fn new(config: GceClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    /// Get a cached access token, refreshing through the metadata server
    /// when missing or within a minute of expiry.
    async fn access_token(&self) -> Result<String> {
        if let Some(cached) = self.token.lock().as_ref() {
            if cached.expires_at > Instant::now() + Duration::from_secs(60) {
                return Ok(cached.value.clone());
            }
        }

        debug!("refreshing access token from metadata server");
        let resp = self
            .http
            .get(&self.config.token_endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::TokenFetch(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::TokenFetch(format!(
                "metadata server returned {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::TokenFetch(e.to_string()))?;

        let value = token.access_token.clone();
        *self.token.lock() = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    fn disk_url(&self, project: &str, zone: &str, name: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/disks/{}",
            self.config.api_endpoint, project, zone, name
        )
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::GceApi {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl DiskClient for GceDiskClient {
    async fn get_disk(&self, project: &str, zone: &str, name: &str) -> Result<Disk> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(self.disk_url(project, zone, name))
            .bearer_auth(token)
            .send()
            .await?;
        Self::parse_response(resp).await
    }

    async fn set_disk_labels(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        req: &SetLabelsRequest,
    ) -> Result<Operation> {
        let token = self.access_token().await?;
        let url = format!("{}/setLabels", self.disk_url(project, zone, name));
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(req)
            .send()
            .await?;
        Self::parse_response(resp).await
    }

    async fn get_operation(&self, project: &str, zone: &str, name: &str) -> Result<Operation> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/projects/{}/zones/{}/operations/{}",
            self.config.api_endpoint, project, zone, name
        );
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        Self::parse_response(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_deserialization() {
        let disk: Disk = serde_json::from_str(
            r#"{
                "name": "my-disk",
                "labels": {"env": "prod"},
                "labelFingerprint": "42WmSpB8rSM="
            }"#,
        )
        .unwrap();
        assert_eq!(disk.name, "my-disk");
        assert_eq!(
            disk.labels.as_ref().unwrap().get("env").map(String::as_str),
            Some("prod")
        );
        assert_eq!(disk.label_fingerprint.as_deref(), Some("42WmSpB8rSM="));
    }

    #[test]
    fn test_disk_without_labels() {
        let disk: Disk = serde_json::from_str(r#"{"name": "bare-disk"}"#).unwrap();
        assert!(disk.labels.is_none());
        assert!(disk.label_fingerprint.is_none());
    }

    #[test]
    fn test_operation_done() {
        let op: Operation =
            serde_json::from_str(r#"{"name": "op-1", "status": "DONE"}"#).unwrap();
        assert!(op.is_done());

        let op: Operation =
            serde_json::from_str(r#"{"name": "op-1", "status": "RUNNING"}"#).unwrap();
        assert!(!op.is_done());
    }

    #[test]
    fn test_set_labels_request_serialization() {
        let req = SetLabelsRequest {
            labels: [("env".to_string(), "prod".to_string())].into_iter().collect(),
            label_fingerprint: Some("abc=".to_string()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["labels"]["env"], "prod");
        assert_eq!(json["labelFingerprint"], "abc=");

        let req = SetLabelsRequest {
            labels: BTreeMap::new(),
            label_fingerprint: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("labelFingerprint").is_none());
    }
}
