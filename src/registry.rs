//! Client for the companion instance registry.
//!
//! The registry answers `GET {base}/instances` with every registered
//! application instance. Nothing is cached; each call fetches fresh data.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{OnboardError, Result};

/// Raw registry entry as served by the registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredInstance {
    #[serde(default)]
    id: Option<String>,
    registration: Registration,
    #[serde(default)]
    status_info: Option<StatusInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Registration {
    name: String,
    #[serde(default)]
    service_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusInfo {
    #[serde(default)]
    status: Option<String>,
}

/// A registered instance reduced to what callers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RegisteredInstance {
    /// Instances registered without a service URL are not reachable and are dropped.
    fn into_record(self) -> Option<InstanceRecord> {
        let url = self.registration.service_url?;
        Some(InstanceRecord {
            id: self.id,
            name: self.registration.name,
            url,
            status: self.status_info.and_then(|s| s.status),
        })
    }
}

/// HTTP client for the registry's listing endpoint.
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OnboardError::internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Every registered instance that advertises a service URL.
    pub async fn all_instances(&self) -> Result<Vec<InstanceRecord>> {
        let url = format!("{}/instances", self.base_url);
        debug!(%url, "querying registry");

        let raw: Vec<RegisteredInstance> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(RegisteredInstance::into_record)
            .collect())
    }

    /// Service URLs of instances registered as `app_name`, compared case-insensitively.
    ///
    /// Registry order is preserved. An unknown name yields an empty list.
    pub async fn list_instances(&self, app_name: &str) -> Result<Vec<String>> {
        let instances = self.all_instances().await?;
        Ok(filter_by_name(instances, app_name))
    }
}

fn filter_by_name(instances: Vec<InstanceRecord>, app_name: &str) -> Vec<String> {
    instances
        .into_iter()
        .filter(|i| i.name.eq_ignore_ascii_case(app_name))
        .map(|i| i.url)
        .collect()
}
