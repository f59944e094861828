//! HTTP client for the monitored application
//!
//! One method per endpoint under `http://<host>:<port>/api/monitoring/`.

use crate::config::MonitoringSettings;
use crate::monitoring::types::{GcStats, HealthStatus, MemoryStats, SystemOverview};
use crate::types::MonitorError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

/// Where the monitored application lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl MonitorTarget {
    pub fn from_settings(settings: &MonitoringSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    /// A copy pointing at another host and port, keeping the timeout.
    pub fn retarget(&self, host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: self.timeout,
        }
    }

    pub fn base_url(&self) -> Result<Url, MonitorError> {
        let raw = format!("http://{}:{}/api/monitoring/", self.host, self.port);
        let url = Url::parse(&raw).map_err(|e| {
            MonitorError::InvalidTarget(format!("{}:{} ({})", self.host, self.port, e))
        })?;

        if url.host_str().map_or(true, str::is_empty) {
            return Err(MonitorError::InvalidTarget(format!(
                "{}:{}",
                self.host, self.port
            )));
        }

        Ok(url)
    }
}

impl std::fmt::Display for MonitorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Source of heap readings for the trend sampler.
#[async_trait]
pub trait MemorySampler: Send + Sync {
    async fn sample_memory(&self) -> Result<MemoryStats, MonitorError>;
}

pub struct AppMonitor {
    target: MonitorTarget,
    base_url: Url,
    http: reqwest::Client,
}

impl AppMonitor {
    pub fn new(target: MonitorTarget) -> Result<Self, MonitorError> {
        let base_url = target.base_url()?;
        let http = reqwest::Client::builder().timeout(target.timeout).build()?;

        debug!("Monitoring endpoint: {}", base_url);

        Ok(Self {
            target,
            base_url,
            http,
        })
    }

    pub fn target(&self) -> &MonitorTarget {
        &self.target
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, MonitorError> {
        let url = self.base_url.join(endpoint).map_err(|e| MonitorError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                error!("Request to {} failed: {}", endpoint, e);
                MonitorError::Http(e)
            })?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| MonitorError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn memory_stats(&self) -> Result<MemoryStats, MonitorError> {
        self.get("memory").await
    }

    pub async fn gc_stats(&self) -> Result<GcStats, MonitorError> {
        self.get("gc").await
    }

    pub async fn health(&self) -> Result<HealthStatus, MonitorError> {
        self.get("health").await
    }

    pub async fn overview(&self) -> Result<SystemOverview, MonitorError> {
        self.get("overview").await
    }

    /// Poll the health endpoint until it answers.
    ///
    /// Returns the 1-based attempt that succeeded, or `None` when all
    /// attempts failed or `cancel` fired.
    pub async fn wait_until_ready(
        &self,
        attempts: u32,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Option<u32> {
        for attempt in 1..=attempts {
            match self.health().await {
                Ok(_) => {
                    info!("{} is ready after {} attempt(s)", self.target, attempt);
                    return Some(attempt);
                }
                Err(e) => debug!("Attempt {}/{}: {}", attempt, attempts, e),
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => return None,
                }
            }
        }

        None
    }
}

#[async_trait]
impl MemorySampler for AppMonitor {
    async fn sample_memory(&self) -> Result<MemoryStats, MonitorError> {
        self.memory_stats().await
    }
}
