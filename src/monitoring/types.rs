//! Payloads of the monitored application's `/api/monitoring/*` endpoints
//!
//! Timestamps are epoch milliseconds; memory figures are megabytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `GET /memory`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub heap: HeapUsage,
    pub non_heap: NonHeapUsage,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapUsage {
    pub used_mb: f64,
    pub max_mb: f64,
    pub committed_mb: f64,
    pub usage_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonHeapUsage {
    pub used_mb: f64,
    pub committed_mb: f64,
}

/// `GET /gc`: one entry per collector, keyed by collector name, next to a
/// top-level `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcStats {
    pub timestamp: i64,
    #[serde(flatten)]
    pub collectors: BTreeMap<String, CollectorStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorStats {
    pub collection_count: i64,
    pub collection_time_ms: i64,
    #[serde(default)]
    pub memory_pool_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
    #[serde(other)]
    Unknown,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub memory_status: HealthLevel,
    pub heap_usage_percent: f64,
    pub uptime_ms: u64,
    pub thread_count: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvmInfo {
    pub java_version: String,
    pub jvm_name: String,
    pub start_time: i64,
}

/// `GET /overview`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemOverview {
    pub memory: MemoryStats,
    pub gc: GcStats,
    pub health: HealthStatus,
    pub jvm_info: JvmInfo,
    pub timestamp: i64,
}
