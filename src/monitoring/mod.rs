//! Application monitoring: HTTP client, reports, memory trend and MCP tools

pub mod client;
pub mod report;
pub mod tools;
pub mod trend;
pub mod types;

pub use client::{AppMonitor, MemorySampler, MonitorTarget};
pub use tools::{trend_duration, MonitoringTools};
pub use trend::{sample_memory_trend, MemoryTrend, TrendDirection, TrendSettings};
