//! Monitoring tool provider
//!
//! Exposes the monitored application's endpoints as MCP tools. Connection
//! failures come back as error results, never as JSON-RPC errors.

use crate::config::{DEFAULT_APP_HOST, DEFAULT_APP_PORT};
use crate::mcp::tools::{parse_arguments, unknown_tool, ToolProvider};
use crate::monitoring::client::{AppMonitor, MonitorTarget};
use crate::monitoring::report;
use crate::monitoring::trend::{sample_memory_trend, TrendSettings};
use crate::rpc::protocol::{CallToolResult, ParameterSpec, Tool};
use crate::types::MonitorError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const SERVER_NAME: &str = "todo-monitoring";

pub struct MonitoringTools {
    monitor: RwLock<Arc<AppMonitor>>,
}

impl MonitoringTools {
    pub fn new(target: MonitorTarget) -> Result<Self, MonitorError> {
        Ok(Self {
            monitor: RwLock::new(Arc::new(AppMonitor::new(target)?)),
        })
    }

    pub async fn target(&self) -> MonitorTarget {
        self.monitor.read().await.target().clone()
    }

    async fn current(&self) -> Arc<AppMonitor> {
        Arc::clone(&*self.monitor.read().await)
    }

    async fn memory_usage(&self) -> CallToolResult {
        match self.current().await.memory_stats().await {
            Ok(stats) => CallToolResult::text(report::format_memory_report(&stats)),
            Err(e) => failure(e),
        }
    }

    async fn gc_statistics(&self) -> CallToolResult {
        match self.current().await.gc_stats().await {
            Ok(stats) => CallToolResult::text(report::format_gc_report(&stats)),
            Err(e) => failure(e),
        }
    }

    async fn app_health(&self) -> CallToolResult {
        match self.current().await.health().await {
            Ok(health) => CallToolResult::text(report::format_health_report(&health)),
            Err(e) => failure(e),
        }
    }

    async fn dashboard(&self) -> CallToolResult {
        match self.current().await.overview().await {
            Ok(overview) => CallToolResult::text(report::format_dashboard(&overview)),
            Err(e) => failure(e),
        }
    }

    /// Runs until the trend completes or `cancel` fires; either way the
    /// readings taken so far are reported.
    async fn memory_trend(&self, args: Value, cancel: &CancellationToken) -> CallToolResult {
        let args: TrendArgs = match parse_arguments(args) {
            Ok(args) => args,
            Err(result) => return result,
        };

        let settings = match TrendSettings::from_minutes_and_seconds(
            args.duration_minutes,
            args.interval_seconds,
        ) {
            Ok(settings) => settings,
            Err(e) => return CallToolResult::error(e.to_string()),
        };

        let monitor = self.current().await;
        let trend = sample_memory_trend(monitor.as_ref(), settings, cancel).await;
        CallToolResult::text(report::format_trend(&trend))
    }

    async fn configure_target(&self, args: Value) -> CallToolResult {
        let args: TargetArgs = match parse_arguments(args) {
            Ok(args) => args,
            Err(result) => return result,
        };

        let port = match port_from(args.port) {
            Some(port) => port,
            None => return CallToolResult::error(format!("Invalid port: {}", args.port)),
        };

        let target = self.current().await.target().retarget(&args.host, port);
        let candidate = match AppMonitor::new(target.clone()) {
            Ok(monitor) => monitor,
            Err(e) => return failure(e),
        };

        // Only rebind once the new target answers.
        if let Err(e) = candidate.health().await {
            error!("Monitoring target {} is unreachable: {}", target, e);
            return CallToolResult::error(format!("Failed to connect to {}\n{}", target, e));
        }

        *self.monitor.write().await = Arc::new(candidate);
        info!("Monitoring target set to {}", target);

        CallToolResult::text(format!(
            "Successfully configured monitoring target: {}",
            target
        ))
    }
}

#[async_trait]
impl ToolProvider for MonitoringTools {
    fn name(&self) -> &str {
        SERVER_NAME
    }

    fn tools(&self) -> Vec<Tool> {
        tool_definitions()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> CallToolResult {
        match name {
            "get_memory_usage" => self.memory_usage().await,
            "get_gc_statistics" => self.gc_statistics().await,
            "check_app_health" => self.app_health().await,
            "get_full_monitoring_dashboard" => self.dashboard().await,
            "monitor_memory_trend" => self.memory_trend(arguments, cancel).await,
            "configure_monitoring_target" => self.configure_target(arguments).await,
            _ => unknown_tool(name),
        }
    }
}

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::new(
            "get_memory_usage",
            "Get real-time heap and non-heap memory usage from the monitored application",
            vec![],
        ),
        Tool::new(
            "get_gc_statistics",
            "Get garbage collection statistics and performance metrics",
            vec![],
        ),
        Tool::new(
            "check_app_health",
            "Check overall application health including memory warnings",
            vec![],
        ),
        Tool::new(
            "get_full_monitoring_dashboard",
            "Get comprehensive monitoring data including memory, GC, health, and JVM info",
            vec![],
        ),
        Tool::new(
            "monitor_memory_trend",
            "Monitor memory usage trend over specified duration",
            vec![
                (
                    "duration_minutes",
                    ParameterSpec::number("Duration to monitor in minutes (default: 5)")
                        .with_default(json!(5)),
                ),
                (
                    "interval_seconds",
                    ParameterSpec::number("Interval between readings in seconds (default: 30)")
                        .with_default(json!(30)),
                ),
            ],
        ),
        Tool::new(
            "configure_monitoring_target",
            "Configure the target application host and port for monitoring",
            vec![
                (
                    "host",
                    ParameterSpec::string("Application host (default: localhost)")
                        .with_default(json!(DEFAULT_APP_HOST)),
                ),
                (
                    "port",
                    ParameterSpec::number("Application port (default: 9090)")
                        .with_default(json!(DEFAULT_APP_PORT)),
                ),
            ],
        ),
    ]
}

/// How long a `monitor_memory_trend` call with `arguments` will sample.
///
/// `None` when the arguments would be rejected anyway.
pub fn trend_duration(arguments: &Value) -> Option<Duration> {
    let args: TrendArgs = parse_arguments(arguments.clone()).ok()?;
    TrendSettings::from_minutes_and_seconds(args.duration_minutes, args.interval_seconds)
        .ok()
        .map(|settings| settings.duration())
}

fn failure(e: MonitorError) -> CallToolResult {
    error!("Monitoring call failed: {}", e);
    CallToolResult::error(e.to_string())
}

/// Whole numbers in 1..=65535 only.
fn port_from(value: f64) -> Option<u16> {
    if value.fract() != 0.0 || !(1.0..=65535.0).contains(&value) {
        return None;
    }
    Some(value as u16)
}

fn default_duration_minutes() -> f64 {
    5.0
}

fn default_interval_seconds() -> f64 {
    30.0
}

fn default_host() -> String {
    DEFAULT_APP_HOST.to_string()
}

fn default_port() -> f64 {
    DEFAULT_APP_PORT as f64
}

#[derive(Debug, Deserialize)]
struct TrendArgs {
    #[serde(default = "default_duration_minutes")]
    duration_minutes: f64,
    #[serde(default = "default_interval_seconds")]
    interval_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct TargetArgs {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: f64,
}
