//! Plain-text reports for the monitoring tools

use crate::monitoring::trend::MemoryTrend;
use crate::monitoring::types::{GcStats, HealthLevel, HealthStatus, MemoryStats, SystemOverview};
use chrono::{DateTime, Local};

const MS_PER_HOUR: f64 = 1000.0 * 60.0 * 60.0;

/// Heap status label for a usage percentage.
pub fn heap_status(usage_percentage: f64) -> &'static str {
    if usage_percentage < 80.0 {
        "Normal"
    } else if usage_percentage < 90.0 {
        "High"
    } else {
        "Critical"
    }
}

fn local_time(epoch_ms: i64, pattern: &str) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|utc| utc.with_timezone(&Local).format(pattern).to_string())
        .unwrap_or_else(|| format!("{}ms", epoch_ms))
}

fn clock(epoch_ms: i64) -> String {
    local_time(epoch_ms, "%H:%M:%S")
}

fn uptime_hours(uptime_ms: u64) -> f64 {
    uptime_ms as f64 / MS_PER_HOUR
}

fn health_marker(level: HealthLevel) -> &'static str {
    match level {
        HealthLevel::Healthy => "[OK]",
        HealthLevel::Warning => "[WARN]",
        HealthLevel::Critical => "[CRIT]",
        HealthLevel::Unknown => "[?]",
    }
}

pub fn format_memory_report(stats: &MemoryStats) -> String {
    let heap = &stats.heap;
    let non_heap = &stats.non_heap;

    format!(
        "Memory Usage Report\n\n\
         Heap Memory:\n\
         - Used: {:.1} MB\n\
         - Max: {:.1} MB\n\
         - Committed: {:.1} MB\n\
         - Usage: {:.1}%\n\
         - Status: {}\n\n\
         Non-Heap Memory:\n\
         - Used: {:.1} MB\n\
         - Committed: {:.1} MB\n\n\
         Updated: {}",
        heap.used_mb,
        heap.max_mb,
        heap.committed_mb,
        heap.usage_percentage,
        heap_status(heap.usage_percentage),
        non_heap.used_mb,
        non_heap.committed_mb,
        clock(stats.timestamp)
    )
}

pub fn format_gc_report(stats: &GcStats) -> String {
    let mut output = String::from("Garbage Collection Statistics\n\n");

    if stats.collectors.is_empty() {
        output.push_str("No collectors reported\n\n");
    }

    for (name, collector) in &stats.collectors {
        output.push_str(&format!(
            "{}:\n- Collections: {}\n- Total Time: {}ms\n- Memory Pools: {}\n\n",
            name,
            collector.collection_count,
            collector.collection_time_ms,
            collector.memory_pool_names.join(", ")
        ));
    }

    output.push_str(&format!("Updated: {}", clock(stats.timestamp)));
    output
}

pub fn format_health_report(health: &HealthStatus) -> String {
    format!(
        "Application Health Status\n\n\
         Overall Status: {} {}\n\n\
         Key Metrics:\n\
         - Heap Usage: {:.1}%\n\
         - Uptime: {:.1} hours\n\
         - Active Threads: {}\n\n\
         Updated: {}",
        health_marker(health.memory_status),
        health.memory_status.as_str(),
        health.heap_usage_percent,
        uptime_hours(health.uptime_ms),
        health.thread_count,
        clock(health.timestamp)
    )
}

pub fn format_dashboard(overview: &SystemOverview) -> String {
    let heap = &overview.memory.heap;
    let health = &overview.health;
    let jvm = &overview.jvm_info;

    let mut output = format!(
        "Complete Monitoring Dashboard\n\n\
         Memory Status: {} {}\n\
         - Heap: {:.1}/{:.1} MB ({:.1}%)\n\n\
         Performance:\n\
         - Uptime: {:.1} hours\n\
         - Threads: {}\n\n\
         JVM Info:\n\
         - Version: {}\n\
         - Name: {}\n\
         - Started: {}\n\n\
         Recent GC Activity:",
        health_marker(health.memory_status),
        health.memory_status.as_str(),
        heap.used_mb,
        heap.max_mb,
        heap.usage_percentage,
        uptime_hours(health.uptime_ms),
        health.thread_count,
        jvm.java_version,
        jvm.jvm_name,
        local_time(jvm.start_time, "%Y-%m-%d %H:%M:%S")
    );

    for (name, collector) in &overview.gc.collectors {
        output.push_str(&format!(
            "\n- {}: {} collections ({}ms total)",
            name, collector.collection_count, collector.collection_time_ms
        ));
    }

    output.push_str(&format!("\n\nUpdated: {}", clock(overview.timestamp)));
    output
}

pub fn format_trend(trend: &MemoryTrend) -> String {
    let settings = &trend.settings;
    let mut output = format!(
        "Memory Trend Monitoring (Duration: {} minutes, Interval: {}s)\n\n",
        settings.duration().as_secs_f64() / 60.0,
        settings.interval().as_secs_f64()
    );

    for reading in &trend.readings {
        output.push_str(&format!(
            "T+{:3}s: {:6.1} MB ({:5.1}%)\n",
            reading.offset.as_secs(),
            reading.used_mb,
            reading.usage_percentage
        ));
    }

    if trend.readings.is_empty() {
        output.push_str("No readings collected\n");
    }

    if trend.failed_samples > 0 {
        output.push_str(&format!(
            "\n{} sample(s) failed and were skipped\n",
            trend.failed_samples
        ));
    }

    if let Some(direction) = trend.direction() {
        output.push_str(&format!("\nTrend: {}", direction.as_str()));
    }

    if trend.cancelled {
        output.push_str(&format!(
            "\n\nCancelled after {} of {} sample(s)",
            trend.readings.len() as u32 + trend.failed_samples,
            settings.sample_count()
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::test_support;
    use crate::monitoring::trend::{TrendReading, TrendSettings};
    use std::time::Duration;

    fn overview() -> SystemOverview {
        serde_json::from_str(&test_support::fixture("overview").unwrap()).unwrap()
    }

    #[test]
    fn test_heap_status_thresholds() {
        assert_eq!(heap_status(0.0), "Normal");
        assert_eq!(heap_status(79.9), "Normal");
        assert_eq!(heap_status(80.0), "High");
        assert_eq!(heap_status(89.9), "High");
        assert_eq!(heap_status(90.0), "Critical");
    }

    #[test]
    fn test_memory_report() {
        let report = format_memory_report(&overview().memory);
        assert!(report.contains("- Used: 256.0 MB"));
        assert!(report.contains("- Max: 1024.0 MB"));
        assert!(report.contains("- Status: Normal"));
        assert!(report.contains("Non-Heap Memory:\n- Used: 64.5 MB"));
        assert!(report.contains("Updated: "));
    }

    #[test]
    fn test_gc_report_lists_collectors() {
        let report = format_gc_report(&overview().gc);
        assert!(report.contains("G1 Young Generation:\n- Collections: 12\n- Total Time: 85ms"));
        assert!(report.contains("- Memory Pools: G1 Eden Space, G1 Survivor Space"));
        assert!(!report.contains("timestamp"));
    }

    #[test]
    fn test_health_report() {
        let report = format_health_report(&overview().health);
        assert!(report.contains("Overall Status: [OK] HEALTHY"));
        assert!(report.contains("- Uptime: 2.0 hours"));
        assert!(report.contains("- Active Threads: 42"));
    }

    #[test]
    fn test_dashboard() {
        let report = format_dashboard(&overview());
        assert!(report.contains("- Heap: 256.0/1024.0 MB (25.0%)"));
        assert!(report.contains("- Version: 21.0.2"));
        assert!(report.contains("- G1 Old Generation: 0 collections (0ms total)"));
    }

    #[test]
    fn test_trend_report() {
        let settings =
            TrendSettings::new(Duration::from_secs(60), Duration::from_secs(30)).unwrap();
        let trend = MemoryTrend {
            settings,
            readings: vec![
                TrendReading {
                    offset: Duration::ZERO,
                    used_mb: 100.0,
                    usage_percentage: 10.0,
                },
                TrendReading {
                    offset: Duration::from_secs(30),
                    used_mb: 100.0,
                    usage_percentage: 10.0,
                },
            ],
            failed_samples: 0,
            cancelled: false,
        };

        let report = format_trend(&trend);
        assert!(report.starts_with("Memory Trend Monitoring (Duration: 1 minutes, Interval: 30s)"));
        assert!(report.contains("T+  0s:  100.0 MB ( 10.0%)"));
        assert!(report.contains("T+ 30s:  100.0 MB ( 10.0%)"));
        assert!(report.ends_with("Trend: Stable"));
    }

    #[test]
    fn test_cancelled_trend_report() {
        let settings =
            TrendSettings::new(Duration::from_secs(300), Duration::from_secs(30)).unwrap();
        let trend = MemoryTrend {
            settings,
            readings: Vec::new(),
            failed_samples: 1,
            cancelled: true,
        };

        let report = format_trend(&trend);
        assert!(report.contains("No readings collected"));
        assert!(report.contains("1 sample(s) failed"));
        assert!(report.contains("Cancelled after 1 of 10 sample(s)"));
        assert!(!report.contains("Trend:"));
    }
}
