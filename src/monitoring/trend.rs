//! Cancellable memory trend sampling
//!
//! Samples heap usage on a fixed interval. The first sample is taken
//! immediately and there is no wait after the last one. Cancelling the token
//! ends sampling at once and returns what was collected so far.

use crate::monitoring::client::MemorySampler;
use crate::types::MonitorError;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on readings in one trend.
pub const MAX_TREND_SAMPLES: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSettings {
    duration: Duration,
    interval: Duration,
}

impl TrendSettings {
    pub fn new(duration: Duration, interval: Duration) -> Result<Self, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidTrend(
                "interval must be positive".to_string(),
            ));
        }
        if duration.is_zero() {
            return Err(MonitorError::InvalidTrend(
                "duration must be positive".to_string(),
            ));
        }
        Ok(Self { duration, interval })
    }

    /// From the tool's `duration_minutes` / `interval_seconds` arguments.
    pub fn from_minutes_and_seconds(
        duration_minutes: f64,
        interval_seconds: f64,
    ) -> Result<Self, MonitorError> {
        let duration = Duration::try_from_secs_f64(duration_minutes * 60.0).map_err(|e| {
            MonitorError::InvalidTrend(format!("duration_minutes {}: {}", duration_minutes, e))
        })?;
        let interval = Duration::try_from_secs_f64(interval_seconds).map_err(|e| {
            MonitorError::InvalidTrend(format!("interval_seconds {}: {}", interval_seconds, e))
        })?;
        Self::new(duration, interval)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `floor(duration / interval)`, at least one, capped.
    pub fn sample_count(&self) -> u32 {
        let count = (self.duration.as_secs_f64() / self.interval.as_secs_f64()).floor();
        (count as u32).clamp(1, MAX_TREND_SAMPLES)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendReading {
    /// Scheduled offset from the first sample.
    pub offset: Duration,
    pub used_mb: f64,
    pub usage_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "Increasing",
            Self::Decreasing => "Decreasing",
            Self::Stable => "Stable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTrend {
    pub settings: TrendSettings,
    pub readings: Vec<TrendReading>,
    pub failed_samples: u32,
    pub cancelled: bool,
}

impl MemoryTrend {
    /// First versus last reading; needs at least two readings.
    pub fn direction(&self) -> Option<TrendDirection> {
        if self.readings.len() < 2 {
            return None;
        }

        let first = self.readings.first()?.used_mb;
        let last = self.readings.last()?.used_mb;

        Some(if last > first {
            TrendDirection::Increasing
        } else if last < first {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        })
    }
}

pub async fn sample_memory_trend(
    sampler: &dyn MemorySampler,
    settings: TrendSettings,
    cancel: &CancellationToken,
) -> MemoryTrend {
    let samples = settings.sample_count();
    let mut trend = MemoryTrend {
        settings,
        readings: Vec::with_capacity(samples as usize),
        failed_samples: 0,
        cancelled: false,
    };

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        "Sampling memory {} times every {:?}",
        samples, settings.interval
    );

    for i in 0..samples {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                trend.cancelled = true;
                break;
            }
        }

        let sample = tokio::select! {
            sample = sampler.sample_memory() => sample,
            _ = cancel.cancelled() => {
                trend.cancelled = true;
                break;
            }
        };

        match sample {
            Ok(stats) => trend.readings.push(TrendReading {
                offset: settings.interval * i,
                used_mb: stats.heap.used_mb,
                usage_percentage: stats.heap.usage_percentage,
            }),
            Err(e) => {
                warn!("Memory sample {} failed: {}", i, e);
                trend.failed_samples += 1;
            }
        }
    }

    trend
}
