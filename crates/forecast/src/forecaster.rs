//! Statistical completion-date forecasting.
//!
//! Projects remaining work over the observed velocity distribution:
//!
//! ```text
//! projected = remaining / mean
//! margin    = z * (std_dev / sqrt(n)) * sqrt(projected)
//! bounds    = predicted -/+ margin          (in periods, then calendar time)
//! ```

use burndown_core::{
    ConfidenceLevel, CvBucket, ForecastError, Result, Time, VelocityBasis, VelocitySnapshot,
    VelocityTrend,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fewest snapshots a forecast may be computed from.
pub const MIN_SNAPSHOTS: usize = 3;

/// Relative change between early and recent velocity that counts as a trend.
const TREND_THRESHOLD: f64 = 0.10;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Forecaster configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecasterConfig {
    /// Whether velocity is measured in tasks or story points
    #[serde(default)]
    pub basis: VelocityBasis,
}

/// Output of one forecast computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Reference time the projection starts from
    pub as_of: Time,

    /// Unit of velocity and remaining work
    pub basis: VelocityBasis,

    /// Interval confidence
    pub confidence_level: ConfidenceLevel,

    /// Remaining work projected
    pub remaining_work: f64,

    /// Number of snapshots used
    pub sample_size: usize,

    /// Velocity of the most recent snapshot
    pub latest_velocity: f64,

    /// Sample mean velocity
    pub velocity_mean: f64,

    /// Sample standard deviation (n - 1)
    pub velocity_std_dev: f64,

    /// Standard error of the mean
    pub standard_error: f64,

    /// Coefficient of variation in percent
    pub cv_percent: f64,

    /// Bucketed coefficient of variation
    pub cv_bucket: CvBucket,

    /// Velocity trend
    pub trend: VelocityTrend,

    /// Periods needed to finish remaining work
    pub projected_periods: f64,

    /// Half-width of the interval in periods
    pub margin_periods: f64,

    /// Length of one period in milliseconds
    pub period_length_ms: i64,

    /// Half-width of the interval in days
    pub days_margin_of_error: f64,

    /// Point estimate
    pub predicted_completion_date: Time,

    /// Interval lower bound
    pub lower_bound: Time,

    /// Interval upper bound
    pub upper_bound: Time,
}

impl ForecastResult {
    /// Half-width of the interval as calendar time.
    pub fn margin(&self) -> Duration {
        self.upper_bound - self.predicted_completion_date
    }

    /// Length of one snapshot period.
    pub fn period_length(&self) -> Duration {
        Duration::milliseconds(self.period_length_ms)
    }
}

/// Computes completion-date forecasts from snapshot history.
#[derive(Debug, Clone, Default)]
pub struct StatisticalForecaster {
    config: ForecasterConfig,
}

impl StatisticalForecaster {
    /// Create a task-count forecaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ForecasterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the velocity basis.
    pub fn with_basis(mut self, basis: VelocityBasis) -> Self {
        self.config.basis = basis;
        self
    }

    /// Configured velocity basis.
    pub fn basis(&self) -> VelocityBasis {
        self.config.basis
    }

    /// Forecast when `remaining_work` will be done, as of `now`.
    ///
    /// Snapshots may be passed in any order; they are ordered by
    /// `period_start` before the trend is computed.
    pub fn forecast(
        &self,
        snapshots: &[VelocitySnapshot],
        remaining_work: f64,
        confidence_level: ConfidenceLevel,
        now: Time,
    ) -> Result<ForecastResult> {
        if !remaining_work.is_finite() || remaining_work < 0.0 {
            return Err(ForecastError::validation(format!(
                "remaining work must be a non-negative number (got {})",
                remaining_work
            )));
        }

        if snapshots.len() < MIN_SNAPSHOTS {
            return Err(ForecastError::insufficient(format!(
                "need at least {} snapshots, have {}",
                MIN_SNAPSHOTS,
                snapshots.len()
            )));
        }

        if let Some(bad) = snapshots.iter().find(|s| s.period_end <= s.period_start) {
            return Err(ForecastError::validation(format!(
                "snapshot starting {} has a non-positive period",
                bad.period_start
            )));
        }

        let mut ordered: Vec<&VelocitySnapshot> = snapshots.iter().collect();
        ordered.sort_by_key(|s| s.period_start);

        let basis = self.config.basis;
        let velocities: Vec<f64> = ordered.iter().map(|s| s.velocity(basis)).collect();
        let n = velocities.len();

        let velocity_mean = mean(&velocities);
        if velocity_mean <= 0.0 {
            return Err(ForecastError::insufficient(
                "mean velocity is zero; completion horizon is undefined",
            ));
        }
        let velocity_std_dev = sample_std_dev(&velocities, velocity_mean);

        let projected_periods = remaining_work / velocity_mean;
        let standard_error = velocity_std_dev / (n as f64).sqrt();
        let margin_periods =
            confidence_level.z_value() * standard_error * projected_periods.sqrt();

        let cv_percent = velocity_std_dev / velocity_mean * 100.0;
        let cv_bucket = CvBucket::from_cv(cv_percent);
        let trend = velocity_trend(&velocities);

        let latest = ordered[n - 1];
        let period_length_ms = latest.period_length().num_milliseconds();
        let period_ms = period_length_ms as f64;

        let offset = periods_to_duration(projected_periods, period_ms)?;
        let margin = periods_to_duration(margin_periods, period_ms)?;

        let predicted_completion_date = add_checked(now, offset)?;
        let lower_bound = predicted_completion_date
            .checked_sub_signed(margin)
            .ok_or_else(out_of_range)?;
        let upper_bound = add_checked(predicted_completion_date, margin)?;

        debug!(
            mean = velocity_mean,
            std_dev = velocity_std_dev,
            projected_periods,
            margin_periods,
            "Computed velocity forecast over {} snapshots",
            n
        );

        Ok(ForecastResult {
            as_of: now,
            basis,
            confidence_level,
            remaining_work,
            sample_size: n,
            latest_velocity: latest.velocity(basis),
            velocity_mean,
            velocity_std_dev,
            standard_error,
            cv_percent,
            cv_bucket,
            trend,
            projected_periods,
            margin_periods,
            period_length_ms,
            days_margin_of_error: margin_periods * period_ms / MILLIS_PER_DAY,
            predicted_completion_date,
            lower_bound,
            upper_bound,
        })
    }
}

/// Arithmetic mean. Zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with the n - 1 denominator.
pub fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Compare the most recent third of the series against the earliest third.
pub fn velocity_trend(values: &[f64]) -> VelocityTrend {
    if values.len() < 2 {
        return VelocityTrend::Stable;
    }
    let k = (values.len() / 3).max(1);
    let early = mean(&values[..k]);
    let recent = mean(&values[values.len() - k..]);

    if early <= 0.0 {
        return if recent > 0.0 {
            VelocityTrend::Increasing
        } else {
            VelocityTrend::Stable
        };
    }

    let change = (recent - early) / early;
    if change > TREND_THRESHOLD {
        VelocityTrend::Increasing
    } else if change < -TREND_THRESHOLD {
        VelocityTrend::Decreasing
    } else {
        VelocityTrend::Stable
    }
}

fn periods_to_duration(periods: f64, period_ms: f64) -> Result<Duration> {
    let millis = (periods * period_ms).round();
    // chrono caps durations at i64::MAX milliseconds; stay well inside that
    if !millis.is_finite() || millis.abs() > (i64::MAX / 4) as f64 {
        return Err(out_of_range());
    }
    Duration::try_milliseconds(millis as i64).ok_or_else(out_of_range)
}

fn add_checked(t: Time, d: Duration) -> Result<Time> {
    t.checked_add_signed(d).ok_or_else(out_of_range)
}

fn out_of_range() -> ForecastError {
    ForecastError::insufficient("velocity too low: completion horizon exceeds the calendar range")
}
