use crate::errors::{Error, Result};
use crate::model::{Metric, StoredRow, TimeSeriesPoint};
use chrono::{DateTime, Utc};

const DISTANCE_MIN: f64 = 2.0;
const DISTANCE_MAX: f64 = 400.0;
const TEMP_MIN: f64 = -40.0;
const TEMP_MAX: f64 = 85.0;
const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;
const PRESSURE_MIN: f64 = 300.0;
const PRESSURE_MAX: f64 = 1100.0;

/// Validates one metric value against the bounds the device uses.
pub fn validate(metric: Metric, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::Validation(format!("{} is not a number", metric)));
    }

    let in_range = match metric {
        Metric::Distance => (DISTANCE_MIN..=DISTANCE_MAX).contains(&value),
        // The sensor's rated limits themselves are treated as faults.
        Metric::Temperature => value > TEMP_MIN && value < TEMP_MAX,
        Metric::Humidity => (HUMIDITY_MIN..=HUMIDITY_MAX).contains(&value),
        Metric::Pressure => (PRESSURE_MIN..=PRESSURE_MAX).contains(&value),
    };

    if !in_range {
        return Err(Error::Validation(format!(
            "{} {} out of range",
            metric, value
        )));
    }

    Ok(())
}

/// Builds the series for one metric, skipping rows where that metric is
/// missing or implausible. Rows must already be in time order.
pub fn series(rows: &[StoredRow], metric: Metric, origin: DateTime<Utc>) -> Vec<TimeSeriesPoint> {
    rows.iter()
        .filter_map(|row| {
            let value = metric.value(row)?;
            validate(metric, value).ok()?;
            Some(TimeSeriesPoint {
                hour_offset: hours_between(origin, row.timestamp),
                value,
            })
        })
        .collect()
}

pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    to.signed_duration_since(from).num_seconds() as f64 / 3600.0
}
