use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the remote append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub distance: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Distance,
    Temperature,
    Humidity,
    Pressure,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Distance,
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Distance => "distance",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
        }
    }

    pub fn value(self, row: &StoredRow) -> Option<f64> {
        match self {
            Metric::Distance => row.distance,
            Metric::Temperature => row.temperature,
            Metric::Humidity => row.humidity,
            Metric::Pressure => row.pressure,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A metric value positioned in hours since the start of the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub hour_offset: f64,
    pub value: f64,
}

/// Point estimate with a symmetric band; `lower <= point <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastBand {
    pub point: f64,
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub band: ForecastBand,
}

/// One future hour across all metrics, as written to the forecast table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub distance: ForecastBand,
    pub temperature: ForecastBand,
    pub humidity: ForecastBand,
    pub pressure: ForecastBand,
}
