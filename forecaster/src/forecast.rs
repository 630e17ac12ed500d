use crate::errors::{Error, Result};
use crate::model::{ForecastBand, ForecastPoint, ForecastRow, Metric, StoredRow, TimeSeriesPoint};
use crate::validate::{hours_between, series};
use chrono::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MIN_HISTORY: usize = 10;
pub const DEFAULT_HORIZON_HOURS: usize = 24;
pub const MIN_WINDOW: usize = 12;
pub const MAX_WINDOW: usize = 30;
/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.96;

/// Line fitted over the most recent window of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub residual_std: f64,
    pub window: usize,
    /// All window points shared one time value; the fit is flat at the mean.
    pub degenerate: bool,
}

impl LinearFit {
    pub fn band_at(&self, hour_offset: f64) -> ForecastBand {
        let estimate = self.intercept + self.slope * hour_offset;
        let half_width = Z_95 * self.residual_std;
        ForecastBand {
            point: round3(estimate),
            upper: round3(estimate + half_width),
            lower: round3(estimate - half_width),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastEngine {
    min_history: usize,
    horizon_hours: usize,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_HISTORY, DEFAULT_HORIZON_HOURS)
    }
}

impl ForecastEngine {
    pub fn new(min_history: usize, horizon_hours: usize) -> Self {
        Self {
            // Residual spread needs at least three points.
            min_history: min_history.max(3),
            horizon_hours,
        }
    }

    pub fn horizon_hours(&self) -> usize {
        self.horizon_hours
    }

    /// Fits one metric's series, ordered by time.
    pub fn fit(&self, metric: Metric, points: &[TimeSeriesPoint]) -> Result<LinearFit> {
        if points.len() < self.min_history {
            return Err(Error::InsufficientData {
                metric,
                available: points.len(),
                required: self.min_history,
            });
        }

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let window = adaptive_window(&values);
        let fit = least_squares(&points[points.len() - window..]);

        if fit.degenerate {
            warn!(%metric, window, "Window has no time spread, using flat forecast");
        }
        debug!(
            %metric,
            window,
            slope = fit.slope,
            residual_std = fit.residual_std,
            "Fitted"
        );
        Ok(fit)
    }

    /// Forecasts one metric at each of the given future hour offsets.
    pub fn forecast_metric(
        &self,
        metric: Metric,
        points: &[TimeSeriesPoint],
        future_hours: &[f64],
    ) -> Result<Vec<ForecastBand>> {
        let fit = self.fit(metric, points)?;
        Ok(future_hours.iter().map(|hour| fit.band_at(*hour)).collect())
    }

    /// Forecasts every metric for the next `horizon_hours` hours after the
    /// newest row.
    ///
    /// If any metric has too little history the whole run fails and nothing
    /// is produced.
    pub fn forecast_rows(&self, rows: &[StoredRow]) -> Result<Vec<ForecastRow>> {
        let mut rows = rows.to_vec();
        rows.sort_by_key(|row| row.timestamp);

        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(Error::InsufficientData {
                metric: Metric::Distance,
                available: 0,
                required: self.min_history,
            });
        };
        let origin = first.timestamp;
        let newest = last.timestamp;

        let mut fits = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let points = series(&rows, metric, origin);
            fits.push(self.fit(metric, &points)?);
        }

        let forecast: Vec<ForecastRow> = (1..=self.horizon_hours as i64)
            .map(|step| {
                let timestamp = newest + Duration::hours(step);
                let hour = hours_between(origin, timestamp);
                ForecastRow {
                    timestamp,
                    distance: fits[0].band_at(hour),
                    temperature: fits[1].band_at(hour),
                    humidity: fits[2].band_at(hour),
                    pressure: fits[3].band_at(hour),
                }
            })
            .collect();

        info!(
            rows = rows.len(),
            horizon = self.horizon_hours,
            "Forecast computed"
        );
        Ok(forecast)
    }

    /// Per-metric view of [`forecast_rows`](Self::forecast_rows).
    pub fn forecast_points(&self, rows: &[ForecastRow], metric: Metric) -> Vec<ForecastPoint> {
        rows.iter()
            .map(|row| ForecastPoint {
                timestamp: row.timestamp,
                band: match metric {
                    Metric::Distance => row.distance,
                    Metric::Temperature => row.temperature,
                    Metric::Humidity => row.humidity,
                    Metric::Pressure => row.pressure,
                },
            })
            .collect()
    }
}

/// `clamp(floor(30 / (variance + 1)), 12, 30)`, capped at the series length.
///
/// Noisy series get a short window so the line follows recent behavior.
pub fn adaptive_window(values: &[f64]) -> usize {
    let std = sample_std(values);
    let variance = std * std;
    let raw = (MAX_WINDOW as f64 / (variance + 1.0)).floor() as usize;
    raw.clamp(MIN_WINDOW, MAX_WINDOW).min(values.len())
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

fn least_squares(window: &[TimeSeriesPoint]) -> LinearFit {
    let n = window.len() as f64;
    let mean_x = window.iter().map(|p| p.hour_offset).sum::<f64>() / n;
    let mean_y = window.iter().map(|p| p.value).sum::<f64>() / n;

    let sxx: f64 = window.iter().map(|p| (p.hour_offset - mean_x).powi(2)).sum();
    let sxy: f64 = window
        .iter()
        .map(|p| (p.hour_offset - mean_x) * (p.value - mean_y))
        .sum();

    let degenerate = sxx.abs() < f64::EPSILON;
    let (slope, intercept) = if degenerate {
        (0.0, mean_y)
    } else {
        let slope = sxy / sxx;
        (slope, mean_y - slope * mean_x)
    };

    // A flat fit estimates one parameter, a line two.
    let dof = if degenerate { n - 1.0 } else { n - 2.0 };
    let sse: f64 = window
        .iter()
        .map(|p| (p.value - (intercept + slope * p.hour_offset)).powi(2))
        .sum();
    let residual_std = if dof > 0.0 { (sse / dof).sqrt() } else { 0.0 };

    LinearFit {
        slope,
        intercept,
        residual_std,
        window: window.len(),
        degenerate,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
