use chrono::{DateTime, Utc};

pub const DISTANCE_MIN_CM: f64 = 2.0;
pub const DISTANCE_MAX_CM: f64 = 400.0;
pub const TEMP_MIN: f64 = -40.0;
pub const TEMP_MAX: f64 = 85.0;
pub const HUMIDITY_MIN: f64 = 0.0;
pub const HUMIDITY_MAX: f64 = 100.0;
pub const PRESSURE_MIN: f64 = 300.0;
pub const PRESSURE_MAX: f64 = 1100.0;

/// Wire value for a field the node could not measure.
pub const UNAVAILABLE: &str = "NaN";

/// One sampled instant.
///
/// `None` marks a field that is unavailable for this cycle. A reading is
/// handed to the upload client by value and never kept after the attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub distance: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub environmental_valid: bool,
}

impl Reading {
    /// Request parameters in the order the remote endpoint documents them.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("distance", format_field(self.distance)),
            ("temperature", format_field(self.temperature)),
            ("humidity", format_field(self.humidity)),
            ("pressure", format_field(self.pressure)),
            ("timestamp", self.timestamp.timestamp().to_string()),
        ]
    }
}

fn format_field(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => UNAVAILABLE.to_string(),
    }
}

pub fn temperature_plausible(celsius: f64) -> bool {
    celsius > TEMP_MIN && celsius < TEMP_MAX
}

pub fn humidity_plausible(percent: f64) -> bool {
    (HUMIDITY_MIN..=HUMIDITY_MAX).contains(&percent)
}

pub fn pressure_plausible(hpa: f64) -> bool {
    (PRESSURE_MIN..=PRESSURE_MAX).contains(&hpa)
}

pub fn distance_plausible(cm: f64) -> bool {
    (DISTANCE_MIN_CM..=DISTANCE_MAX_CM).contains(&cm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            distance: Some(123.456),
            temperature: Some(21.5),
            humidity: Some(40.0),
            pressure: Some(1013.25),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            environmental_valid: true,
        }
    }

    #[test]
    fn test_query_uses_two_decimals_and_unix_seconds() {
        let query = reading().to_query();
        assert_eq!(
            query,
            vec![
                ("distance", "123.46".to_string()),
                ("temperature", "21.50".to_string()),
                ("humidity", "40.00".to_string()),
                ("pressure", "1013.25".to_string()),
                ("timestamp", "1700000000".to_string()),
            ]
        );
    }

    #[test]
    fn test_unavailable_fields_sent_as_sentinel() {
        let mut r = reading();
        r.distance = None;
        r.pressure = Some(f64::NAN);
        let query = r.to_query();
        assert_eq!(query[0].1, UNAVAILABLE);
        assert_eq!(query[3].1, UNAVAILABLE);
        assert_eq!(query[1].1, "21.50");
    }

    #[test]
    fn test_plausibility_bounds() {
        assert!(!temperature_plausible(-40.0));
        assert!(temperature_plausible(-39.9));
        assert!(!temperature_plausible(85.0));
        assert!(humidity_plausible(0.0));
        assert!(humidity_plausible(100.0));
        assert!(!humidity_plausible(100.1));
        assert!(pressure_plausible(300.0));
        assert!(!pressure_plausible(1100.5));
        assert!(distance_plausible(2.0));
        assert!(!distance_plausible(400.01));
        assert!(!distance_plausible(f64::NAN));
    }
}
