use crate::telemetry::distance_plausible;
use std::time::Duration;

/// Speed of sound at roughly 20 °C, in centimeters per microsecond.
pub const SOUND_CM_PER_US: f64 = 0.0343;

/// Converts a round-trip echo duration to a one-way distance in centimeters.
pub fn echo_to_distance_cm(echo: Duration) -> f64 {
    echo.as_secs_f64() * 1_000_000.0 * SOUND_CM_PER_US / 2.0
}

/// Returns the median in-range distance, or `None` when no echo converts to
/// a distance inside the sensor's range.
///
/// With an even number of valid samples the lower median is returned.
pub fn median_distance(echoes: &[Duration]) -> Option<f64> {
    let mut valid: Vec<f64> = echoes
        .iter()
        .map(|echo| echo_to_distance_cm(*echo))
        .filter(|cm| distance_plausible(*cm))
        .collect();

    if valid.is_empty() {
        return None;
    }

    valid.sort_by(f64::total_cmp);
    Some(valid[(valid.len() - 1) / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{DISTANCE_MAX_CM, DISTANCE_MIN_CM};
    use proptest::prelude::*;

    /// Echo duration that converts back to `cm`.
    fn echo_for(cm: f64) -> Duration {
        Duration::from_secs_f64(cm * 2.0 / SOUND_CM_PER_US / 1_000_000.0)
    }

    #[test]
    fn test_conversion() {
        let cm = echo_to_distance_cm(Duration::from_micros(5831));
        assert!((cm - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_single_outlier_rejected() {
        let echoes = [echo_for(100.0), echo_for(101.0), echo_for(350.0), echo_for(99.0), echo_for(100.5)];
        let median = median_distance(&echoes).unwrap();
        assert!((median - 100.5).abs() < 1e-3);
    }

    #[test]
    fn test_lower_median_for_even_count() {
        let echoes = [echo_for(10.0), echo_for(40.0), echo_for(20.0), echo_for(30.0)];
        let median = median_distance(&echoes).unwrap();
        assert!((median - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_out_of_range_discarded_before_median() {
        // Dropped pulses read as zero and far echoes exceed the range.
        let echoes = [Duration::ZERO, echo_for(500.0), echo_for(55.0), Duration::ZERO];
        let median = median_distance(&echoes).unwrap();
        assert!((median - 55.0).abs() < 1e-3);
    }

    #[test]
    fn test_no_valid_pulses_is_unavailable() {
        let echoes = [Duration::ZERO; 5];
        assert_eq!(median_distance(&echoes), None);
        assert_eq!(median_distance(&[]), None);
    }

    proptest! {
        #[test]
        fn prop_median_always_in_range(micros in proptest::collection::vec(0u64..40_000, 0..8)) {
            let echoes: Vec<Duration> = micros.iter().map(|us| Duration::from_micros(*us)).collect();
            let any_valid = echoes.iter().any(|e| distance_plausible(echo_to_distance_cm(*e)));

            match median_distance(&echoes) {
                Some(cm) => {
                    prop_assert!(any_valid);
                    prop_assert!((DISTANCE_MIN_CM..=DISTANCE_MAX_CM).contains(&cm));
                }
                None => prop_assert!(!any_valid),
            }
        }
    }
}
