use crate::errors::{Error, Result};
use crate::median::median_distance;
use crate::metrics::SENSOR_FAULTS_TOTAL;
use crate::telemetry::{humidity_plausible, pressure_plausible, temperature_plausible, Reading};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Ultrasonic ranger driven one pulse at a time.
pub trait Ranger {
    /// Fires one pulse and returns the echo's round-trip time, or `None`
    /// when no echo came back before the sensor's own timeout.
    fn pulse(&mut self) -> impl Future<Output = Option<Duration>>;
}

/// Raw environmental values as read from the sensor registers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvSample {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

/// Temperature/humidity/pressure sensor on a register bus.
pub trait EnvironmentSensor {
    /// Checks that the sensor answers at all. Called once at startup.
    fn probe(&mut self) -> impl Future<Output = Result<()>>;

    fn read(&mut self) -> impl Future<Output = Result<EnvSample>>;
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    /// Pulses fired per reading.
    pub pulses: usize,
    /// Pause between pulses so late echoes of the previous one die out.
    pub pulse_gap: Duration,
    /// Upper bound for one pulse; a ranger that never answers counts as no echo.
    pub pulse_timeout: Duration,
    /// Upper bound for a single environmental bus transaction.
    pub bus_timeout: Duration,
}

impl SamplerSettings {
    /// Longest a single [`SensorSampler::sample`] call can take.
    pub fn worst_case(&self) -> Duration {
        (self.pulse_timeout + self.pulse_gap) * self.pulses as u32 + self.bus_timeout
    }
}

pub struct SensorSampler<R, E> {
    ranger: R,
    env: E,
    settings: SamplerSettings,
}

impl<R: Ranger, E: EnvironmentSensor> SensorSampler<R, E> {
    pub fn new(ranger: R, env: E, settings: SamplerSettings) -> Self {
        Self {
            ranger,
            env,
            settings,
        }
    }

    /// Fails when the environmental sensor is absent.
    pub async fn probe(&mut self) -> Result<()> {
        timeout(self.settings.bus_timeout, self.env.probe())
            .await
            .map_err(|_| Error::Sensor("environmental sensor did not answer probe".to_string()))?
    }

    /// Produces one reading stamped with `timestamp`.
    ///
    /// Sensor faults never abort the cycle: a failed field is left out and
    /// the rest of the reading is still returned.
    pub async fn sample(&mut self, timestamp: DateTime<Utc>) -> Reading {
        let distance = self.measure_distance().await;

        let (temperature, humidity, pressure) = match timeout(self.settings.bus_timeout, self.env.read()).await {
            Ok(Ok(sample)) => check_environment(sample),
            Ok(Err(e)) => {
                warn!(error = %e, "Environmental read failed");
                SENSOR_FAULTS_TOTAL.inc();
                (None, None, None)
            }
            Err(_) => {
                warn!(timeout = ?self.settings.bus_timeout, "Environmental read timed out");
                SENSOR_FAULTS_TOTAL.inc();
                (None, None, None)
            }
        };

        let reading = Reading {
            distance,
            temperature,
            humidity,
            pressure,
            timestamp,
            environmental_valid: temperature.is_some() && humidity.is_some(),
        };
        debug!(?reading, "Sampled");
        reading
    }

    async fn measure_distance(&mut self) -> Option<f64> {
        let mut echoes = Vec::with_capacity(self.settings.pulses);
        for i in 0..self.settings.pulses {
            if i > 0 {
                sleep(self.settings.pulse_gap).await;
            }
            match timeout(self.settings.pulse_timeout, self.ranger.pulse()).await {
                Ok(Some(echo)) => echoes.push(echo),
                Ok(None) => {}
                Err(_) => debug!(pulse = i, "Ranger did not answer in time"),
            }
        }

        let distance = median_distance(&echoes);
        if distance.is_none() {
            warn!(
                pulses = self.settings.pulses,
                echoes = echoes.len(),
                "No in-range echo, distance unavailable"
            );
            SENSOR_FAULTS_TOTAL.inc();
        }
        distance
    }
}

/// Drops implausible temperature/humidity values. Pressure is only flagged;
/// the remote store applies its own bound on ingestion.
fn check_environment(sample: EnvSample) -> (Option<f64>, Option<f64>, Option<f64>) {
    let temperature = if temperature_plausible(sample.temperature) {
        Some(sample.temperature)
    } else {
        warn!(temperature = sample.temperature, "Implausible temperature");
        SENSOR_FAULTS_TOTAL.inc();
        None
    };

    let humidity = if humidity_plausible(sample.humidity) {
        Some(sample.humidity)
    } else {
        warn!(humidity = sample.humidity, "Implausible humidity");
        SENSOR_FAULTS_TOTAL.inc();
        None
    };

    let pressure = if sample.pressure.is_finite() {
        if !pressure_plausible(sample.pressure) {
            warn!(pressure = sample.pressure, "Pressure outside expected range");
        }
        Some(sample.pressure)
    } else {
        SENSOR_FAULTS_TOTAL.inc();
        None
    };

    (temperature, humidity, pressure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{TEMP_MAX, TEMP_MIN};
    use proptest::prelude::*;
    use std::collections::VecDeque;

    struct FakeRanger {
        echoes: VecDeque<Option<Duration>>,
    }

    impl Ranger for FakeRanger {
        async fn pulse(&mut self) -> Option<Duration> {
            self.echoes.pop_front().flatten()
        }
    }

    struct FakeEnv {
        sample: Option<EnvSample>,
    }

    impl EnvironmentSensor for FakeEnv {
        async fn probe(&mut self) -> Result<()> {
            match self.sample {
                Some(_) => Ok(()),
                None => Err(Error::Sensor("no device at address".to_string())),
            }
        }

        async fn read(&mut self) -> Result<EnvSample> {
            self.sample
                .ok_or_else(|| Error::Sensor("bus NACK".to_string()))
        }
    }

    fn settings() -> SamplerSettings {
        SamplerSettings {
            pulses: 5,
            pulse_gap: Duration::ZERO,
            pulse_timeout: Duration::from_millis(100),
            bus_timeout: Duration::from_secs(1),
        }
    }

    fn sampler(echoes: Vec<Option<Duration>>, sample: Option<EnvSample>) -> SensorSampler<FakeRanger, FakeEnv> {
        SensorSampler::new(
            FakeRanger {
                echoes: echoes.into(),
            },
            FakeEnv { sample },
            settings(),
        )
    }

    fn good_env() -> EnvSample {
        EnvSample {
            temperature: 22.4,
            humidity: 51.0,
            pressure: 1009.8,
        }
    }

    #[test]
    fn test_zero_valid_pulses_keeps_environmental_fields() {
        tokio_test::block_on(async {
            let mut sampler = sampler(vec![None; 5], Some(good_env()));
            let reading = sampler.sample(Utc::now()).await;

            assert_eq!(reading.distance, None);
            assert_eq!(reading.temperature, Some(22.4));
            assert!(reading.environmental_valid);
        });
    }

    #[test]
    fn test_failed_environmental_read_keeps_distance() {
        tokio_test::block_on(async {
            let echo = Some(Duration::from_micros(5831));
            let mut sampler = sampler(vec![echo; 5], None);
            let reading = sampler.sample(Utc::now()).await;

            assert!(reading.distance.is_some());
            assert_eq!(reading.temperature, None);
            assert_eq!(reading.humidity, None);
            assert_eq!(reading.pressure, None);
            assert!(!reading.environmental_valid);
        });
    }

    #[test]
    fn test_implausible_temperature_clears_validity_only_for_that_field() {
        tokio_test::block_on(async {
            let env = EnvSample {
                temperature: 150.0,
                ..good_env()
            };
            let mut sampler = sampler(vec![None; 5], Some(env));
            let reading = sampler.sample(Utc::now()).await;

            assert_eq!(reading.temperature, None);
            assert_eq!(reading.humidity, Some(51.0));
            assert_eq!(reading.pressure, Some(1009.8));
            assert!(!reading.environmental_valid);
        });
    }

    /// Never answers, like a ranger with a wedged echo line.
    struct SilentRanger;

    impl Ranger for SilentRanger {
        async fn pulse(&mut self) -> Option<Duration> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_silent_ranger_is_bounded_by_pulse_timeout() {
        let settings = SamplerSettings {
            pulses: 3,
            pulse_gap: Duration::from_millis(5),
            pulse_timeout: Duration::from_millis(20),
            bus_timeout: Duration::from_secs(1),
        };
        let mut sampler = SensorSampler::new(SilentRanger, FakeEnv { sample: Some(good_env()) }, settings);

        let started = std::time::Instant::now();
        let reading = sampler.sample(Utc::now()).await;

        assert_eq!(reading.distance, None);
        assert_eq!(reading.temperature, Some(22.4));
        assert!(started.elapsed() < settings.worst_case() + Duration::from_millis(500));
    }

    #[test]
    fn test_worst_case_counts_every_pulse_and_the_bus_read() {
        let settings = SamplerSettings {
            pulses: 5,
            pulse_gap: Duration::from_millis(60),
            pulse_timeout: Duration::from_millis(100),
            bus_timeout: Duration::from_secs(2),
        };
        assert_eq!(settings.worst_case(), Duration::from_millis(2800));
    }

    #[test]
    fn test_probe_fails_without_sensor() {
        tokio_test::block_on(async {
            let mut absent = sampler(vec![], None);
            assert!(absent.probe().await.is_err());

            let mut present = sampler(vec![], Some(good_env()));
            assert!(present.probe().await.is_ok());
        });
    }

    proptest! {
        #[test]
        fn prop_environmental_valid_implies_plausible(
            temperature in -100.0f64..150.0,
            humidity in -20.0f64..120.0,
            pressure in 0.0f64..2000.0,
        ) {
            let reading = tokio_test::block_on(async {
                let mut sampler = sampler(vec![], Some(EnvSample { temperature, humidity, pressure }));
                sampler.sample(Utc::now()).await
            });

            if reading.environmental_valid {
                let t = reading.temperature.unwrap();
                let h = reading.humidity.unwrap();
                prop_assert!(t > TEMP_MIN && t < TEMP_MAX);
                prop_assert!((0.0..=100.0).contains(&h));
            }
        }
    }
}
