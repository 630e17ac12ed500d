use crate::errors::{Error, Result};
use crate::median::SOUND_CM_PER_US;
use crate::sampler::{EnvSample, EnvironmentSensor, Ranger};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

pub struct SimulatedRanger {
    rng: StdRng,
    target_cm: f64,
    dropout_rate: f64,
    spurious_rate: f64,
}

impl SimulatedRanger {
    pub fn new(target_cm: f64, dropout_rate: f64, spurious_rate: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            target_cm,
            dropout_rate: dropout_rate.clamp(0.0, 1.0),
            spurious_rate: spurious_rate.clamp(0.0, 1.0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl Ranger for SimulatedRanger {
    async fn pulse(&mut self) -> Option<Duration> {
        if self.rng.gen_bool(self.dropout_rate) {
            return None;
        }

        let cm = if self.rng.gen_bool(self.spurious_rate) {
            self.rng.gen_range(0.5..600.0) // stray echo
        } else {
            self.target_cm + self.rng.gen_range(-1.5..1.5)
        };

        let micros = (cm * 2.0 / SOUND_CM_PER_US).max(0.0);
        Some(Duration::from_micros(micros as u64))
    }
}

pub struct SimulatedEnvironment {
    rng: StdRng,
    fault_rate: f64,
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

impl SimulatedEnvironment {
    pub fn new(fault_rate: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            fault_rate: fault_rate.clamp(0.0, 1.0),
            temperature: 21.0,
            humidity: 45.0,
            pressure: 1013.0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl EnvironmentSensor for SimulatedEnvironment {
    async fn probe(&mut self) -> Result<()> {
        if self.fault_rate >= 1.0 {
            return Err(Error::Sensor("simulated sensor configured absent".to_string()));
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<EnvSample> {
        if self.rng.gen_bool(self.fault_rate) {
            return Err(Error::Sensor("simulated bus error".to_string()));
        }

        // Slow random walk inside realistic indoor bounds.
        self.temperature = (self.temperature + self.rng.gen_range(-0.2..0.2)).clamp(10.0, 35.0);
        self.humidity = (self.humidity + self.rng.gen_range(-0.5..0.5)).clamp(20.0, 80.0);
        self.pressure = (self.pressure + self.rng.gen_range(-0.3..0.3)).clamp(980.0, 1040.0);

        Ok(EnvSample {
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
        })
    }
}
