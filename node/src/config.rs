use crate::acquisition::LoopSettings;
use crate::connectivity::RetryPolicy;
use crate::errors::{Error, Result};
use crate::sampler::SamplerSettings;
use clap::{Args, Parser, Subcommand};
use reqwest::Url;
use std::net::SocketAddr;
use std::time::Duration;

/// Pause between failed initial time syncs.
const SYNC_RETRY_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "node", version, about = "Environmental telemetry node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the acquisition loop in this process.
    Run(NodeConfig),
    /// Run the acquisition loop as a child process and restart it on exit.
    Supervise(SuperviseConfig),
}

#[derive(Debug, Clone, Args)]
pub struct SuperviseConfig {
    /// Delay before restarting the child.
    #[arg(long, env = "NODE_RESTART_BACKOFF_MS", default_value_t = 2000)]
    pub restart_backoff_ms: u64,

    /// Arguments passed to `node run`.
    #[arg(last = true)]
    pub run_args: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct NodeConfig {
    /// Remote store endpoint receiving one request per reading.
    #[arg(long, env = "NODE_ENDPOINT")]
    pub endpoint: String,

    #[arg(long, env = "NODE_INTERVAL_SECS", default_value_t = 5)]
    pub interval_secs: u64,

    #[arg(long, env = "NODE_WATCHDOG_SECS", default_value_t = 20)]
    pub watchdog_secs: u64,

    /// Loop wake-up period for feeding the watchdog.
    #[arg(long, env = "NODE_POLL_MS", default_value_t = 250)]
    pub poll_ms: u64,

    #[arg(long, env = "NODE_PULSES", default_value_t = 5)]
    pub pulses: usize,

    #[arg(long, env = "NODE_PULSE_GAP_MS", default_value_t = 60)]
    pub pulse_gap_ms: u64,

    #[arg(long, env = "NODE_PULSE_TIMEOUT_MS", default_value_t = 100)]
    pub pulse_timeout_ms: u64,

    #[arg(long, env = "NODE_SENSOR_TIMEOUT_MS", default_value_t = 2000)]
    pub sensor_timeout_ms: u64,

    #[arg(long, env = "NODE_NTP_SERVER", default_value = "pool.ntp.org:123")]
    pub ntp_server: String,

    #[arg(long, env = "NODE_NTP_TIMEOUT_MS", default_value_t = 1000)]
    pub ntp_timeout_ms: u64,

    #[arg(long, env = "NODE_RESYNC_SECS", default_value_t = 60)]
    pub resync_secs: u64,

    #[arg(long, env = "NODE_CONNECT_ATTEMPTS", default_value_t = 30)]
    pub connect_attempts: u32,

    #[arg(long, env = "NODE_CONNECT_WAIT_MS", default_value_t = 100)]
    pub connect_wait_ms: u64,

    #[arg(long, env = "NODE_CONNECT_TIMEOUT_MS", default_value_t = 100)]
    pub connect_timeout_ms: u64,

    #[arg(long, env = "NODE_UPLOAD_TIMEOUT_SECS", default_value_t = 5)]
    pub upload_timeout_secs: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "NODE_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "NODE_SIM_DISTANCE_CM", default_value_t = 120.0)]
    pub sim_distance_cm: f64,

    #[arg(long, env = "NODE_SIM_DROPOUT_RATE", default_value_t = 0.1)]
    pub sim_dropout_rate: f64,

    #[arg(long, env = "NODE_SIM_SPURIOUS_RATE", default_value_t = 0.05)]
    pub sim_spurious_rate: f64,

    #[arg(long, env = "NODE_SIM_ENV_FAULT_RATE", default_value_t = 0.02)]
    pub sim_env_fault_rate: f64,
}

impl NodeConfig {
    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(&self.endpoint).map_err(|e| Error::Config(format!("invalid endpoint {}: {}", self.endpoint, e)))
    }

    pub fn watchdog_deadline(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn ntp_timeout(&self) -> Duration {
        Duration::from_millis(self.ntp_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            wait: Duration::from_millis(self.connect_wait_ms),
        }
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            pulses: self.pulses,
            pulse_gap: Duration::from_millis(self.pulse_gap_ms),
            pulse_timeout: Duration::from_millis(self.pulse_timeout_ms),
            bus_timeout: Duration::from_millis(self.sensor_timeout_ms),
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            interval: Duration::from_secs(self.interval_secs),
            poll: Duration::from_millis(self.poll_ms),
            resync_every: Duration::from_secs(self.resync_secs),
            sync_retry_wait: SYNC_RETRY_WAIT,
        }
    }

    /// Longest a cycle can run without anything hanging: a full round of
    /// connect attempts, a resync, a sampling pass, and an upload that times
    /// out, back to back.
    pub fn worst_case_cycle(&self) -> Duration {
        let policy = self.retry_policy();
        let connect_round = (policy.wait + self.connect_timeout()) * policy.max_attempts;
        connect_round + self.ntp_timeout() + self.sampler_settings().worst_case() + self.upload_timeout()
    }

    /// The watchdog is fed between cycles only, so the slowest legitimate
    /// cycle plus one poll period must fit inside the deadline.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint_url()?;
        if endpoint.scheme() != "https" {
            return Err(Error::Config(format!(
                "endpoint {} must use https://",
                self.endpoint
            )));
        }

        if self.interval_secs == 0 {
            return Err(Error::Config("interval_secs must be greater than 0".to_string()));
        }

        if self.pulses == 0 {
            return Err(Error::Config("pulses must be at least 1".to_string()));
        }

        if self.connect_attempts == 0 {
            return Err(Error::Config("connect_attempts must be at least 1".to_string()));
        }

        let deadline = self.watchdog_deadline();
        let poll = Duration::from_millis(self.poll_ms);
        if poll >= deadline {
            return Err(Error::Config("poll period must be shorter than the watchdog deadline".to_string()));
        }

        let worst = self.worst_case_cycle();
        if worst + poll >= deadline {
            return Err(Error::Config(format!(
                "worst-case cycle of {:?} plus poll period does not fit the {:?} watchdog deadline",
                worst, deadline
            )));
        }

        for (name, rate) in [
            ("sim_dropout_rate", self.sim_dropout_rate),
            ("sim_spurious_rate", self.sim_spurious_rate),
            ("sim_env_fault_rate", self.sim_env_fault_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::Config(format!("{} must be within [0, 1]", name)));
            }
        }

        Ok(())
    }
}
