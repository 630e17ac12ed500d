use crate::clock::{NetworkTime, TimeSource};
use crate::connectivity::{ConnectionState, ConnectivitySupervisor, Link};
use crate::errors::Result;
use crate::indicator::Indicator;
use crate::metrics::{CYCLES_TOTAL, CYCLE_DURATION_SECONDS, OFFLINE_CYCLES_TOTAL};
use crate::sampler::{EnvironmentSensor, Ranger, SensorSampler};
use crate::upload::{UploadClient, UploadOutcome};
use crate::watchdog::Watchdog;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Time between cycle starts.
    pub interval: Duration,
    /// How often the loop wakes to feed the watchdog and check the schedule.
    pub poll: Duration,
    pub resync_every: Duration,
    /// Pause between failed initial time syncs.
    pub sync_retry_wait: Duration,
}

/// Everything the loop drives, before startup.
pub struct Components<R, E, N, L, I> {
    pub sampler: SensorSampler<R, E>,
    pub link: ConnectivitySupervisor<L>,
    pub network_time: N,
    pub uploader: UploadClient,
    pub indicator: I,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// Link down; the reading was sampled and dropped.
    Offline,
    Attempted(UploadOutcome),
}

pub struct AcquisitionLoop<R, E, N, L, I> {
    sampler: SensorSampler<R, E>,
    link: ConnectivitySupervisor<L>,
    clock: TimeSource<N>,
    uploader: UploadClient,
    indicator: I,
    watchdog: Watchdog,
    settings: LoopSettings,
    cycle: u64,
}

impl<R, E, N, L, I> AcquisitionLoop<R, E, N, L, I>
where
    R: Ranger,
    E: EnvironmentSensor,
    N: NetworkTime,
    L: Link,
    I: Indicator,
{
    /// Startup sequence. A missing sensor is fatal; network association and
    /// the first time sync are retried until they succeed or the watchdog
    /// gives up on the process.
    pub async fn start(
        parts: Components<R, E, N, L, I>,
        settings: LoopSettings,
        watchdog: Watchdog,
    ) -> Result<Self> {
        let Components {
            mut sampler,
            mut link,
            network_time,
            uploader,
            mut indicator,
        } = parts;

        sampler.probe().await?;
        info!("Environmental sensor present");
        watchdog.feed();

        while link.maintain(&mut indicator).await != ConnectionState::Connected {
            watchdog.feed();
        }
        watchdog.feed();

        let clock = TimeSource::initialize(network_time, settings.resync_every, settings.sync_retry_wait).await;
        watchdog.feed();

        Ok(Self {
            sampler,
            link,
            clock,
            uploader,
            indicator,
            watchdog,
            settings,
            cycle: 0,
        })
    }

    /// Steady state. Never returns; the process ends by watchdog restart or
    /// power loss.
    pub async fn run(mut self) {
        info!(
            interval = ?self.settings.interval,
            watchdog = ?self.watchdog.deadline(),
            endpoint = %self.uploader.endpoint(),
            "Entering acquisition loop"
        );

        let mut next_cycle = Instant::now();
        loop {
            let now = Instant::now();
            if now >= next_cycle {
                next_cycle = now + self.settings.interval;
                self.run_cycle().await;
            }

            // Reached only after every step of the cycle has returned.
            self.watchdog.feed();
            tokio::time::sleep(self.settings.poll.min(next_cycle.saturating_duration_since(Instant::now()))).await;
        }
    }

    /// One cycle: connectivity, sample, upload-if-connected.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        CYCLES_TOTAL.inc();
        let started = Instant::now();

        let state = self.link.maintain(&mut self.indicator).await;
        if state == ConnectionState::Connected {
            self.clock.maybe_resync().await;
        }

        let reading = self.sampler.sample(self.clock.now()).await;

        let report = if state != ConnectionState::Connected {
            OFFLINE_CYCLES_TOTAL.inc();
            info!(cycle = self.cycle, "Offline cycle, reading dropped");
            CycleReport::Offline
        } else {
            let outcome = self.uploader.deliver(reading, &mut self.indicator).await;
            if let UploadOutcome::TransportFailure { .. } = outcome {
                self.link.mark_lost();
            }
            CycleReport::Attempted(outcome)
        };

        let elapsed = started.elapsed();
        CYCLE_DURATION_SECONDS.observe(elapsed.as_secs_f64());
        if elapsed > self.settings.interval {
            warn!(cycle = self.cycle, elapsed = ?elapsed, "Cycle overran its interval");
        }
        report
    }

    pub fn clock(&self) -> &TimeSource<N> {
        &self.clock
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }
}
