//! Network-synchronized wall clock.
//!
//! Every reading is stamped from [`TimeSource::now`]; nothing else in the
//! node reads the host clock. The first sync blocks startup, later refreshes
//! are best effort and keep the previous anchor on failure.

use crate::errors::{Error, Result};
use crate::metrics::CLOCK_RESYNC_FAILURES_TOTAL;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;
const NTP_PACKET_LEN: usize = 48;

/// Authoritative source of absolute time.
pub trait NetworkTime {
    fn fetch(&mut self) -> impl Future<Output = Result<DateTime<Utc>>>;
}

/// Network time paired with the monotonic instant it was received at.
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    anchor_utc: DateTime<Utc>,
    anchor: Instant,
}

impl ClockState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            anchor_utc: now,
            anchor: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_utc + elapsed
    }

    pub fn last_sync_at(&self) -> Instant {
        self.anchor
    }
}

pub struct TimeSource<N> {
    source: N,
    state: ClockState,
    resync_every: Duration,
}

impl<N: NetworkTime> TimeSource<N> {
    /// Retries until the first sync succeeds. There is no internal deadline;
    /// a node that never syncs is restarted by the watchdog.
    pub async fn initialize(mut source: N, resync_every: Duration, retry_wait: Duration) -> Self {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match source.fetch().await {
                Ok(now) => {
                    info!(attempt, now = %now, "Clock synchronized");
                    return Self {
                        source,
                        state: ClockState::new(now),
                        resync_every,
                    };
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Initial time sync failed, retrying");
                    sleep(retry_wait).await;
                }
            }
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.state.now()
    }

    pub fn now_unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    /// Refreshes the anchor once `resync_every` has passed. Returns whether
    /// a new anchor was taken.
    pub async fn maybe_resync(&mut self) -> bool {
        if self.state.anchor.elapsed() < self.resync_every {
            return false;
        }

        match self.source.fetch().await {
            Ok(now) => {
                let drift = now.signed_duration_since(self.state.now());
                debug!(drift_ms = drift.num_milliseconds(), "Clock resynchronized");
                self.state = ClockState::new(now);
                true
            }
            Err(e) => {
                warn!(error = %e, "Clock resync failed, keeping previous offset");
                CLOCK_RESYNC_FAILURES_TOTAL.inc();
                false
            }
        }
    }
}

/// Minimal SNTP client (RFC 4330, client mode).
pub struct SntpClient {
    server: String,
    timeout: Duration,
}

impl SntpClient {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }
}

impl NetworkTime for SntpClient {
    async fn fetch(&mut self) -> Result<DateTime<Utc>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.server.as_str()).await?;

        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = 0x1B; // LI = 0, VN = 3, Mode = 3 (client)
        let mut response = [0u8; NTP_PACKET_LEN];

        let len = timeout(self.timeout, async {
            socket.send(&request).await?;
            socket.recv(&mut response).await
        })
        .await
        .map_err(|_| Error::TimeSync(format!("no reply from {} within {:?}", self.server, self.timeout)))??;

        parse_sntp_reply(&response[..len])
    }
}

/// Extracts the server's transmit timestamp from an SNTP reply.
pub fn parse_sntp_reply(packet: &[u8]) -> Result<DateTime<Utc>> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(Error::TimeSync(format!("short reply: {} bytes", packet.len())));
    }

    let mode = packet[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(Error::TimeSync(format!("unexpected mode {}", mode)));
    }
    if packet[1] == 0 {
        return Err(Error::TimeSync("kiss-of-death reply".to_string()));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if seconds == 0 {
        return Err(Error::TimeSync("server sent an empty transmit timestamp".to_string()));
    }

    // Era 1 starts in 2036; a cleared top bit means the counter wrapped.
    let mut ntp_seconds = seconds as i64;
    if seconds & 0x8000_0000 == 0 {
        ntp_seconds += 1 << 32;
    }

    let nanos = ((fraction as u64 * 1_000_000_000) >> 32) as u32;
    DateTime::from_timestamp(ntp_seconds - NTP_UNIX_OFFSET, nanos)
        .ok_or_else(|| Error::TimeSync(format!("timestamp {} out of range", ntp_seconds)))
}
