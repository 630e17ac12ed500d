use crate::errors::{Error, Result};
use crate::indicator::{BlinkPattern, Indicator};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Something that can be associated with the network.
pub trait Link {
    /// One association attempt. Implementations bound their own duration.
    fn associate(&mut self) -> impl Future<Output = Result<()>>;

    fn is_associated(&self) -> bool;

    /// Forget the current association, e.g. after a transport failure.
    fn drop_association(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub wait: Duration,
}

pub struct ConnectivitySupervisor<L> {
    link: L,
    state: ConnectionState,
    policy: RetryPolicy,
}

impl<L: Link> ConnectivitySupervisor<L> {
    pub fn new(link: L, policy: RetryPolicy) -> Self {
        Self {
            link,
            state: ConnectionState::Disconnected,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Keeps the link up. Returns the state the rest of the cycle should act on.
    pub async fn maintain(&mut self, indicator: &mut impl Indicator) -> ConnectionState {
        if self.state == ConnectionState::Connected {
            if self.link.is_associated() {
                return ConnectionState::Connected;
            }
            warn!("Network association lost");
        }

        self.state = ConnectionState::Connecting;
        for attempt in 1..=self.policy.max_attempts {
            match self.link.associate().await {
                Ok(()) => {
                    info!(attempt, "Network associated");
                    self.state = ConnectionState::Connected;
                    return self.state;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Association attempt failed");
                }
            }
            if attempt < self.policy.max_attempts {
                sleep(self.policy.wait).await;
            }
        }

        warn!(
            attempts = self.policy.max_attempts,
            "Could not associate, giving up for this cycle"
        );
        self.state = ConnectionState::Disconnected;
        indicator.signal(BlinkPattern::Offline);
        self.state
    }

    pub fn mark_lost(&mut self) {
        self.link.drop_association();
        self.state = ConnectionState::Disconnected;
    }
}

/// Link for hosted nodes: associated once a TCP connection to the upload
/// host succeeds.
pub struct HostLink {
    host: String,
    port: u16,
    timeout: Duration,
    associated: bool,
}

impl HostLink {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            associated: false,
        }
    }

    pub fn for_endpoint(endpoint: &reqwest::Url, timeout: Duration) -> Result<Self> {
        let host = endpoint
            .host_str()
            .ok_or_else(|| Error::Config(format!("endpoint {} has no host", endpoint)))?;
        let port = endpoint
            .port_or_known_default()
            .ok_or_else(|| Error::Config(format!("endpoint {} has no port", endpoint)))?;
        Ok(Self::new(host, port, timeout))
    }
}

impl Link for HostLink {
    async fn associate(&mut self) -> Result<()> {
        let target = (self.host.as_str(), self.port);
        match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                self.associated = true;
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Link(format!("{}:{}: {}", self.host, self.port, e))),
            Err(_) => Err(Error::Link(format!(
                "{}:{}: no answer within {:?}",
                self.host, self.port, self.timeout
            ))),
        }
    }

    fn is_associated(&self) -> bool {
        self.associated
    }

    fn drop_association(&mut self) {
        self.associated = false;
    }
}
