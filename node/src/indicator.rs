use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    /// Reading accepted by the remote endpoint.
    Success,
    /// Upload rejected or never answered.
    UploadFailed,
    /// Network association gave up for this cycle.
    Offline,
}

impl BlinkPattern {
    /// `(on_ms, off_ms)` pairs making up the pattern.
    pub fn steps(self) -> &'static [(u64, u64)] {
        match self {
            BlinkPattern::Success => &[(500, 0)],
            BlinkPattern::UploadFailed => &[(100, 100), (100, 100), (100, 100)],
            BlinkPattern::Offline => &[(400, 300), (400, 300)],
        }
    }

    pub fn duration_ms(self) -> u64 {
        self.steps().iter().map(|(on, off)| on + off).sum()
    }
}

pub trait Indicator {
    fn signal(&mut self, pattern: BlinkPattern);
}

/// Indicator for hosts without an LED: the pattern is logged instead of
/// blinked, so the loop is not delayed.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn signal(&mut self, pattern: BlinkPattern) {
        match pattern {
            BlinkPattern::Success => debug!(?pattern, "Status indicator"),
            _ => info!(
                ?pattern,
                blinks = pattern.steps().len(),
                duration_ms = pattern.duration_ms(),
                "Status indicator"
            ),
        }
    }
}

/// Indicator that keeps every pattern it was asked to show.
#[derive(Debug, Default)]
pub struct MemoryIndicator {
    pub signals: Vec<BlinkPattern>,
}

impl Indicator for MemoryIndicator {
    fn signal(&mut self, pattern: BlinkPattern) {
        self.signals.push(pattern);
    }
}
