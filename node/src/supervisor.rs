use crate::errors::Result;
use crate::watchdog::{HALT_EXIT_CODE, WATCHDOG_EXIT_CODE};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub backoff: Duration,
    /// `None` restarts forever.
    pub max_restarts: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Child reported a fault restarting cannot fix.
    Halted,
    RestartLimit { restarts: u64 },
}

pub async fn supervise(program: PathBuf, args: Vec<OsString>, policy: RestartPolicy) -> Result<SupervisorExit> {
    let mut restarts = 0u64;

    loop {
        info!(program = %program.display(), restarts, "Starting acquisition process");
        let status = Command::new(&program).args(&args).status().await?;

        match status.code() {
            Some(HALT_EXIT_CODE) => {
                error!("Acquisition process halted on a fatal fault, not restarting");
                return Ok(SupervisorExit::Halted);
            }
            Some(WATCHDOG_EXIT_CODE) => warn!("Watchdog restart"),
            code => warn!(?code, "Acquisition process exited"),
        }

        if policy.max_restarts.is_some_and(|max| restarts >= max) {
            error!(restarts, "Restart limit reached");
            return Ok(SupervisorExit::RestartLimit { restarts });
        }

        restarts += 1;
        tokio::time::sleep(policy.backoff).await;
    }
}
