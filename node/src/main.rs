use anyhow::{Context, Result};
use clap::Parser;
use node::acquisition::{AcquisitionLoop, Components};
use node::clock::SntpClient;
use node::config::{Cli, Command, NodeConfig, SuperviseConfig};
use node::connectivity::{ConnectivitySupervisor, HostLink};
use node::indicator::LogIndicator;
use node::metrics;
use node::sampler::SensorSampler;
use node::sim::{SimulatedEnvironment, SimulatedRanger};
use node::supervisor::{self, RestartPolicy, SupervisorExit};
use node::upload::UploadClient;
use node::watchdog::{Watchdog, HALT_EXIT_CODE};
use std::ffi::OsString;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(config) => run(config).await,
        Command::Supervise(config) => supervise(config).await,
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    config.validate().context("Invalid node configuration")?;
    let endpoint = config.endpoint_url()?;

    let session = uuid::Uuid::new_v4();
    info!(%session, endpoint = %endpoint, "Starting telemetry node");

    metrics::init_metrics().context("Failed to register metrics")?;
    if let Some(addr) = config.metrics_addr {
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(addr).await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    // Armed before anything that can block, including the first time sync.
    let watchdog = Watchdog::arm_restarting(config.watchdog_deadline()).context("Failed to arm watchdog")?;

    let sampler = SensorSampler::new(
        SimulatedRanger::new(config.sim_distance_cm, config.sim_dropout_rate, config.sim_spurious_rate),
        SimulatedEnvironment::new(config.sim_env_fault_rate),
        config.sampler_settings(),
    );
    let link = ConnectivitySupervisor::new(
        HostLink::for_endpoint(&endpoint, config.connect_timeout())?,
        config.retry_policy(),
    );
    let components = Components {
        sampler,
        link,
        network_time: SntpClient::new(config.ntp_server.clone(), config.ntp_timeout()),
        uploader: UploadClient::new(endpoint, config.upload_timeout()).context("Failed to build HTTP client")?,
        indicator: LogIndicator,
    };

    let acquisition = match AcquisitionLoop::start(components, config.loop_settings(), watchdog).await {
        Ok(acquisition) => acquisition,
        Err(e) => {
            error!(error = %e, "Startup failed, halting");
            std::process::exit(HALT_EXIT_CODE);
        }
    };

    acquisition.run().await;
    Ok(())
}

async fn supervise(config: SuperviseConfig) -> Result<()> {
    let program = std::env::current_exe().context("Cannot locate node executable")?;
    let mut args: Vec<OsString> = vec!["run".into()];
    args.extend(config.run_args.into_iter().map(OsString::from));

    let policy = RestartPolicy {
        backoff: Duration::from_millis(config.restart_backoff_ms),
        max_restarts: None,
    };

    tokio::select! {
        exit = supervisor::supervise(program, args, policy) => {
            match exit? {
                SupervisorExit::Halted => std::process::exit(HALT_EXIT_CODE),
                SupervisorExit::RestartLimit { restarts } => {
                    anyhow::bail!("gave up after {} restarts", restarts)
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    }
}
