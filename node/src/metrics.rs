use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_cycles_total",
        "Total acquisition cycles started"
    ))
    .unwrap();
    pub static ref OFFLINE_CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_offline_cycles_total",
        "Cycles whose reading was dropped because the link was down"
    ))
    .unwrap();
    pub static ref UPLOADS_SUCCEEDED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_uploads_succeeded_total",
        "Readings accepted by the remote endpoint"
    ))
    .unwrap();
    pub static ref UPLOADS_REJECTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_uploads_rejected_total",
        "Readings answered with a non-success status"
    ))
    .unwrap();
    pub static ref UPLOAD_TRANSPORT_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_upload_transport_failures_total",
        "Uploads that got no response at all"
    ))
    .unwrap();
    pub static ref SENSOR_FAULTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_sensor_faults_total",
        "Absent or implausible sensor fields"
    ))
    .unwrap();
    pub static ref CLOCK_RESYNC_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "node_clock_resync_failures_total",
        "Network time refreshes that failed and kept the previous offset"
    ))
    .unwrap();
    pub static ref CYCLE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "node_cycle_duration_seconds",
            "Wall-clock time spent in one acquisition cycle"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0])
    )
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OFFLINE_CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPLOADS_SUCCEEDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPLOADS_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPLOAD_TRANSPORT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SENSOR_FAULTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLOCK_RESYNC_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CYCLE_DURATION_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics encoding failed: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Serves `/metrics` until the listener fails.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics endpoint listening on {}", addr);
    axum::serve(listener, app).await
}

async fn metrics_handler() -> String {
    gather_metrics()
}
