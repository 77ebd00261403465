use parking_monitor::{
    config::MonitorConfig,
    dashboard,
    poller::{Monitor, PeriodicTask},
    source::AntaresSource,
    store::FileBaselineStore,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = MonitorConfig::from_env()?;
    let source = AntaresSource::new(&cfg)?;
    tracing::info!(
        "polling {} every {} ms; baseline at {}",
        source.url(),
        cfg.poll_interval_ms,
        cfg.baseline_path.display()
    );

    let store = FileBaselineStore::new(&cfg.baseline_path);
    let (view_tx, view_rx) = dashboard::channel();
    let monitor = Monitor::new(source, store, view_tx);
    let poller = PeriodicTask::spawn(Duration::from_millis(cfg.poll_interval_ms), monitor);

    let served = dashboard::serve(&cfg.bind_addr, view_rx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await;

    poller.shutdown().await;
    served
}
