use tracing_subscriber::EnvFilter;

// Counter names, all labelled by `venue`
pub const FRAMES: &str = "bookheat_frames_total";
pub const FRAMES_IGNORED: &str = "bookheat_frames_ignored_total";
pub const PROTOCOL_ERRORS: &str = "bookheat_protocol_errors_total";
pub const BOOK_UPDATES: &str = "bookheat_book_updates_total";
pub const TRADES: &str = "bookheat_trades_total";
pub const RESYNCS: &str = "bookheat_resyncs_total";
pub const RECONNECTS: &str = "bookheat_reconnects_total";

/// `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics() -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 9000))
        .install()?;

    tracing::info!("Prometheus exporter listening on http://0.0.0.0:9000/metrics");
    metrics::gauge!("bookheat_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics() -> anyhow::Result<()> {
    Ok(())
}
