use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use bookheat_rs::engine::types::now_ms;
use bookheat_rs::history::History;
use bookheat_rs::market_data::adapters::{build_adapter, VenueKind};
use bookheat_rs::market_data::router::Dispatcher;
use bookheat_rs::settings::AppConfig;
use bookheat_rs::telemetry;

/// Stream one symbol's order book and trades from a single venue and keep a
/// rolling heatmap history of it.
#[derive(Debug, Parser)]
#[command(name = "bookheat", version)]
struct Cli {
    #[arg(long, value_enum)]
    venue: Option<VenueKind>,
    #[arg(long)]
    symbol: Option<String>,
    /// Levels per book message (venue default when omitted)
    #[arg(long)]
    depth: Option<u32>,
    /// Seconds of history to keep on screen
    #[arg(long)]
    max_age_secs: Option<u64>,
    /// TOML file layered under BOOKHEAT_* environment variables
    #[arg(long)]
    config: Option<PathBuf>,
}

// Stand-in for the renderer: one line per tick from the shared history
fn print_summary(history: &History) {
    let now = now_ms();
    let Some(book) = history.latest_book() else {
        info!("BBO: no book yet");
        return;
    };

    match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => info!(
            "BBO: BID {:.6} @ {:.6} | ASK {:.6} @ {:.6} | Spread: {:.6}",
            bid.price,
            bid.size,
            ask.price,
            ask.size,
            ask.price - bid.price
        ),
        (Some(bid), None) => info!("BBO: BID {:.6} @ {:.6} | ASK: None", bid.price, bid.size),
        (None, Some(ask)) => info!("BBO: BID: None | ASK {:.6} @ {:.6}", ask.price, ask.size),
        (None, None) => info!("BBO: empty book"),
    }

    let (low, high) = history.price_range(now).unwrap_or_default();
    info!(
        levels = book.level_count(),
        heatmap = history.visible_heatmap(now).count(),
        book_prices = history.visible_book_prices(now).count(),
        trades = history.visible_trades(now).count(),
        mid = history.latest_mid().unwrap_or_default(),
        low,
        high,
        "Window"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(venue) = cli.venue {
        config.venue = venue;
    }
    if let Some(symbol) = cli.symbol {
        config.symbol = symbol;
    }
    if cli.depth.is_some() {
        config.depth = cli.depth;
    }
    if let Some(secs) = cli.max_age_secs {
        config.max_age_secs = secs;
    }

    telemetry::init_tracing(&config.log_filter);
    telemetry::init_metrics()?;

    let mut adapter = build_adapter(&config)?;
    let mut dispatcher = Dispatcher::new(config.history_config(adapter.update_interval()));
    let history = dispatcher.history();

    info!(venue = %config.venue, symbol = %config.symbol, depth = config.depth(), max_age_secs = config.max_age_secs, "Starting");
    adapter.connect().await?;

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut adapter_task = tokio::spawn(async move {
        let result = adapter.run(tx, shutdown_rx).await;
        adapter.close().await;
        result
    });
    let dispatcher_task = tokio::spawn(async move { dispatcher.run(rx).await });

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let adapter_result = loop {
        tokio::select! {
            _ = ticker.tick() => print_summary(&history.read()),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Ctrl-C received, shutting down");
                if shutdown_tx.send(true).is_err() {
                    warn!("Adapter already stopped");
                }
                break adapter_task.await?;
            }
            finished = &mut adapter_task => {
                warn!("Adapter stopped on its own");
                break finished?;
            }
        }
    };

    let handled = dispatcher_task.await?;
    info!(handled, "Dispatcher drained");
    adapter_result?;
    Ok(())
}
