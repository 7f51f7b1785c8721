use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use pricewatch::config::AppConfig;
use pricewatch::cycle::CycleRunner;
use pricewatch::extractor::PriceExtractor;
use pricewatch::fetcher::PriceFetcher;
use pricewatch::models::NewTrackedItem;
use pricewatch::notifier::{EmailNotifier, LogNotifier, Notifier};
use pricewatch::scheduler::CycleScheduler;
use pricewatch::store::HistoryStore;

#[derive(Parser)]
#[command(name = "pricewatch", about = "Track product prices and alert when they hit your target")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single scrape cycle over all tracked items
    Run,
    /// Keep running scrape cycles on the configured cron cadence
    Watch,
    /// Start tracking a new item
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        target_price: Decimal,
    },
    /// List tracked items with their latest observed price
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pricewatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let store = HistoryStore::connect(&config.database).await?;

    match cli.command {
        Command::Add {
            name,
            url,
            target_price,
        } => {
            let item = store
                .insert_item(NewTrackedItem {
                    name,
                    url,
                    target_price,
                })
                .await?;
            println!(
                "Tracking '{}' ({}) with target price {}",
                item.name, item.url, item.target_price
            );
        }
        Command::List => {
            let items = store.list_items().await?;
            if items.is_empty() {
                println!("No items are being tracked.");
            }
            for item in items {
                match store.latest(&item.id).await? {
                    Some(obs) => println!(
                        "{}  {}  target {}  last {} at {}",
                        item.id, item.name, item.target_price, obs.price, obs.observed_at
                    ),
                    None => println!(
                        "{}  {}  target {}  (no observations yet)",
                        item.id, item.name, item.target_price
                    ),
                }
            }
        }
        Command::Run => {
            let (runner, shutdown_tx) = build_runner(&config, store)?;
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
            });

            let report = runner.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Watch => {
            let (runner, shutdown_tx) = build_runner(&config, store)?;
            let mut scheduler =
                CycleScheduler::new(Arc::new(runner), config.scheduler.clone()).await?;
            scheduler.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            let _ = shutdown_tx.send(true);
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}

fn build_runner(
    config: &AppConfig,
    store: HistoryStore,
) -> Result<(CycleRunner, watch::Sender<bool>)> {
    let extractor = PriceExtractor::new(&config.scraper.selectors)?;
    let fetcher = Arc::new(PriceFetcher::new(&config.scraper, extractor)?);

    // Without SMTP credentials alerts are logged rather than mailed.
    let notifier: Arc<dyn Notifier> = match EmailNotifier::new(&config.notifications.smtp) {
        Ok(email) => Arc::new(email),
        Err(e) => {
            warn!("email delivery disabled: {}", e);
            Arc::new(LogNotifier)
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = CycleRunner::new(store, fetcher, notifier, config, shutdown_rx);
    Ok((runner, shutdown_tx))
}
