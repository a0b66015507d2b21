use std::time::Duration;

use clap::Parser;
use lwqms_gateway::{
    actors::{alert::AlertHandle, messages::CycleOutcome},
    alerts::AlertManager,
    config::{Config, read_config_file},
    monitors::AlertEngine,
    notifier,
    storage::{self, Access},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Watch the event logs and send alerts
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    /// Evaluate once, print the status and exit
    #[arg(long)]
    once: bool,

    /// More output, repeat for trace level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    dotenv::dotenv().ok();

    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("lwqms_gateway", level),
        ("lwqms_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    let store = storage::open(&config.storage, Access::ReadOnly).await?;
    let alert_manager = AlertManager::new(
        notifier::from_config(&config.notifier)?,
        Duration::from_secs(config.notify_timeout_secs),
    );
    let engine = AlertEngine::new(config.thresholds, config.liveness_timeout_minutes)?;

    info!(
        "watching nodes {:?} every {}s",
        config.nodes, config.poll_interval_secs
    );

    let alerts = AlertHandle::spawn(
        engine,
        store.clone(),
        alert_manager,
        config.nodes.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );

    if let CycleOutcome::StoreUnavailable(reason) = alerts.evaluate_now().await? {
        warn!("event store unavailable: {reason}");
    }

    if args.once {
        println!("{}", alerts.status().await?);
        alerts.shutdown().await?;
        return Ok(());
    }

    info!("{}", alerts.status().await?);

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, shutting down");

    info!("{}", alerts.status().await?);
    alerts.shutdown().await?;
    store.close().await?;

    Ok(())
}
