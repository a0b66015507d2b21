use clap::Parser;
use lwqms_gateway::{
    NodeId,
    config::{Config, read_config_file},
    storage::{self, Access},
    util::format_pretty_timestamp,
};
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Print the stored readings and messages of one node, newest first
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Node to show
    node: NodeId,

    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    /// Show at most this many readings
    #[arg(short, long)]
    limit: Option<usize>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("lwqms_gateway", LevelFilter::WARN),
        ("lwqms_history", LevelFilter::WARN),
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
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    let store = storage::open(&config.storage, Access::ReadOnly).await?;

    let readings = store.history_for_node(args.node).await?;
    let limit = args.limit.unwrap_or(readings.len());

    println!("Node {} readings ({} stored)", args.node, readings.len());
    println!(
        "{:<26} {:>16} {:>16} {:>10}",
        "Time", "Turbidity (NTU)", "Temperature (C)", "pH"
    );
    for row in readings.iter().rev().take(limit) {
        println!(
            "{:<26} {:>16} {:>16} {:>10}",
            format_pretty_timestamp(&row.timestamp),
            row.turbidity,
            row.temperature,
            row.ph
        );
    }

    let messages = store.messages_for_node(args.node).await?;
    if !messages.is_empty() {
        println!();
        println!("Node {} messages", args.node);
        for message in messages.iter().rev() {
            println!(
                "{:<26} {}",
                format_pretty_timestamp(&message.timestamp),
                message.message
            );
        }
    }

    store.close().await?;
    Ok(())
}
