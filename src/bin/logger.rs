use anyhow::anyhow;
use clap::Parser;
use lwqms_gateway::{
    actors::{ingest::IngestHandle, simulator::SimulatorHandle},
    config::{Config, read_config_file},
    storage::{self, Access},
    transport::{open_serial, spawn_line_reader},
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Receive sensor packets and append them to the event logs
#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    /// Read packets from stdin instead of the serial port (replay a capture)
    #[arg(long)]
    stdin: bool,

    /// Do not run the simulated node
    #[arg(long)]
    no_simulator: bool,

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
        ("lwqms_logger", level),
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

    let store = storage::open(&config.storage, Access::ReadWrite).await?;

    let lines = if args.stdin {
        info!("reading packets from stdin");
        spawn_line_reader(std::io::stdin())
    } else {
        spawn_line_reader(open_serial(&config.serial)?)
    };

    let simulator = match (&config.simulator, args.no_simulator) {
        (Some(simulator), false) => Some(SimulatorHandle::spawn(store.clone(), simulator)),
        _ => None,
    };

    let (ingest, mut ingest_task) = IngestHandle::spawn(store.clone(), lines);

    let result = tokio::select! {
        finished = &mut ingest_task => match finished {
            Ok(Ok(())) if args.stdin => Ok(()),
            Ok(Ok(())) => Err(anyhow!("serial port closed")),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
            if let Ok(stats) = ingest.stats().await {
                info!("ingest stats: {stats:?}");
            }
            if let Err(e) = ingest.shutdown().await {
                warn!("{e:#}");
            }
            Ok(())
        }
    };

    if let Some(simulator) = simulator {
        if let Err(e) = simulator.shutdown().await {
            warn!("{e:#}");
        }
    }

    if let Err(e) = store.close().await {
        error!("failed to close event store: {e}");
    }

    result
}
