use std::{env, fs::OpenOptions, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use tasksyncd::{config::Config, dispatch::Dispatcher, server};

/// Multi-tenant synchronization server for personal task data.
#[derive(Debug, Parser)]
#[command(name = "tasksyncd", version, about)]
struct Args {
    /// Data directory root. Falls back to $TASKSYNCD_DATA.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Log per-turn merge tracing.
    #[arg(long)]
    debug: bool,

    /// Log warnings and errors only.
    #[arg(long, conflicts_with = "debug")]
    quiet: bool,
}

fn init_logging(args: &Args, config: &Config) -> Result<(), anyhow::Error> {
    let level = if args.debug || config.get_boolean("debug") {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    // The `log` setting names a log file; absent or `-` means stderr.
    let sink = config.get("log");
    if !sink.is_empty() && sink != "-" {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(sink)
            .context(format!("Could not open log file '{sink}'"))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let root = args
        .data
        .clone()
        .or_else(|| env::var_os("TASKSYNCD_DATA").map(PathBuf::from))
        .context("The '--data' option is required.")?;
    anyhow::ensure!(root.is_dir(), "The '--data' path does not exist.");

    let mut config =
        Config::load(&root.join("config")).context("Could not load the server configuration")?;
    config.set("root", root.display().to_string());

    init_logging(&args, &config)?;

    let address = config.get("server").to_string();
    anyhow::ensure!(
        address.contains(':'),
        "Malformed configuration setting 'server'"
    );

    let log_clients = config.get_boolean("ip.log");
    let dispatcher = Arc::new(Dispatcher::new(&config)?);

    let listener = TcpListener::bind(&address)
        .await
        .context(format!("Could not bind to `{address}`"))?;

    info!("Serving from {}", root.display());
    server::serve(listener, dispatcher, log_clients).await?;

    Ok(())
}
