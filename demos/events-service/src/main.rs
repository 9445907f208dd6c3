//! Events service binary.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use events_service::{
    EventStore, EventsService, NotificationEndpoint, NotificationGateway, SystemClock,
};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Serve events and users over HTTP/JSON.
#[derive(Debug, Parser)]
#[command(name = "events-service", version, about)]
struct Cli {
    /// Path of the `SQLite` database file.
    #[arg(long)]
    database_url: String,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Base URL of the notification system; notifications are off when unset.
    #[arg(long)]
    notification_url: Option<String>,

    /// Log filter, for example `info` or `events_service=debug`.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_filter);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(%message, "events service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let store = EventStore::open(&cli.database_url).map_err(|error| error.to_string())?;
    let notifier = cli
        .notification_url
        .map(|url| NotificationGateway::new(&NotificationEndpoint(url)))
        .transpose()
        .map_err(|error| error.to_string())?;
    let service = EventsService::new(store, Arc::new(SystemClock), notifier);
    let listener = TcpListener::bind(cli.bind)
        .await
        .map_err(|error| format!("failed to bind {}: {error}", cli.bind))?;
    service
        .serve(listener, shutdown_signal())
        .await
        .map_err(|error| error.to_string())?;
    info!("events service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}
