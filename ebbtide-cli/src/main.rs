//! Ebbtide CLI - stream a torrent's file over HTTP while it downloads.
//!
//! The bundled engine simulates swarm delivery so the whole pipeline is
//! exercisable from the command line; production deployments plug a real
//! `SwarmEngine` implementation into `Client` instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ebbtide_core::blocklist;
use ebbtide_core::client::{AddOptions, Client, ClientEvent};
use ebbtide_core::config::EbbtideConfig;
use ebbtide_core::torrent::{MemorySwarmEngine, SwarmTorrent};
use ebbtide_core::tracing_setup::{CliLogLevel, init_tracing};
use ebbtide_web::run_server;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ebbtide")]
#[command(about = "Stream a file out of a torrent over HTTP while it downloads")]
struct Cli {
    /// Torrent to add: magnet uri, info hash, torrent file, http url, or
    /// filesystem path
    source: String,

    /// Port for the HTTP server
    #[arg(short, long)]
    port: Option<u16>,

    /// List the torrent's files instead of serving them
    #[arg(long)]
    list: bool,

    /// IP blocklist file (plain or .gz)
    #[arg(long)]
    blocklist: Option<PathBuf>,

    /// File index to serve; defaults to the largest file
    #[arg(short, long)]
    index: Option<usize>,

    /// Console log level
    #[arg(long, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level());

    let mut config = EbbtideConfig::from_env();
    if let Some(port) = cli.port {
        config.server.port = Some(port);
    }
    config.server.list_only = cli.list;

    let mut engine = MemorySwarmEngine::new(config.delivery.clone());
    if let Some(path) = cli.blocklist.as_deref() {
        let entries = blocklist::load(path)
            .await
            .with_context(|| format!("loading blocklist {}", path.display()))?;
        info!(entries = entries.len(), "blocklist loaded");
        engine = engine.with_blocklist(entries);
    }

    let client = Client::new(Arc::new(engine), &config).context("creating client")?;
    let mut events = client
        .events()
        .context("event channel was already taken")?;

    client.add(
        cli.source.as_str(),
        AddOptions {
            file_index: cli.index,
        },
    );

    if config.server.list_only {
        let result = list_files(&client, &mut events).await;
        client.shutdown().await;
        return result;
    }

    let mut server = tokio::spawn(run_server(config.server.clone(), client.active()));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Added { info_hash, .. }) => {
                    info!(%info_hash, "torrent registered with swarm");
                }
                Some(ClientEvent::Ready { info_hash, file_index, .. }) => {
                    info!(%info_hash, file_index, "torrent ready, serving");
                }
                Some(ClientEvent::Error { error, .. }) => {
                    client.shutdown().await;
                    anyhow::bail!("could not add torrent: {error}");
                }
                None => break,
            },
            result = &mut server => {
                match result {
                    Ok(Ok(())) => info!("http server stopped"),
                    Ok(Err(server_error)) => error!(%server_error, "http server failed"),
                    Err(join_error) => error!(%join_error, "http server task died"),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    server.abort();
    Ok(())
}

/// Waits for metadata and prints the file table, one line per file.
async fn list_files(
    client: &Client,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<ClientEvent>,
) -> anyhow::Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Added { info_hash, .. } => {
                info!(%info_hash, "torrent registered with swarm");
            }
            ClientEvent::Ready { .. } => {
                let slot = client.active().borrow().clone();
                let Some(active) = slot else { continue };
                for (index, file) in active.torrent.files().iter().enumerate() {
                    let marker = if index == active.file_index { "*" } else { " " };
                    println!("{marker} {index}: {} ({} bytes)", file.name, file.length);
                }
                return Ok(());
            }
            ClientEvent::Error { error, .. } => {
                anyhow::bail!("could not add torrent: {error}");
            }
        }
    }
    anyhow::bail!("client event channel closed before metadata arrived");
}
