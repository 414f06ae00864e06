//! The add pipeline: resolve an identifier, hand it to the swarm engine,
//! and publish lifecycle events.
//!
//! `add` returns a token synchronously; resolution, the engine add, and
//! readiness handling all run on a spawned task, so no event for an add
//! is ever delivered before that call returns. Failures surface on the
//! event channel rather than as return values, matching the
//! subscribe-for-errors contract the HTTP layer relies on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::EbbtideConfig;
use crate::torrent::resolver::{Resolver, TorrentIdentifier};
use crate::torrent::selection::select_default_file;
use crate::torrent::swarm::{SwarmEngine, SwarmTorrent};
use crate::torrent::{InfoHash, TorrentError};

/// Identifies one `add` call across its lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddToken(u64);

impl std::fmt::Display for AddToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "add-{}", self.0)
    }
}

/// Per-add options, merged with defaults by [`Client::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Explicit file to expose; overrides the default largest-file
    /// selection.
    pub file_index: Option<usize>,
}

/// Lifecycle notifications for added torrents.
#[derive(Debug)]
pub enum ClientEvent {
    /// The identifier resolved and the torrent was registered with the
    /// swarm engine.
    Added { token: AddToken, info_hash: InfoHash },
    /// Metadata arrived, a file was selected, and the torrent now backs
    /// unqualified HTTP requests.
    Ready {
        token: AddToken,
        info_hash: InfoHash,
        file_index: usize,
    },
    /// Resolution or the engine add failed; terminal for this token.
    Error { token: AddToken, error: TorrentError },
}

/// The torrent currently backing HTTP requests.
///
/// One process-wide slot, overwritten whenever another torrent becomes
/// ready. Requests in flight when the overwrite happens are served
/// against whichever torrent the slot held when they resolved it; serving
/// several torrents concurrently needs request-scoped identity instead of
/// this slot and is out of scope here.
#[derive(Clone)]
pub struct ActiveTorrent {
    pub torrent: Arc<dyn SwarmTorrent>,
    pub file_index: usize,
}

/// Drives identifier resolution and torrent lifecycle against a swarm
/// engine.
pub struct Client {
    engine: Arc<dyn SwarmEngine>,
    resolver: Resolver,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    active_tx: watch::Sender<Option<ActiveTorrent>>,
    next_token: AtomicU64,
}

impl Client {
    /// # Errors
    /// - `TorrentError::FetchFailed` - Resolver HTTP client construction failed
    pub fn new(engine: Arc<dyn SwarmEngine>, config: &EbbtideConfig) -> Result<Self, TorrentError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (active_tx, _) = watch::channel(None);
        Ok(Self {
            engine,
            resolver: Resolver::new(&config.network)?,
            events_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
            active_tx,
            next_token: AtomicU64::new(0),
        })
    }

    /// Takes the event receiver. Yields `None` after the first call;
    /// lifecycle events have a single consumer.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.lock().take()
    }

    /// A watch over the active-torrent slot. `None` until a torrent
    /// becomes ready; HTTP handlers wait on this before serving.
    pub fn active(&self) -> watch::Receiver<Option<ActiveTorrent>> {
        self.active_tx.subscribe()
    }

    /// Adds a torrent by any accepted identifier form.
    ///
    /// Returns immediately; progress and failures arrive on the event
    /// channel, tagged with the returned token.
    pub fn add(&self, id: impl Into<TorrentIdentifier>, options: AddOptions) -> AddToken {
        let token = AddToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let id = id.into();

        let engine = self.engine.clone();
        let resolver = self.resolver.clone();
        let events = self.events_tx.clone();
        let active = self.active_tx.clone();

        tokio::spawn(async move {
            if let Err(error) =
                run_add(engine, resolver, &events, active, token, id, options).await
            {
                warn!(%token, %error, "add failed");
                let _ = events.send(ClientEvent::Error { token, error });
            }
        });

        token
    }

    /// Tears down the swarm engine and clears the active slot.
    pub async fn shutdown(&self) {
        if let Err(error) = self.engine.shutdown().await {
            warn!(%error, "engine shutdown reported an error");
        }
        self.active_tx.send_replace(None);
    }
}

async fn run_add(
    engine: Arc<dyn SwarmEngine>,
    resolver: Resolver,
    events: &mpsc::UnboundedSender<ClientEvent>,
    active: watch::Sender<Option<ActiveTorrent>>,
    token: AddToken,
    id: TorrentIdentifier,
    options: AddOptions,
) -> Result<(), TorrentError> {
    let source = resolver.resolve(id).await?;
    let info_hash = source.info_hash();

    let torrent = engine.add(source).await?;
    let _ = events.send(ClientEvent::Added { token, info_hash });

    torrent.ready().await?;
    let files = torrent.files();

    let file_index = match options.file_index {
        Some(index) if index < files.len() => index,
        Some(index) => {
            return Err(TorrentError::FileIndexOutOfRange {
                index,
                file_count: files.len(),
            });
        }
        None => select_default_file(&files).ok_or_else(|| TorrentError::InvalidMetadata {
            reason: "torrent has no files".to_string(),
        })?,
    };

    torrent.select(file_index);
    info!(%info_hash, file_index, file = %files[file_index].name, "torrent ready");

    active.send_replace(Some(ActiveTorrent {
        torrent,
        file_index,
    }));
    let _ = events.send(ClientEvent::Ready {
        token,
        info_hash,
        file_index,
    });
    Ok(())
}
