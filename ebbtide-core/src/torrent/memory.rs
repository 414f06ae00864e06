//! In-memory swarm engine for development and tests.
//!
//! Simulates piece-granular delivery over locally held content: pieces
//! become available over time (or under explicit test control), and lazy
//! range reads suspend until the pieces covering them arrive. Production
//! deployments plug a real peer-wire engine into [`Client`] through the
//! same traits and never touch this module.
//!
//! [`Client`]: crate::client::Client

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::resolver::TorrentSource;
use super::swarm::{FileEntry, RangeReader, ReadError, SwarmEngine, SwarmTorrent};
use super::{InfoHash, TorrentError};
use crate::blocklist::BlocklistEntry;
use crate::config::DeliveryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyState {
    Pending,
    Ready,
    Shutdown,
}

struct TorrentState {
    files: Vec<FileEntry>,
    content: Bytes,
    completed: HashSet<u64>,
    selected: Option<usize>,
}

/// Swarm engine backed by in-process state instead of a peer swarm.
pub struct MemorySwarmEngine {
    config: DeliveryConfig,
    auto_deliver: bool,
    blocklist: Vec<BlocklistEntry>,
    torrents: Mutex<Vec<Arc<MemoryTorrent>>>,
    down: AtomicBool,
}

impl MemorySwarmEngine {
    /// Engine that delivers pieces on its own at the configured rate,
    /// fabricating deterministic content for each added torrent.
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            auto_deliver: true,
            blocklist: Vec::new(),
            torrents: Mutex::new(Vec::new()),
            down: AtomicBool::new(false),
        }
    }

    /// Engine whose torrents make no progress until the caller drives
    /// them through [`MemoryTorrent`]'s control methods. Used by tests.
    pub fn manual(config: DeliveryConfig) -> Self {
        Self {
            auto_deliver: false,
            ..Self::new(config)
        }
    }

    /// Attaches an IP exclusion list. The simulated swarm has no peers to
    /// filter, so the list is only held and reported.
    pub fn with_blocklist(mut self, blocklist: Vec<BlocklistEntry>) -> Self {
        self.blocklist = blocklist;
        self
    }

    pub fn blocked_ranges(&self) -> &[BlocklistEntry] {
        &self.blocklist
    }

    /// Handles of every torrent added so far, in add order.
    pub fn torrents(&self) -> Vec<Arc<MemoryTorrent>> {
        self.torrents.lock().clone()
    }

    fn spawn_delivery(&self, torrent: Arc<MemoryTorrent>, magnet_name: Option<String>) {
        let config = self.config.clone();
        tokio::spawn(async move {
            if !torrent.is_ready() {
                // Simulated metadata fetch for magnet-only adds.
                tokio::time::sleep(config.metadata_delay).await;
                let name =
                    magnet_name.unwrap_or_else(|| format!("{}.bin", torrent.info_hash()));
                torrent.supply_metadata(vec![(
                    name,
                    synthetic_content(config.magnet_file_length),
                )]);
            }

            let piece_count = torrent.piece_count();
            let pause = std::time::Duration::from_secs_f64(
                config.piece_size as f64 / config.delivery_rate.max(1) as f64,
            );
            for piece in 0..piece_count {
                torrent.complete_piece(piece);
                tokio::time::sleep(pause).await;
            }
            info!(info_hash = %torrent.info_hash(), pieces = piece_count, "delivery complete");
        });
    }
}

#[async_trait::async_trait]
impl SwarmEngine for MemorySwarmEngine {
    async fn add(&self, source: TorrentSource) -> Result<Arc<dyn SwarmTorrent>, TorrentError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TorrentError::EngineShutdown);
        }

        let (torrent, magnet_name) = match source {
            TorrentSource::Metadata(metadata) => {
                let files = metadata.file_entries();
                let content = synthetic_content(metadata.total_length);
                let torrent = Arc::new(MemoryTorrent::new_ready(
                    metadata.info_hash,
                    self.config.piece_size,
                    files,
                    content,
                ));
                (torrent, None)
            }
            TorrentSource::Magnet(link) => {
                let torrent = Arc::new(MemoryTorrent::pending(
                    link.info_hash,
                    self.config.piece_size,
                ));
                (torrent, link.display_name)
            }
        };

        self.torrents.lock().push(torrent.clone());
        debug!(info_hash = %torrent.info_hash(), "torrent registered");

        if self.auto_deliver {
            self.spawn_delivery(torrent.clone(), magnet_name);
        }

        Ok(torrent)
    }

    async fn shutdown(&self) -> Result<(), TorrentError> {
        self.down.store(true, Ordering::SeqCst);
        for torrent in self.torrents.lock().iter() {
            torrent.mark_shutdown();
        }
        Ok(())
    }
}

/// A torrent held entirely in memory, with piece-granular availability.
pub struct MemoryTorrent {
    info_hash: InfoHash,
    piece_size: u64,
    state: Arc<Mutex<TorrentState>>,
    ready_tx: watch::Sender<ReadyState>,
    // Bumped on every completed piece so suspended reads re-check.
    progress_tx: watch::Sender<u64>,
}

impl MemoryTorrent {
    fn new_ready(info_hash: InfoHash, piece_size: u64, files: Vec<FileEntry>, content: Bytes) -> Self {
        let (ready_tx, _) = watch::channel(ReadyState::Ready);
        let (progress_tx, _) = watch::channel(0);
        Self {
            info_hash,
            piece_size,
            state: Arc::new(Mutex::new(TorrentState {
                files,
                content,
                completed: HashSet::new(),
                selected: None,
            })),
            ready_tx,
            progress_tx,
        }
    }

    fn pending(info_hash: InfoHash, piece_size: u64) -> Self {
        let torrent = Self::new_ready(info_hash, piece_size, Vec::new(), Bytes::new());
        torrent.ready_tx.send_replace(ReadyState::Pending);
        torrent
    }

    /// Single-file torrent over caller-provided bytes, metadata already
    /// known, no pieces downloaded yet. Test convenience.
    pub fn with_content(name: &str, content: Bytes, piece_size: u64) -> Self {
        Self::with_files(vec![(name.to_string(), content)], piece_size)
    }

    /// Multi-file torrent over caller-provided bytes, metadata already
    /// known, no pieces downloaded yet.
    pub fn with_files(files: Vec<(String, Bytes)>, piece_size: u64) -> Self {
        let torrent = Self::new_ready(InfoHash::new([0u8; 20]), piece_size, Vec::new(), Bytes::new());
        torrent.supply_metadata(files);
        torrent
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow() == ReadyState::Ready
    }

    /// The index passed to the most recent [`SwarmTorrent::select`] call.
    pub fn selected(&self) -> Option<usize> {
        self.state.lock().selected
    }

    pub fn piece_count(&self) -> u64 {
        let content_length = self.state.lock().content.len() as u64;
        content_length.div_ceil(self.piece_size)
    }

    /// Populates files and content for a pending torrent and flips it to
    /// ready. Offsets are assigned cumulatively in the given order.
    pub fn supply_metadata(&self, files: Vec<(String, Bytes)>) {
        let mut state = self.state.lock();
        let mut offset = 0u64;
        let mut entries = Vec::with_capacity(files.len());
        let mut content = Vec::new();
        for (name, bytes) in files {
            entries.push(FileEntry {
                name,
                length: bytes.len() as u64,
                offset,
            });
            offset += bytes.len() as u64;
            content.extend_from_slice(&bytes);
        }
        state.files = entries;
        state.content = Bytes::from(content);
        drop(state);
        self.ready_tx.send_replace(ReadyState::Ready);
    }

    /// Marks one piece as downloaded and wakes suspended reads.
    pub fn complete_piece(&self, piece: u64) {
        self.state.lock().completed.insert(piece);
        self.progress_tx.send_modify(|version| *version += 1);
    }

    /// Marks the pieces covering the torrent-wide byte range
    /// `[start, end]` as downloaded.
    pub fn complete_byte_range(&self, start: u64, end: u64) {
        let first = start / self.piece_size;
        let last = end / self.piece_size;
        {
            let mut state = self.state.lock();
            for piece in first..=last {
                state.completed.insert(piece);
            }
        }
        self.progress_tx.send_modify(|version| *version += 1);
    }

    /// Marks every piece as downloaded.
    pub fn complete_all(&self) {
        let pieces = self.piece_count();
        {
            let mut state = self.state.lock();
            for piece in 0..pieces {
                state.completed.insert(piece);
            }
        }
        self.progress_tx.send_modify(|version| *version += 1);
    }

    fn mark_shutdown(&self) {
        if !self.is_ready() {
            self.ready_tx.send_replace(ReadyState::Shutdown);
        }
    }
}

#[async_trait::async_trait]
impl SwarmTorrent for MemoryTorrent {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    async fn ready(&self) -> Result<(), TorrentError> {
        let mut rx = self.ready_tx.subscribe();
        let state = rx
            .wait_for(|state| *state != ReadyState::Pending)
            .await
            .map_err(|_| TorrentError::EngineShutdown)?;
        match *state {
            ReadyState::Ready => Ok(()),
            _ => Err(TorrentError::EngineShutdown),
        }
    }

    fn files(&self) -> Vec<FileEntry> {
        self.state.lock().files.clone()
    }

    fn select(&self, index: usize) {
        debug!(info_hash = %self.info_hash, index, "file selected for priority download");
        self.state.lock().selected = Some(index);
    }

    fn reader(&self, index: usize) -> Option<Arc<dyn RangeReader>> {
        let file = self.state.lock().files.get(index)?.clone();
        Some(Arc::new(MemoryRangeReader {
            state: self.state.clone(),
            progress_rx: self.progress_tx.subscribe(),
            piece_size: self.piece_size,
            file,
        }))
    }
}

/// Lazy reader over one file of a [`MemoryTorrent`].
struct MemoryRangeReader {
    state: Arc<Mutex<TorrentState>>,
    progress_rx: watch::Receiver<u64>,
    piece_size: u64,
    file: FileEntry,
}

#[async_trait::async_trait]
impl RangeReader for MemoryRangeReader {
    fn len(&self) -> u64 {
        self.file.length
    }

    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, ReadError> {
        if offset + length as u64 > self.file.length {
            return Err(ReadError::OutOfBounds {
                offset,
                length,
                file_size: self.file.length,
            });
        }
        if length == 0 {
            return Ok(Bytes::new());
        }

        let absolute = self.file.offset + offset;
        let first = absolute / self.piece_size;
        let last = (absolute + length as u64 - 1) / self.piece_size;

        let mut progress = self.progress_rx.clone();
        loop {
            {
                let state = self.state.lock();
                if (first..=last).all(|piece| state.completed.contains(&piece)) {
                    let start = absolute as usize;
                    return Ok(state.content.slice(start..start + length));
                }
            }
            progress
                .changed()
                .await
                .map_err(|_| ReadError::Source("torrent dropped mid-read".to_string()))?;
        }
    }
}

/// Deterministic filler content for simulated torrents.
fn synthetic_content(length: u64) -> Bytes {
    let mut data = Vec::with_capacity(length as usize);
    for i in 0..length {
        data.push((i % 251) as u8);
    }
    Bytes::from(data)
}
