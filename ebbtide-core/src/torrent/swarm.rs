//! Trait seam between the add/serve pipeline and a swarm engine.
//!
//! The engine owns peer connections, piece download, and verification.
//! This crate only needs it to accept a resolved source and later expose
//! a file table with a lazy byte-range read per file, so those three
//! capabilities are the whole boundary. The HTTP layer stays decoupled
//! from any BitTorrent implementation detail behind these traits.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use super::resolver::TorrentSource;
use super::{InfoHash, TorrentError};

/// A file within an added torrent, positioned in torrent-wide byte space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub length: u64,
    pub offset: u64,
}

/// Accepts resolved torrent sources and hands back live torrent handles.
#[async_trait::async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Registers a torrent with the swarm and returns its handle
    /// immediately. Metadata may not be known yet; await
    /// [`SwarmTorrent::ready`] before reading the file table.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Engine no longer accepts work
    async fn add(&self, source: TorrentSource) -> Result<Arc<dyn SwarmTorrent>, TorrentError>;

    /// Tears the engine down, disconnecting peers and releasing storage.
    async fn shutdown(&self) -> Result<(), TorrentError>;
}

/// A single torrent under swarm management.
#[async_trait::async_trait]
pub trait SwarmTorrent: Send + Sync {
    fn info_hash(&self) -> InfoHash;

    /// Resolves once torrent metadata is known and the file table is
    /// populated. Completes immediately for torrents added from full
    /// metadata; magnet-only torrents wait for the swarm to fetch it.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Engine died before metadata arrived
    async fn ready(&self) -> Result<(), TorrentError>;

    /// The torrent's file table. Empty before [`ready`](Self::ready)
    /// resolves.
    fn files(&self) -> Vec<FileEntry>;

    /// Marks a file for prioritized download.
    fn select(&self, index: usize);

    /// A lazy byte-range reader over one file's contents. `None` if the
    /// index is out of range or metadata is not yet known.
    fn reader(&self, index: usize) -> Option<Arc<dyn RangeReader>>;
}

/// File-scoped lazy byte access backed by swarm pieces.
#[async_trait::async_trait]
pub trait RangeReader: Send + Sync {
    /// Total file length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `length` bytes starting at `offset` within the file.
    ///
    /// Suspends until the backing pieces have been downloaded; dropping
    /// the returned future abandons the wait. Offsets are file-relative,
    /// not torrent-relative.
    ///
    /// # Errors
    /// - `ReadError::OutOfBounds` - Requested range exceeds the file
    /// - `ReadError::Source` - The underlying piece read failed
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, ReadError>;
}

/// Errors surfaced by [`RangeReader::read_at`].
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid range: offset {offset} + length {length} exceeds file size {file_size}")]
    OutOfBounds {
        offset: u64,
        length: usize,
        file_size: u64,
    },

    #[error("piece read failed: {0}")]
    Source(String),
}
