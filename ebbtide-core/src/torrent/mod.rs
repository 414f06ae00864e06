//! Torrent identity, resolution, and the swarm-engine seam.

pub mod memory;
pub mod parsing;
pub mod resolver;
pub mod selection;
pub mod swarm;

use std::fmt;

pub use memory::{MemorySwarmEngine, MemoryTorrent};
pub use parsing::{MagnetLink, TorrentFile, TorrentMetadata};
pub use resolver::{Resolver, TorrentIdentifier, TorrentSource};
pub use selection::select_default_file;
pub use swarm::{FileEntry, RangeReader, ReadError, SwarmEngine, SwarmTorrent};

/// The identifier forms `Resolver::resolve` accepts, quoted verbatim in
/// the terminal resolution error so callers can tell users what to fix.
pub const ACCEPTED_IDENTIFIER_FORMS: &str =
    "magnet uri, info hash, torrent file, http url, or filesystem path";

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
/// Used to uniquely identify torrents across the BitTorrent network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40-character hex string into an InfoHash.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMetadata` - Wrong length or non-hex input
    pub fn from_hex(text: &str) -> Result<Self, TorrentError> {
        if text.len() != 40 {
            return Err(TorrentError::InvalidMetadata {
                reason: format!("info hash must be 40 hex characters, got {}", text.len()),
            });
        }
        let bytes = hex::decode(text).map_err(|e| TorrentError::InvalidMetadata {
            reason: format!("invalid info hash hex: {e}"),
        })?;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors that can occur during torrent operations.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Invalid torrent identifier. Need {ACCEPTED_IDENTIFIER_FORMS}.")]
    InvalidIdentifier,

    #[error("Error downloading torrent: {source}")]
    FetchFailed {
        #[from]
        source: reqwest::Error,
    },

    #[error("Invalid torrent metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("File index {index} out of range, torrent has {file_count} files")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Swarm engine has shut down")]
    EngineShutdown,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
