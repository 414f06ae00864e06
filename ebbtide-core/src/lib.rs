//! Ebbtide Core - torrent resolution and progressive streaming primitives
//!
//! This crate provides the building blocks for serving a file out of an
//! in-progress torrent download: identifier resolution, the add pipeline,
//! default file selection, the swarm-engine trait seam, and blocklist
//! loading.

pub mod blocklist;
pub mod client;
pub mod config;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use blocklist::{BlocklistEntry, BlocklistError};
pub use client::{ActiveTorrent, AddOptions, AddToken, Client, ClientEvent};
pub use config::EbbtideConfig;
pub use torrent::{InfoHash, TorrentError};

/// Core errors that can bubble up from any Ebbtide subsystem.
#[derive(Debug, thiserror::Error)]
pub enum EbbtideError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Blocklist error: {0}")]
    Blocklist(#[from] BlocklistError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EbbtideError>;
