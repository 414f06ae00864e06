//! Identifier resolution: turning a heterogeneous torrent identifier into
//! a canonical, engine-ready source.
//!
//! Resolution runs three strategies in priority order: structural parse
//! (magnet URI, hex info hash, raw metadata bytes, pre-parsed metadata),
//! HTTP fetch of a remote `.torrent`, then filesystem read. A single
//! failure is terminal for the add in progress; no strategy retries.

use tracing::debug;
use url::Url;

use super::parsing::{self, MagnetLink, TorrentMetadata};
use super::{InfoHash, TorrentError};
use crate::config::NetworkConfig;

/// A torrent identifier as supplied by a caller, before resolution.
#[derive(Debug, Clone)]
pub enum TorrentIdentifier {
    /// Magnet URI, hex info hash, HTTP(S) URL, or filesystem path;
    /// which one is decided during resolution.
    Text(String),
    /// Raw `.torrent` file contents.
    Bytes(Vec<u8>),
    /// Already-parsed metadata, passed through untouched.
    Metadata(TorrentMetadata),
}

impl From<&str> for TorrentIdentifier {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TorrentIdentifier {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for TorrentIdentifier {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<TorrentMetadata> for TorrentIdentifier {
    fn from(metadata: TorrentMetadata) -> Self {
        Self::Metadata(metadata)
    }
}

/// Canonical engine-ready representation produced by resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum TorrentSource {
    /// Full metadata is known; the file table is available immediately.
    Metadata(TorrentMetadata),
    /// Only the info hash (plus optional name and trackers) is known;
    /// the swarm fetches metadata after the add.
    Magnet(MagnetLink),
}

impl TorrentSource {
    pub fn info_hash(&self) -> InfoHash {
        match self {
            TorrentSource::Metadata(metadata) => metadata.info_hash,
            TorrentSource::Magnet(link) => link.info_hash,
        }
    }
}

/// Resolves torrent identifiers, fetching remote metadata when needed.
#[derive(Clone)]
pub struct Resolver {
    http: reqwest::Client,
}

impl Resolver {
    /// # Errors
    /// - `TorrentError::FetchFailed` - HTTP client construction failed
    pub fn new(config: &NetworkConfig) -> Result<Self, TorrentError> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self { http })
    }

    /// Resolves an identifier to an engine-ready source.
    ///
    /// # Errors
    /// - `TorrentError::FetchFailed` - URL identifier could not be fetched
    /// - `TorrentError::InvalidMetadata` - Fetched or read bytes are not a torrent
    /// - `TorrentError::InvalidIdentifier` - No strategy succeeded; the
    ///   message enumerates the accepted identifier forms
    pub async fn resolve(&self, id: TorrentIdentifier) -> Result<TorrentSource, TorrentError> {
        match id {
            TorrentIdentifier::Metadata(metadata) => Ok(TorrentSource::Metadata(metadata)),
            TorrentIdentifier::Bytes(bytes) => {
                parsing::parse_torrent_bytes(&bytes).map(TorrentSource::Metadata)
            }
            TorrentIdentifier::Text(text) => self.resolve_text(&text).await,
        }
    }

    async fn resolve_text(&self, text: &str) -> Result<TorrentSource, TorrentError> {
        if let Some(source) = Self::parse_structural(text) {
            return Ok(source);
        }

        if is_http_url(text) {
            debug!(url = text, "fetching remote torrent file");
            let body = self
                .http
                .get(text)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            return parsing::parse_torrent_bytes(&body).map(TorrentSource::Metadata);
        }

        debug!(path = text, "reading torrent file from disk");
        let bytes = tokio::fs::read(text)
            .await
            .map_err(|_| TorrentError::InvalidIdentifier)?;
        parsing::parse_torrent_bytes(&bytes).map(TorrentSource::Metadata)
    }

    /// Structural parse of textual identifiers: magnet URIs and bare hex
    /// info hashes. A parse that yields no info hash does not count as
    /// structural, so the caller falls through to URL/path handling.
    fn parse_structural(text: &str) -> Option<TorrentSource> {
        if text.starts_with("magnet:") {
            return parsing::parse_magnet(text).ok().map(TorrentSource::Magnet);
        }

        if text.len() == 40 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            let info_hash = InfoHash::from_hex(text).ok()?;
            return Some(TorrentSource::Magnet(MagnetLink {
                info_hash,
                display_name: None,
                trackers: Vec::new(),
            }));
        }

        None
    }
}

fn is_http_url(text: &str) -> bool {
    Url::parse(text)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
