//! IP-range blocklist loading.
//!
//! Accepts the line-oriented `label: start-end` format, optionally
//! gzip-compressed. A `.gz` input is decompressed to a sibling path with
//! a `.txt` extension first, then parsed from there. Loading is one
//! asynchronous contract regardless of compression; the inflate itself
//! runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// One excluded IP range, boundaries kept as the textual tokens found in
/// the file (hex, IPv4, or IPv6 forms all pass through unchanged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlocklistEntry {
    pub start: String,
    pub end: String,
}

/// Errors that can occur while loading a blocklist file.
#[derive(Debug, thiserror::Error)]
pub enum BlocklistError {
    #[error("could not read blocklist {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decompress blocklist {path}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*[^#].*?\s*:\s*([a-f0-9.:]+?)\s*-\s*([a-f0-9.:]+?)\s*$")
            .expect("blocklist line pattern is valid")
    })
}

/// Loads a blocklist from disk, transparently decompressing `.gz` inputs.
///
/// # Errors
/// - `BlocklistError::Decompress` - `.gz` input could not be inflated
/// - `BlocklistError::Io` - The (decompressed) file could not be read
pub async fn load(path: &Path) -> Result<Vec<BlocklistEntry>, BlocklistError> {
    let path = if path.extension().is_some_and(|ext| ext == "gz") {
        decompress_to_sibling(path).await?
    } else {
        path.to_path_buf()
    };

    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| BlocklistError::Io {
            path: path.clone(),
            source,
        })?;

    let entries = parse(&text);
    debug!(path = %path.display(), entries = entries.len(), "blocklist loaded");
    Ok(entries)
}

/// Parses blocklist text: one entry per matching line, everything else
/// (comments, blanks, malformed lines) silently skipped.
pub fn parse(text: &str) -> Vec<BlocklistEntry> {
    text.lines()
        .filter_map(|line| {
            line_pattern().captures(line).map(|captures| BlocklistEntry {
                start: captures[1].to_string(),
                end: captures[2].to_string(),
            })
        })
        .collect()
}

/// Inflates `list.gz` to `list.txt` next to it and returns the new path.
async fn decompress_to_sibling(path: &Path) -> Result<PathBuf, BlocklistError> {
    let target = path.with_extension("txt");
    let source_path = path.to_path_buf();
    let target_path = target.clone();

    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let input = std::fs::File::open(&source_path)?;
        let mut decoder = flate2::read::GzDecoder::new(input);
        let mut output = std::fs::File::create(&target_path)?;
        std::io::copy(&mut decoder, &mut output)?;
        Ok(())
    })
    .await;

    let io_result = result.map_err(|join_error| BlocklistError::Decompress {
        path: path.to_path_buf(),
        source: std::io::Error::other(join_error),
    })?;
    io_result.map_err(|source| BlocklistError::Decompress {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(target)
}
