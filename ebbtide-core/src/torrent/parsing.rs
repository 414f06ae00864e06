//! Torrent metadata and magnet link parsing.
//!
//! The info hash is the SHA-1 of the bencoded `info` dictionary. Since
//! bencode dictionaries are canonically key-sorted, re-encoding the parsed
//! `info` value reproduces the original bytes.

use std::collections::HashMap;

use serde_bencode::value::Value;
use sha1::{Digest, Sha1};

use super::swarm::FileEntry;
use super::{InfoHash, TorrentError};

type BencodeDict = HashMap<Vec<u8>, Value>;

/// Complete metadata extracted from a torrent file.
///
/// Contains the information needed to add a torrent and expose its file
/// table: info hash, piece geometry, file structure, and tracker URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMetadata {
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u32,
    pub total_length: u64,
    pub files: Vec<TorrentFile>,
    pub announce_urls: Vec<String>,
}

/// Individual file within a torrent.
///
/// Represents a single file entry in multi-file torrents with its
/// relative path components and byte length.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFile {
    pub path: Vec<String>,
    pub length: u64,
}

/// Magnet link components.
///
/// Parsed magnet URI containing minimal torrent metadata: info hash and
/// optional display name and tracker URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl TorrentMetadata {
    /// Flattens the file list into serve-ready entries with torrent-wide
    /// byte offsets. Offsets are cumulative, so they are monotonically
    /// non-decreasing and non-overlapping.
    pub fn file_entries(&self) -> Vec<FileEntry> {
        let mut offset = 0u64;
        self.files
            .iter()
            .map(|file| {
                let entry = FileEntry {
                    name: file.path.join("/"),
                    length: file.length,
                    offset,
                };
                offset += file.length;
                entry
            })
            .collect()
    }
}

/// Parses raw `.torrent` bytes into metadata.
///
/// # Errors
/// - `TorrentError::InvalidMetadata` - Malformed bencode, missing `info`
///   dictionary, or missing required fields
pub fn parse_torrent_bytes(data: &[u8]) -> Result<TorrentMetadata, TorrentError> {
    let root: Value =
        serde_bencode::de::from_bytes(data).map_err(|e| TorrentError::InvalidMetadata {
            reason: format!("bencode parsing failed: {e}"),
        })?;

    let Value::Dict(dict) = root else {
        return Err(TorrentError::InvalidMetadata {
            reason: "root element must be a dictionary".to_string(),
        });
    };

    let info = dict
        .get(b"info".as_slice())
        .ok_or_else(|| TorrentError::InvalidMetadata {
            reason: "missing 'info' dictionary".to_string(),
        })?;

    let info_hash = hash_info_dict(info)?;

    let Value::Dict(info_dict) = info else {
        return Err(TorrentError::InvalidMetadata {
            reason: "'info' must be a dictionary".to_string(),
        });
    };

    let name = required_string(info_dict, b"name")?;
    let piece_length = required_integer(info_dict, b"piece length")? as u32;

    let pieces = required_bytes(info_dict, b"pieces")?;
    if pieces.len() % 20 != 0 {
        return Err(TorrentError::InvalidMetadata {
            reason: format!("'pieces' length {} is not a multiple of 20", pieces.len()),
        });
    }

    let (files, total_length) = extract_files(info_dict, &name)?;
    let announce_urls = extract_announce_urls(&dict);

    Ok(TorrentMetadata {
        info_hash,
        name,
        piece_length,
        total_length,
        files,
        announce_urls,
    })
}

/// Parses a magnet URI into its components.
///
/// Accepts both 40-character hex and 32-character base32 `btih` hashes.
///
/// # Errors
/// - `TorrentError::InvalidMetadata` - Malformed magnet URI or missing
///   `xt=urn:btih:` parameter
pub fn parse_magnet(text: &str) -> Result<MagnetLink, TorrentError> {
    let magnet = magnet_url::Magnet::new(text).map_err(|e| TorrentError::InvalidMetadata {
        reason: format!("invalid magnet link: {e}"),
    })?;

    // Pull the hash out of the original text; the re-rendered form may
    // normalize characters the hash parser cares about.
    let info_hash = extract_magnet_hash(text)?;

    Ok(MagnetLink {
        info_hash,
        display_name: magnet.display_name().map(|s| s.to_string()),
        trackers: magnet.trackers().to_vec(),
    })
}

/// SHA-1 of the re-encoded info dictionary.
fn hash_info_dict(info: &Value) -> Result<InfoHash, TorrentError> {
    let info_bytes =
        serde_bencode::ser::to_bytes(info).map_err(|e| TorrentError::InvalidMetadata {
            reason: format!("could not re-encode info dictionary: {e}"),
        })?;

    let mut hasher = Sha1::new();
    hasher.update(&info_bytes);
    let digest = hasher.finalize();
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&digest);
    Ok(InfoHash::new(hash))
}

/// Extracts the file list and total length from the info dictionary.
///
/// Single-file torrents carry a top-level `length`; multi-file torrents
/// carry a `files` list of `{length, path}` dictionaries.
fn extract_files(
    info_dict: &BencodeDict,
    name: &str,
) -> Result<(Vec<TorrentFile>, u64), TorrentError> {
    if let Some(Value::Int(length)) = info_dict.get(b"length".as_slice()) {
        let length = *length as u64;
        let files = vec![TorrentFile {
            path: vec![name.to_string()],
            length,
        }];
        return Ok((files, length));
    }

    let Some(Value::List(entries)) = info_dict.get(b"files".as_slice()) else {
        return Err(TorrentError::InvalidMetadata {
            reason: "missing 'length' or 'files' field".to_string(),
        });
    };

    let mut files = Vec::with_capacity(entries.len());
    let mut total_length = 0u64;

    for entry in entries {
        let Value::Dict(file_dict) = entry else {
            return Err(TorrentError::InvalidMetadata {
                reason: "file entry must be a dictionary".to_string(),
            });
        };

        let length = required_integer(file_dict, b"length")? as u64;

        let Some(Value::List(components)) = file_dict.get(b"path".as_slice()) else {
            return Err(TorrentError::InvalidMetadata {
                reason: "file entry missing 'path' list".to_string(),
            });
        };

        let mut path = Vec::with_capacity(components.len());
        for component in components {
            let Value::Bytes(bytes) = component else {
                return Err(TorrentError::InvalidMetadata {
                    reason: "path component must be a string".to_string(),
                });
            };
            path.push(String::from_utf8_lossy(bytes).into_owned());
        }

        total_length += length;
        files.push(TorrentFile { path, length });
    }

    if files.is_empty() {
        return Err(TorrentError::InvalidMetadata {
            reason: "torrent contains no files".to_string(),
        });
    }

    Ok((files, total_length))
}

/// Collects announce URLs from `announce` and `announce-list`, in order,
/// skipping malformed entries.
fn extract_announce_urls(dict: &BencodeDict) -> Vec<String> {
    let mut urls = Vec::new();

    if let Some(Value::Bytes(bytes)) = dict.get(b"announce".as_slice()) {
        urls.push(String::from_utf8_lossy(bytes).into_owned());
    }

    if let Some(Value::List(tiers)) = dict.get(b"announce-list".as_slice()) {
        for tier in tiers {
            let Value::List(entries) = tier else { continue };
            for entry in entries {
                if let Value::Bytes(bytes) = entry {
                    let url = String::from_utf8_lossy(bytes).into_owned();
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
        }
    }

    urls
}

fn required_string(dict: &BencodeDict, key: &[u8]) -> Result<String, TorrentError> {
    let bytes = required_bytes(dict, key)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn required_bytes<'a>(dict: &'a BencodeDict, key: &[u8]) -> Result<&'a [u8], TorrentError> {
    match dict.get(key) {
        Some(Value::Bytes(bytes)) => Ok(bytes),
        _ => Err(TorrentError::InvalidMetadata {
            reason: format!("missing '{}' field", String::from_utf8_lossy(key)),
        }),
    }
}

fn required_integer(dict: &BencodeDict, key: &[u8]) -> Result<i64, TorrentError> {
    match dict.get(key) {
        Some(Value::Int(value)) => Ok(*value),
        _ => Err(TorrentError::InvalidMetadata {
            reason: format!("missing '{}' field", String::from_utf8_lossy(key)),
        }),
    }
}

/// Pulls the `xt=urn:btih:` hash out of a magnet URI string.
fn extract_magnet_hash(uri: &str) -> Result<InfoHash, TorrentError> {
    let query = uri.split_once('?').map(|(_, q)| q).unwrap_or(uri);

    for param in query.split('&') {
        if let Some(hash_text) = param.strip_prefix("xt=urn:btih:") {
            return parse_hash_text(hash_text);
        }
    }

    Err(TorrentError::InvalidMetadata {
        reason: "magnet link has no xt=urn:btih parameter".to_string(),
    })
}

/// Decodes a btih hash in either hex (40 chars) or base32 (32 chars) form.
fn parse_hash_text(text: &str) -> Result<InfoHash, TorrentError> {
    match text.len() {
        40 => InfoHash::from_hex(text),
        32 => decode_base32_hash(text),
        other => Err(TorrentError::InvalidMetadata {
            reason: format!("info hash must be 40 hex or 32 base32 characters, got {other}"),
        }),
    }
}

/// RFC 4648 base32 decoding of a 32-character hash (exactly 160 bits, so
/// no padding is involved).
fn decode_base32_hash(text: &str) -> Result<InfoHash, TorrentError> {
    let mut accumulator = 0u64;
    let mut bits = 0u32;
    let mut out = [0u8; 20];
    let mut written = 0;

    for c in text.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'a'..=b'z' => c - b'a',
            b'2'..=b'7' => c - b'2' + 26,
            _ => {
                return Err(TorrentError::InvalidMetadata {
                    reason: format!("invalid base32 character '{}'", c as char),
                });
            }
        };
        accumulator = (accumulator << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out[written] = (accumulator >> bits) as u8;
            written += 1;
        }
    }

    Ok(InfoHash::new(out))
}

/// Hand-built single-file torrent used by tests across the crate:
/// name "test.bin", 100 bytes, one 16 KiB piece.
#[cfg(test)]
pub(crate) fn single_file_torrent() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:announce17:http://tr.example4:infod");
    data.extend_from_slice(b"6:lengthi100e4:name8:test.bin12:piece lengthi16384e");
    data.extend_from_slice(b"6:pieces20:aaaaaaaaaaaaaaaaaaaa");
    data.extend_from_slice(b"ee");
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi_file_torrent() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"d4:infod");
        data.extend_from_slice(b"5:filesl");
        data.extend_from_slice(b"d6:lengthi10e4:pathl5:a.txtee");
        data.extend_from_slice(b"d6:lengthi50e4:pathl3:sub5:b.mp4ee");
        data.extend_from_slice(b"e");
        data.extend_from_slice(b"4:name4:pack12:piece lengthi16384e");
        data.extend_from_slice(b"6:pieces20:aaaaaaaaaaaaaaaaaaaa");
        data.extend_from_slice(b"ee");
        data
    }

    #[test]
    fn test_parse_single_file_torrent() {
        let metadata = parse_torrent_bytes(&single_file_torrent()).unwrap();
        assert_eq!(metadata.name, "test.bin");
        assert_eq!(metadata.total_length, 100);
        assert_eq!(metadata.piece_length, 16384);
        assert_eq!(metadata.files.len(), 1);
        assert_eq!(metadata.files[0].path, vec!["test.bin"]);
        assert_eq!(metadata.announce_urls, vec!["http://tr.example"]);
    }

    #[test]
    fn test_parse_multi_file_torrent_offsets() {
        let metadata = parse_torrent_bytes(&multi_file_torrent()).unwrap();
        assert_eq!(metadata.total_length, 60);

        let entries = metadata.file_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[1].name, "sub/b.mp4");
        assert_eq!(entries[1].offset, 10);
        assert_eq!(entries[1].length, 50);
    }

    #[test]
    fn test_info_hash_stable_across_parses() {
        let first = parse_torrent_bytes(&single_file_torrent()).unwrap();
        let second = parse_torrent_bytes(&single_file_torrent()).unwrap();
        assert_eq!(first.info_hash, second.info_hash);
    }

    #[test]
    fn test_parse_rejects_missing_info() {
        let data = b"d8:announce17:http://tr.examplee";
        assert!(matches!(
            parse_torrent_bytes(data),
            Err(TorrentError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_torrent_bytes(b"not bencode at all").is_err());
    }

    #[test]
    fn test_parse_magnet_hex() {
        let hash = "0123456789abcdef0123456789abcdef01234567";
        let magnet = format!("magnet:?xt=urn:btih:{hash}&dn=My+File&tr=http://tr.example");
        let link = parse_magnet(&magnet).unwrap();
        assert_eq!(link.info_hash.to_string(), hash);
        assert!(link.display_name.is_some());
    }

    #[test]
    fn test_parse_magnet_base32_matches_hex() {
        // 32 'A's decode to 20 zero bytes, i.e. 40 hex zeros
        let base32 = "magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        let hex = format!("magnet:?xt=urn:btih:{}", "0".repeat(40));
        let from_base32 = parse_magnet(base32).unwrap();
        let from_hex = parse_magnet(&hex).unwrap();
        assert_eq!(from_base32.info_hash, from_hex.info_hash);
    }

    #[test]
    fn test_parse_magnet_rejects_missing_hash() {
        assert!(parse_magnet("magnet:?dn=nothing-here").is_err());
    }

    #[test]
    fn test_base32_rejects_invalid_characters() {
        assert!(decode_base32_hash("11111111111111111111111111111111").is_err());
    }
}
