//! Streaming body production over a lazy range reader.
//!
//! The body is built chunk by chunk from `RangeReader::read_at`, so a
//! response never buffers the whole file. Each chunk read suspends until
//! the swarm has the backing pieces; backpressure from a slow client
//! simply delays the next `read_at`, and dropping the body (client
//! disconnect) drops the in-flight read with it.

use std::sync::Arc;

use bytes::Bytes;
use ebbtide_core::torrent::RangeReader;
use futures::{Stream, stream};

use crate::range::ByteRange;

/// Bytes requested from the reader per chunk. Balances per-read overhead
/// against how long a not-yet-downloaded tail stalls the first byte.
const CHUNK_SIZE: usize = 256 * 1024;

/// Yields the bytes of `range` in order, reading lazily from `reader`.
pub fn range_stream(
    reader: Arc<dyn RangeReader>,
    range: ByteRange,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    let end_exclusive = range.end + 1;
    stream::unfold(
        (reader, range.start),
        move |(reader, offset)| async move {
            if offset >= end_exclusive {
                return None;
            }

            let chunk_length = (end_exclusive - offset).min(CHUNK_SIZE as u64) as usize;
            match reader.read_at(offset, chunk_length).await {
                Ok(bytes) => {
                    let advanced = offset + bytes.len() as u64;
                    Some((Ok(bytes), (reader, advanced)))
                }
                Err(error) => Some((
                    Err(std::io::Error::other(error.to_string())),
                    (reader, end_exclusive),
                )),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ebbtide_core::torrent::{MemoryTorrent, SwarmTorrent};
    use futures::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn test_stream_yields_exact_range() {
        let content = Bytes::from((0..=255u8).collect::<Vec<_>>());
        let torrent = MemoryTorrent::with_content("a.bin", content, 64);
        torrent.complete_all();

        let reader = torrent.reader(0).unwrap();
        let collected: Vec<Bytes> = range_stream(reader, ByteRange { start: 10, end: 19 })
            .try_collect()
            .await
            .unwrap();

        let flat: Vec<u8> = collected.concat();
        assert_eq!(flat, (10..20u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stream_waits_for_late_pieces() {
        let content = Bytes::from(vec![42u8; 1024]);
        let torrent = std::sync::Arc::new(MemoryTorrent::with_content("b.bin", content, 256));
        let reader = torrent.reader(0).unwrap();

        let driver = torrent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            driver.complete_all();
        });

        let collected: Vec<Bytes> = range_stream(reader, ByteRange { start: 0, end: 1023 })
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected.concat().len(), 1024);
    }

    #[tokio::test]
    async fn test_stream_spans_multiple_chunks() {
        let length = CHUNK_SIZE as u64 * 2 + 100;
        let content = Bytes::from(vec![7u8; length as usize]);
        let torrent = MemoryTorrent::with_content("c.bin", content, 64 * 1024);
        torrent.complete_all();

        let reader = torrent.reader(0).unwrap();
        let collected: Vec<Bytes> = range_stream(
            reader,
            ByteRange {
                start: 0,
                end: length - 1,
            },
        )
        .try_collect()
        .await
        .unwrap();

        assert!(collected.len() >= 3);
        assert_eq!(collected.concat().len(), length as usize);
    }
}
