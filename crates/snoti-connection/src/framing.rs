//! Splitting the inbound byte stream into frames.

use snoti_protocol::FRAME_DELIMITER;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Frames longer than this are discarded.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Reads newline-delimited frames.
///
/// Partial frames are kept across calls, so [`FrameReader::next_frame`] can
/// be raced against a deadline and retried without losing bytes.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Next frame without its delimiter, or `None` once the stream ends.
    ///
    /// A frame exceeding [`MAX_FRAME_LEN`] yields an `InvalidData` error
    /// once; its remaining bytes are skipped up to the next delimiter.
    pub async fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                self.discarding = false;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let (chunk_len, complete) = match available.iter().position(|b| *b == FRAME_DELIMITER) {
                Some(pos) => (pos, true),
                None => (available.len(), false),
            };

            if !self.discarding {
                self.pending.extend_from_slice(&available[..chunk_len]);
            }
            let consumed = if complete { chunk_len + 1 } else { chunk_len };
            self.inner.consume(consumed);

            if complete {
                if std::mem::take(&mut self.discarding) {
                    continue;
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            if !self.discarding && self.pending.len() > MAX_FRAME_LEN {
                let len = self.pending.len();
                self.pending.clear();
                self.discarding = true;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame exceeds {MAX_FRAME_LEN} bytes ({len} buffered)"),
                ));
            }
        }
    }

    /// Recover the underlying reader. Buffered bytes are dropped.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_splits_frames_on_delimiter() {
        let input: &[u8] = b"{\"cmd\":\"pong\"}\n{\"cmd\":\"event_push\"}\n";
        let mut reader = FrameReader::new(input);

        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"cmd\":\"pong\"}");
        assert_eq!(
            reader.next_frame().await.unwrap().unwrap(),
            b"{\"cmd\":\"event_push\"}"
        );
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trailing_bytes_returned_at_eof() {
        let input: &[u8] = b"{\"cmd\":\"pong\"}";
        let mut reader = FrameReader::new(input);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"cmd\":\"pong\"}");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_split_across_writes() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(client);

        server.write_all(b"{\"cmd\":").await.unwrap();
        let first = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            reader.next_frame(),
        )
        .await;
        assert!(first.is_err(), "incomplete frame must not be returned");

        server.write_all(b"\"pong\"}\n").await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"cmd\":\"pong\"}");
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped() {
        let mut input = vec![b'x'; MAX_FRAME_LEN + 10];
        input.push(b'\n');
        input.extend_from_slice(b"{\"cmd\":\"pong\"}\n");
        let mut reader = FrameReader::new(input.as_slice());

        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"cmd\":\"pong\"}");
    }
}
