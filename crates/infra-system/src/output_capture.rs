// Bounded output capture
// Per-stream chunk producer consumed until EOF, cap or stop signal.
// Past the cap, bytes are still read (so the child never blocks on a full
// pipe) but dropped.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Read size per chunk (8 KiB)
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Pull-based producer of output chunks from one pipe
pub struct OutputChunks<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputChunks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; CHUNK_SIZE],
        }
    }

    /// Next chunk, or None at EOF. Cancel-safe.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let n = self.reader.read(&mut self.buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(self.buf[..n].to_vec()))
        }
    }
}

/// Byte buffer that keeps at most `cap` bytes and counts the rest
#[derive(Debug)]
pub struct BoundedBuffer {
    cap: usize,
    bytes: Vec<u8>,
    truncated: bool,
    total_bytes: u64,
}

impl BoundedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            bytes: Vec::new(),
            truncated: false,
            total_bytes: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.total_bytes += chunk.len() as u64;
        let room = self.cap.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.bytes.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(chunk);
        }
    }

    pub fn finish(self) -> CapturedStream {
        CapturedStream {
            bytes: self.bytes,
            truncated: self.truncated,
            total_bytes: self.total_bytes,
        }
    }
}

/// Everything kept from one stream
#[derive(Debug, Clone, Default)]
pub struct CapturedStream {
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub total_bytes: u64,
}

impl CapturedStream {
    /// Lossy UTF-8 decode (a cut multi-byte char becomes U+FFFD)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Consume `reader` until EOF or `stop`, keeping at most `cap` bytes
pub async fn capture<R>(reader: R, cap: usize, stop: CancellationToken) -> CapturedStream
where
    R: AsyncRead + Unpin,
{
    let mut chunks = OutputChunks::new(reader);
    let mut buffer = BoundedBuffer::new(cap);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = chunks.next_chunk() => match next {
                Ok(Some(chunk)) => buffer.push(&chunk),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Output stream read failed");
                    break;
                }
            },
        }
    }
    buffer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_caps_and_counts() {
        let mut buffer = BoundedBuffer::new(5);
        buffer.push(b"abc");
        buffer.push(b"defg");
        buffer.push(b"hij");

        let captured = buffer.finish();
        assert_eq!(captured.bytes, b"abcde");
        assert!(captured.truncated);
        assert_eq!(captured.total_bytes, 10);
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let mut buffer = BoundedBuffer::new(3);
        buffer.push(b"abc");
        let captured = buffer.finish();
        assert!(!captured.truncated);
        assert_eq!(captured.text(), "abc");
    }

    #[tokio::test]
    async fn test_capture_reads_to_eof() {
        let data = vec![b'x'; CHUNK_SIZE * 3 + 17];
        let captured = capture(data.as_slice(), 100, CancellationToken::new()).await;

        assert_eq!(captured.bytes.len(), 100);
        assert!(captured.truncated);
        assert_eq!(captured.total_bytes, data.len() as u64);
    }

    #[tokio::test]
    async fn test_capture_stops_on_signal() {
        let (_writer, reader) = tokio::io::duplex(64);
        let stop = CancellationToken::new();
        stop.cancel();

        let captured = capture(reader, 100, stop).await;
        assert!(captured.bytes.is_empty());
        assert!(!captured.truncated);
    }
}
