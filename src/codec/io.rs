//! Async frame I/O over byte streams.
//!
//! [`FrameReader`] wraps any `AsyncRead` and yields whole frames;
//! [`write_frame`] emits one frame with a single `write_all` so two writers
//! sharing a sink through a queue never interleave partial frames.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::decoder::FrameDecoder;
use super::frame::Frame;
use crate::error::Result;

/// Read buffer size for a single `read` call.
const READ_CHUNK: usize = 8 * 1024;

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    chunk: Box<[u8]>,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self::with_decoder(reader, FrameDecoder::new())
    }

    /// Wrap a reader with a preconfigured decoder.
    pub fn with_decoder(reader: R, decoder: FrameDecoder) -> Self {
        Self {
            reader,
            decoder,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
            bytes_read: 0,
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on a clean close between frames, and
    /// `TruncatedStream` if the stream closes mid-frame.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                self.decoder.finish()?;
                return Ok(None);
            }
            self.bytes_read += n as u64;
            self.decoder.push(&self.chunk[..n]);
        }
    }

    /// Total bytes consumed from the underlying reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Unwrap the inner reader, discarding any buffered bytes.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}
