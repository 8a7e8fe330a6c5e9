//! Incremental frame decoder.
//!
//! Bytes may arrive one at a time or many at once. The decoder keeps a
//! single `BytesMut` accumulator and a two-state machine:
//!
//! - `Length`: collect ASCII digits until `:`; then parse the length
//! - `Body { remaining }`: collect exactly `remaining` payload bytes
//!
//! After a frame is emitted the decoder returns to `Length`. Iteration is
//! lazy and restartable: [`FrameDecoder::frames`] yields frames until the
//! buffer runs dry, and resumes after the next [`FrameDecoder::push`].
//!
//! A framing error leaves the decoder in an unspecified state; the owning
//! connection is expected to be closed and the decoder discarded.

use bytes::BytesMut;

use super::frame::{Frame, DELIMITER, MAX_LENGTH_DIGITS};
use crate::error::{PuppetryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating length digits; `scanned` bytes are known to be digits.
    Length { scanned: usize },
    /// Length parsed, waiting for the rest of the payload.
    Body { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    state: State,
    max_frame_len: Option<usize>,
}

impl FrameDecoder {
    /// Create a decoder with no frame size limit.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            state: State::Length { scanned: 0 },
            max_frame_len: None,
        }
    }

    /// Create a decoder that rejects frames longer than `max` bytes.
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            max_frame_len: Some(max),
            ..Self::new()
        }
    }

    /// Set or clear the frame size limit.
    pub fn set_max_frame_len(&mut self, max: Option<usize>) {
        self.max_frame_len = max;
    }

    /// Append received bytes without extracting frames.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Push bytes and collect every frame they complete.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.push(data);
        self.frames().collect()
    }

    /// Lazily iterate the frames currently available.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            decoder: self,
            failed: false,
        }
    }

    /// Try to extract a single frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::Length { scanned } => {
                    let Some(offset) = self.scan_length(scanned)? else {
                        return Ok(None);
                    };
                    let length = self.parse_length(offset)?;
                    let _ = self.buffer.split_to(offset + 1);
                    self.state = State::Body { remaining: length };
                },
                State::Body { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }
                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::Length { scanned: 0 };
                    return Ok(Some(Frame::new(payload)));
                },
            }
        }
    }

    /// Check the stream may end here.
    ///
    /// Fails with `TruncatedStream` if a partial frame is buffered.
    pub fn finish(&self) -> Result<()> {
        if self.is_mid_frame() {
            Err(PuppetryError::TruncatedStream {
                buffered: self.buffer.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Whether any part of a frame has been received but not emitted.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::Body { .. }) || !self.buffer.is_empty()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Length { scanned: 0 };
    }

    /// Scan for the delimiter, validating digits as we go.
    fn scan_length(&mut self, scanned: usize) -> Result<Option<usize>> {
        for (i, &byte) in self.buffer.iter().enumerate().skip(scanned) {
            if byte == DELIMITER {
                return Ok(Some(i));
            }
            if !byte.is_ascii_digit() {
                return Err(PuppetryError::Framing(format!(
                    "invalid byte 0x{byte:02x} in length prefix"
                )));
            }
            if i >= MAX_LENGTH_DIGITS {
                return Err(PuppetryError::Framing(
                    "length prefix is not terminated".to_string(),
                ));
            }
        }
        self.state = State::Length {
            scanned: self.buffer.len(),
        };
        Ok(None)
    }

    fn parse_length(&self, digits: usize) -> Result<usize> {
        if digits == 0 {
            return Err(PuppetryError::Framing("empty length prefix".to_string()));
        }

        // Digits were validated by scan_length, so this is ASCII.
        let text = std::str::from_utf8(&self.buffer[..digits])
            .map_err(|e| PuppetryError::Framing(e.to_string()))?;
        let length: usize = text
            .parse()
            .map_err(|_| PuppetryError::Framing(format!("length {text} out of range")))?;

        if let Some(max) = self.max_frame_len {
            if length > max {
                return Err(PuppetryError::Framing(format!(
                    "frame length {length} exceeds maximum {max}"
                )));
            }
        }
        Ok(length)
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Length { .. } => "Length",
            State::Body { .. } => "Body",
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the frames currently decodable.
///
/// Ends when more input is needed; yields an error once and then ends if the
/// stream is malformed.
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    failed: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.decoder.next_frame().transpose();
        self.failed = matches!(next, Some(Err(_)));
        next
    }
}
