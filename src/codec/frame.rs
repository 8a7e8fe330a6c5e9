//! Length-prefixed frame type.
//!
//! On the wire a frame is `<decimal-length>:<payload>`, where the length is
//! the exact byte count of the payload in ASCII digits.

use bytes::{BufMut, Bytes, BytesMut};

/// Delimiter between the decimal length and the payload.
pub const DELIMITER: u8 = b':';

/// Longest decimal prefix accepted for a `usize` length.
pub(crate) const MAX_LENGTH_DIGITS: usize = 20;

/// One complete, immutable frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame from a payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Payload bytes (without the length prefix).
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame and return its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Size of the frame on the wire, prefix included.
    pub fn encoded_len(&self) -> usize {
        decimal_width(self.payload.len()) + 1 + self.payload.len()
    }

    /// Encode to wire bytes as a single contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the wire encoding to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        encode_payload_into(&self.payload, buf);
    }
}

impl From<Vec<u8>> for Frame {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(payload)
    }
}

impl From<&'static [u8]> for Frame {
    fn from(payload: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(payload))
    }
}

/// Encode a raw payload into wire bytes.
pub fn encode_payload(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(decimal_width(payload.len()) + 1 + payload.len());
    encode_payload_into(payload, &mut buf);
    buf.freeze()
}

/// Append the wire encoding of a raw payload to `buf`.
pub fn encode_payload_into(payload: &[u8], buf: &mut BytesMut) {
    buf.reserve(decimal_width(payload.len()) + 1 + payload.len());
    buf.put_slice(payload.len().to_string().as_bytes());
    buf.put_u8(DELIMITER);
    buf.put_slice(payload);
}

fn decimal_width(mut n: usize) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}
