//! Length-prefixed frame codec.
//!
//! Every message on every connection (session socket, relay clients, relay
//! upstream) travels as `<decimal-length>:<payload>`.
//!
//! - [`Frame`]: one immutable payload
//! - [`FrameDecoder`]: incremental two-state parser, never blocks
//! - [`FrameReader`] / [`write_frame`]: async adapters used by the relay
//!
//! # Example
//!
//! ```
//! use puppetry::codec::{encode_payload, FrameDecoder};
//!
//! let wire = encode_payload(b"{\"pump\":\"x\"}");
//! let mut decoder = FrameDecoder::new();
//!
//! // Bytes can arrive in any chunking
//! let (a, b) = wire.split_at(3);
//! assert!(decoder.decode(a).unwrap().is_empty());
//! let frames = decoder.decode(b).unwrap();
//! assert_eq!(&frames[0].payload()[..], b"{\"pump\":\"x\"}");
//! ```

mod decoder;
mod frame;
mod io;

pub use decoder::{FrameDecoder, Frames};
pub use frame::{encode_payload, encode_payload_into, Frame, DELIMITER};
pub use io::{write_frame, FrameReader};
