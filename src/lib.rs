//! # Puppetry Stream - Real-Time Joint Transform Streaming
//!
//! Streams skeletal pose updates from an animation host to a remote puppetry
//! consumer, and relays a host's framed stdio stream to many socket clients.
//!
//! ## Features
//!
//! - **Frame codec**: `<decimal-length>:<payload>` framing with an
//!   incremental decoder that accepts arbitrary chunking
//! - **Pose differ**: canonical quaternions, per-joint channel switches and
//!   change/heartbeat based send suppression
//! - **Session client**: non-blocking TCP client with channel handshake,
//!   driven by a cooperative timer scheduler
//! - **Relay server**: one upstream, many clients, late-joiner replay of the
//!   initial frame, per-client fault isolation
//!
//! ## Architecture
//!
//! ```text
//! Host rig ──PoseSource──> SessionClient ──frames──> Consumer
//!                              ^    │
//!                   Scheduler ─┘    └── SessionEvent ──> Host
//!
//! Host stdio <══frames══> RelayServer <══frames══> client 1..N
//! ```
//!
//! ### Session State Machine
//!
//! ```text
//!     [Disconnected] ──connect()──> [Connecting] ──> [AwaitingHandshake]
//!           ^                                               │ first message
//!           │ error / EOF / disconnect()                    v
//!           └─────────────────────────────────────────── [Active]
//! ```
//!
//! ### Wire Format
//!
//! | Element  | Form                                                   |
//! |----------|--------------------------------------------------------|
//! | Frame    | `<decimal-length>:<payload-bytes>`                     |
//! | Envelope | `{"pump": <string>, "data": <value>}`                  |
//! | Update   | `{"command": "set", "data": {"j": {<joint>: {"p"?, "r"?}}}}` |
//!
//! ## Quick Start
//!
//! ### Streaming a Pose
//!
//! ```rust,ignore
//! use puppetry::{PoseSnapshot, Scheduler, SessionClient, SessionConfig, TransmitConfig};
//!
//! let transmit = TransmitConfig::new().with_joint("mHead", false, true);
//! let mut client = SessionClient::new(SessionConfig::default(), transmit, || {
//!     Some(sample_rig())
//! });
//! client.connect("127.0.0.1", 5000)?;
//!
//! let mut scheduler = Scheduler::new();
//! client.schedule(&mut scheduler);
//! scheduler.run(&mut client).await;
//! ```
//!
//! ### Running a Relay
//!
//! ```rust,ignore
//! use puppetry::{RelayConfig, RelayServer};
//!
//! let server = RelayServer::bind(RelayConfig::default()).await?;
//! server.run(tokio::io::stdin(), tokio::io::stdout()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Frame encoding and incremental decoding
//! - [`notation`]: Payload serialization (JSON or MessagePack)
//! - [`protocol`]: Envelopes, commands and handshake control requests
//! - [`pose`]: Quaternions, snapshots, transmit config and the differ
//! - [`scheduler`]: Cooperative timer scheduler
//! - [`session`]: Session client state machine
//! - [`relay`]: Relay server
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod notation;
pub mod pose;
pub mod protocol;
pub mod relay;
pub mod scheduler;
pub mod session;

// Re-exports for convenience
pub use codec::{Frame, FrameDecoder, FrameReader};
pub use config::Config;
pub use error::{PuppetryError, Result};
pub use notation::Notation;
pub use pose::{JointPose, PoseDiffer, PoseSnapshot, PoseSource, Quat, TransmitConfig};
pub use protocol::{Command, Envelope, JointUpdate, JointUpdates};
pub use relay::{RelayConfig, RelayHandle, RelayServer, RelayStats};
pub use scheduler::{Scheduler, TaskHandle, Tick};
pub use session::{SessionClient, SessionConfig, SessionEvent, SessionState, SessionStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
