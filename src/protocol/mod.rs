//! Puppetry wire protocol.
//!
//! # Message Flow
//!
//! ```text
//! Consumer                                   Session client
//!    |                                            |
//!    |---- {"pump": p, "data": {"command": c}} -->|  first message fixes the channel
//!    |                                            |
//!    |<--- stoplisten (reserved listener) --------|  clear stale subscription
//!    |<--- listen (listener -> controller) -------|  subscribe
//!    |<--- {"command": "set"} --------------------|  complete registration
//!    |                                            |
//!    |<=== {"command": "set", "data": {"j": ..}} =|  joint updates (diffed)
//!    |==== send_skeleton / set / move ===========>|  inbound commands
//! ```
//!
//! # Commands
//!
//! | Command         | Payload                                   |
//! |-----------------|-------------------------------------------|
//! | `set`           | `{"j": {<joint>: {"p"?: [x,y,z], "r"?: [x,y,z]}}}` |
//! | `move`          | legacy synonym of `set`                   |
//! | `send_skeleton` | none                                      |

mod message;

pub use message::{
    Command, ControlOp, ControlRequest, Envelope, JointUpdate, JointUpdates,
};

use uuid::Uuid;

/// Pump that receives listen/stoplisten control requests.
pub const CONTROL_PUMP: &str = "LLEventPumps";

/// Destination the reserved listener is bound to.
pub const LISTENER_DEST: &str = "puppetry.controller";

/// Reserved listener identifier used by every session.
pub const RESERVED_LISTENER: Uuid = Uuid::from_u128(0x7f3c_1e2a_5b4d_4c8e_9a01_6d2f_8e3b_c410);
