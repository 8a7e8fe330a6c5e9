//! Session client: streams pose updates to one consumer over TCP.
//!
//! The client is a plain value owned by the host. Its two periodic
//! activities, network polling and pose sampling, are run by a
//! [`Scheduler`](crate::scheduler::Scheduler) the host drives:
//!
//! ```rust,ignore
//! let mut client = SessionClient::new(config, transmit, source);
//! client.connect("127.0.0.1", 5000)?;
//!
//! let mut scheduler = Scheduler::new();
//! client.schedule(&mut scheduler);
//! scheduler.run(&mut client).await;
//! ```
//!
//! Host-facing notifications are queued as [`SessionEvent`]s and taken with
//! [`SessionClient::drain_events`].

mod client;
mod config;
mod state;

pub use client::{SessionClient, SessionTasks};
pub use config::{validate_port, SessionConfig, MIN_PORT};
pub use state::{SessionEvent, SessionState, SessionStats};
