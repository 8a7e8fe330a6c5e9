//! Relay server bridging one upstream frame stream to many socket clients.
//!
//! - Upstream to clients: every frame is broadcast verbatim; the first one
//!   is cached and replayed to late joiners before anything else.
//! - Clients to upstream: every frame is forwarded verbatim, whole.
//! - A failing client only affects itself. Upstream EOF or failure shuts the
//!   whole relay down.
//!
//! ```rust,ignore
//! let server = RelayServer::bind(RelayConfig::default()).await?;
//! server.run(tokio::io::stdin(), tokio::io::stdout()).await?;
//! ```

mod config;
mod registry;
mod server;
mod stats;

pub use config::{RelayConfig, DEFAULT_CLIENT_QUEUE, DEFAULT_RELAY_PORT};
pub use registry::{ClientId, ClientQueue, ClientRegistry};
pub use server::{RelayHandle, RelayServer};
pub use stats::{RelayStats, RelayStatsSummary};
