//! Relay server: one upstream frame stream fanned out to many TCP clients.
//!
//! ```text
//!              ┌──────────── broadcast (encoded once) ───────────┐
//! upstream ──> pump_upstream ──> ClientRegistry ──> client queue ──> client socket
//!    ^                                                                   │
//!    └──── forward_upstream <── mpsc<Frame> <──── client read loop <─────┘
//! ```
//!
//! Each client is served by a single task that owns its socket. Writes to
//! the upstream sink happen only in `forward_upstream`, one whole frame at
//! a time. Upstream EOF or failure shuts everything down.
//!
//! A client task waiting on a socket write or on the upstream queue still
//! stops as soon as the client leaves the registry, so a peer that stops
//! reading cannot hold up shutdown or outlive its eviction.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::RelayConfig;
use super::registry::{ClientId, ClientQueue, ClientRegistry};
use super::stats::RelayStats;
use crate::codec::{write_frame, Frame, FrameDecoder, FrameReader};
use crate::error::{PuppetryError, Result};

const LISTEN_BACKLOG: u32 = 1024;

/// Remote control for a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    shutdown_tx: broadcast::Sender<()>,
    stats: Arc<RelayStats>,
}

impl RelayHandle {
    /// Request a full shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Shared counters.
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}

/// Shared state handed to every task
struct RelayState {
    config: RelayConfig,
    registry: Mutex<ClientRegistry>,
    stats: Arc<RelayStats>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayState {
    fn decoder(&self) -> FrameDecoder {
        let mut decoder = FrameDecoder::new();
        decoder.set_max_frame_len(self.config.max_frame_len);
        decoder
    }
}

/// Puppetry relay server
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Bind the listening socket.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.listen_addr()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(config.reuse_address)?;
        socket
            .bind(addr)
            .map_err(|e| PuppetryError::Config(format!("Failed to bind relay to {addr}: {e}")))?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            listener,
            state: Arc::new(RelayState {
                config,
                registry: Mutex::new(ClientRegistry::new()),
                stats: Arc::new(RelayStats::new()),
                shutdown_tx,
            }),
        })
    }

    /// Bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.state.stats)
    }

    /// Handle for stopping the relay from another task.
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            shutdown_tx: self.state.shutdown_tx.clone(),
            stats: Arc::clone(&self.state.stats),
        }
    }

    /// Run until upstream closes, upstream fails, or shutdown is requested.
    ///
    /// Returns `Err(Upstream)` when upstream framing or I/O failed. Every
    /// client socket is closed and the listener dropped before returning.
    pub async fn run<R, W>(self, upstream_in: R, upstream_out: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = self.state;
        let mut shutdown_rx = state.shutdown_tx.subscribe();

        match self.listener.local_addr() {
            Ok(addr) => info!(%addr, "Relay listening"),
            Err(e) => warn!(error = %e, "Relay listening on unknown address"),
        }

        let (to_upstream, upstream_queue) = mpsc::channel(state.config.client_queue);
        let mut writer = tokio::spawn(forward_upstream(upstream_out, upstream_queue));
        let accept = tokio::spawn(accept_loop(
            self.listener,
            Arc::clone(&state),
            to_upstream,
            state.shutdown_tx.subscribe(),
        ));

        let mut reader = FrameReader::with_decoder(upstream_in, state.decoder());
        let outcome = tokio::select! {
            result = pump_upstream(&mut reader, &state) => result,
            result = &mut writer => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Upstream sink failed");
                    Err(PuppetryError::Upstream(e.to_string()))
                },
                Err(e) => Err(PuppetryError::Upstream(format!("upstream writer task: {e}"))),
            },
            _ = shutdown_rx.recv() => {
                info!("Relay shutdown requested");
                Ok(())
            },
        };

        let _ = state.shutdown_tx.send(());
        state.registry.lock().await.close();
        writer.abort();
        if let Err(e) = accept.await {
            warn!(error = %e, "Accept task ended abnormally");
        }

        info!(stats = ?state.stats.summary(), "Relay stopped");
        outcome
    }
}

/// Broadcast every upstream frame until upstream ends.
async fn pump_upstream<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    state: &RelayState,
) -> Result<()> {
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => {
                state.stats.record_upstream_frame(frame.len());
                let wire = frame.encode();
                let overflowed = state.registry.lock().await.broadcast(wire);
                for client_id in overflowed {
                    warn!(client_id, "Client queue full, dropping client");
                    state.stats.record_dropped();
                }
            },
            Ok(None) => {
                info!(bytes = reader.bytes_read(), "Upstream closed");
                return Ok(());
            },
            Err(e) => {
                error!(error = %e, "Upstream failed");
                return Err(PuppetryError::Upstream(e.to_string()));
            },
        }
    }
}

/// Write client frames to the upstream sink, one whole frame at a time.
async fn forward_upstream<W: AsyncWrite + Unpin>(
    mut sink: W,
    mut queue: mpsc::Receiver<Frame>,
) -> Result<()> {
    while let Some(frame) = queue.recv().await {
        write_frame(&mut sink, &frame).await?;
    }
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<RelayState>,
    to_upstream: mpsc::Sender<Frame>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut clients = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let registered = state.registry.lock().await.register(state.config.client_queue);
                    let Some((client_id, queue)) = registered else {
                        break;
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(client_id, error = %e, "Failed to set TCP_NODELAY");
                    }
                    state.stats.record_connect();
                    info!(client_id, %peer, "Client connected");
                    clients.spawn(serve_client(
                        client_id,
                        stream,
                        queue,
                        Arc::clone(&state),
                        to_upstream.clone(),
                        state.shutdown_tx.subscribe(),
                    ));
                },
                Err(e) => warn!(error = %e, "Accept failed"),
            },
            Some(_) = clients.join_next(), if !clients.is_empty() => {},
            _ = shutdown_rx.recv() => break,
        }
    }

    drop(listener);
    drop(to_upstream);
    while clients.join_next().await.is_some() {}
}

async fn serve_client(
    client_id: ClientId,
    stream: TcpStream,
    mut queue: ClientQueue,
    state: Arc<RelayState>,
    to_upstream: mpsc::Sender<Frame>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::with_decoder(read_half, state.decoder());

    let result: Result<()> = loop {
        tokio::select! {
            inbound = reader.read_frame() => match inbound {
                Ok(Some(frame)) => {
                    state.stats.record_client_frame();
                    tokio::select! {
                        sent = to_upstream.send(frame) => if sent.is_err() {
                            break Ok(());
                        },
                        _ = &mut queue.evicted => break Ok(()),
                    }
                },
                Ok(None) => break Err(PuppetryError::PeerClosed),
                Err(e) => break Err(e),
            },
            outbound = queue.frames.recv() => match outbound {
                Some(wire) => {
                    tokio::select! {
                        written = write_half.write_all(&wire) => if let Err(e) = written {
                            break Err(e.into());
                        },
                        _ = &mut queue.evicted => break Ok(()),
                    }
                },
                None => break Ok(()),
            },
            _ = &mut queue.evicted => break Ok(()),
            _ = shutdown_rx.recv() => break Ok(()),
        }
    };

    state.registry.lock().await.remove(client_id);
    state.stats.record_disconnect();
    let _ = write_half.shutdown().await;

    match result {
        Ok(()) => debug!(client_id, "Client closed by relay"),
        Err(e) if e.is_peer_closed() => info!(client_id, "Client disconnected"),
        Err(e) => warn!(client_id, error = %e, "Client connection failed"),
    }
}
