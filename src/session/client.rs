//! Session client state machine.
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──> AwaitingHandshake
//!       ^                                          │ first inbound message
//!       │ I/O error / EOF / disconnect()           v
//!       └──────────────────────────────────────  Active
//! ```
//!
//! The client never blocks inside a tick. The socket is non-blocking;
//! "would block" means "nothing this tick". Outbound frames are appended
//! whole to an outbound buffer and flushed as far as the socket allows, so
//! a partial write never leaves half a frame in flight from the caller's
//! point of view.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Instant;

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::state::{SessionEvent, SessionState, SessionStats};
use crate::codec::{encode_payload_into, Frame, FrameDecoder};
use crate::error::{PuppetryError, Result};
use crate::pose::{PoseDiffer, PoseSource, TransmitConfig};
use crate::protocol::{
    Command, ControlRequest, Envelope, CONTROL_PUMP, LISTENER_DEST, RESERVED_LISTENER,
};
use crate::scheduler::{Scheduler, TaskHandle, Tick};

const READ_CHUNK: usize = 4 * 1024;

/// Handles of the two periodic session tasks.
#[derive(Debug, Clone)]
pub struct SessionTasks {
    /// Network poll task
    pub poll: TaskHandle,
    /// Pose sample task
    pub sample: TaskHandle,
}

impl SessionTasks {
    /// Cancel both tasks.
    pub fn cancel(&self) {
        self.poll.cancel();
        self.sample.cancel();
    }
}

/// Streams pose updates from a [`PoseSource`] to a consumer.
pub struct SessionClient<P> {
    config: SessionConfig,
    transmit: TransmitConfig,
    source: P,
    state: SessionState,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    outbound: BytesMut,
    /// Unwritten byte count of each frame still in `outbound`
    pending_frames: VecDeque<usize>,
    pump: Option<String>,
    differ: PoseDiffer,
    next_reqid: i64,
    closed: bool,
    last_attempt: Option<Instant>,
    events: VecDeque<SessionEvent>,
    stats: SessionStats,
}

impl<P: PoseSource> SessionClient<P> {
    /// Create a disconnected client.
    pub fn new(config: SessionConfig, transmit: TransmitConfig, source: P) -> Self {
        let differ = PoseDiffer::with_heartbeat(config.heartbeat());
        Self {
            config,
            transmit,
            source,
            state: SessionState::Disconnected,
            stream: None,
            decoder: FrameDecoder::new(),
            outbound: BytesMut::new(),
            pending_frames: VecDeque::new(),
            pump: None,
            differ,
            next_reqid: 1,
            closed: false,
            last_attempt: None,
            events: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated pump, once active.
    pub fn pump(&self) -> Option<&str> {
        self.pump.as_deref()
    }

    /// Whether [`SessionClient::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Counters.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Transmit configuration.
    pub fn transmit(&self) -> &TransmitConfig {
        &self.transmit
    }

    /// Mutable access to the transmit configuration.
    ///
    /// Interval changes take effect when the sample task next reschedules.
    pub fn transmit_mut(&mut self) -> &mut TransmitConfig {
        &mut self.transmit
    }

    /// Mutable access to the pose source.
    pub fn source_mut(&mut self) -> &mut P {
        &mut self.source
    }

    /// Take all pending events.
    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.events.drain(..)
    }

    /// Connect to the consumer at `host:port`.
    ///
    /// An existing connection is closed first. On success the client waits
    /// for the remote's first message.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.closed {
            return Err(PuppetryError::SessionClosed);
        }
        self.config.clone().with_target(host, port).validate()?;
        if self.stream.is_some() {
            self.disconnect();
        }

        self.config.host = host.to_string();
        self.config.port = port;
        self.state = SessionState::Connecting;
        self.last_attempt = Some(Instant::now());

        match self.open_stream(host, port) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.decoder.clear();
                self.outbound.clear();
                self.pending_frames.clear();
                self.pump = None;
                self.state = SessionState::AwaitingHandshake;
                self.stats.connects += 1;
                info!(host, port, "Session connected, awaiting handshake");
                Ok(())
            },
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            },
        }
    }

    fn open_stream(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| PuppetryError::Config(format!("cannot resolve {host}:{port}")))?;
        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout())?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.config.read_timeout()))?;
        stream.set_nonblocking(true)?;
        Ok(stream)
    }

    /// Close the socket and return to `Disconnected`.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            self.stats.disconnects += 1;
            self.events.push_back(SessionEvent::Disconnected);
            info!(pump = ?self.pump, "Session disconnected");
        }
        self.decoder.clear();
        self.outbound.clear();
        self.pending_frames.clear();
        self.pump = None;
        self.state = SessionState::Disconnected;
    }

    /// Shut down for good: no reconnects, tasks retire on their next run.
    pub fn close(&mut self) {
        self.closed = true;
        self.disconnect();
    }

    /// Send a command body on the negotiated pump.
    pub fn send(&mut self, data: Value) -> Result<()> {
        if self.closed {
            return Err(PuppetryError::SessionClosed);
        }
        let pump = match (&self.state, &self.pump) {
            (SessionState::Active, Some(pump)) => pump.clone(),
            _ => return Err(PuppetryError::NotConnected),
        };
        self.queue(&pump, data)?;
        self.flush_outbound()
    }

    /// Register the poll and sample tasks on `scheduler`.
    pub fn schedule(&self, scheduler: &mut Scheduler<Self>) -> SessionTasks
    where
        P: 'static,
    {
        let poll = scheduler.schedule_after(std::time::Duration::ZERO, Self::poll_tick);
        let sample = scheduler.schedule_after(self.transmit.interval(), Self::sample_tick);
        SessionTasks { poll, sample }
    }

    /// Network poll task body.
    pub fn poll_tick(&mut self) -> Tick {
        if self.closed {
            return Tick::Stop;
        }
        if self.stream.is_some() {
            if let Err(e) = self.poll_network() {
                self.handle_error(e);
            }
        } else {
            self.maybe_reconnect();
        }
        Tick::After(self.config.poll_interval())
    }

    /// Pose sample task body.
    pub fn sample_tick(&mut self) -> Tick {
        if self.closed {
            return Tick::Stop;
        }
        if self.state == SessionState::Active {
            if let Err(e) = self.sample_and_send(Instant::now()) {
                self.handle_error(e);
            }
        }
        Tick::After(self.transmit.interval())
    }

    fn maybe_reconnect(&mut self) {
        if !self.config.auto_reconnect {
            return;
        }
        let due = self
            .last_attempt
            .map_or(true, |at| at.elapsed() >= self.config.reconnect_delay());
        if !due {
            return;
        }
        let host = self.config.host.clone();
        let port = self.config.port;
        if let Err(e) = self.connect(&host, port) {
            debug!(host = %host, port, error = %e, "Reconnect attempt failed");
        }
    }

    fn poll_network(&mut self) -> Result<()> {
        self.flush_outbound()?;
        let read = self.read_available();
        self.ingest(read)?;
        self.flush_outbound()
    }

    /// Dispatch the frames that fully arrived, then surface the read outcome.
    fn ingest(&mut self, read: Result<bool>) -> Result<()> {
        self.dispatch_frames()?;
        if read? {
            self.decoder.finish()?;
            return Err(PuppetryError::PeerClosed);
        }
        Ok(())
    }

    /// Drain readable bytes into the decoder. Returns true on EOF.
    fn read_available(&mut self) -> Result<bool> {
        let stream = self.stream.as_mut().ok_or(PuppetryError::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    self.decoder.push(&chunk[..n]);
                    self.stats.bytes_received += n as u64;
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch_frames(&mut self) -> Result<()> {
        while let Some(frame) = self.decoder.next_frame()? {
            self.stats.frames_received += 1;
            if let Err(e) = self.handle_frame(&frame) {
                if e.is_connection_fatal() {
                    return Err(e);
                }
                warn!(error = %e, len = frame.len(), "Dropping undecodable message");
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<()> {
        let value = self.config.notation.decode_value(frame.payload())?;
        let envelope = Envelope::from_value(value)?;
        match self.state {
            SessionState::AwaitingHandshake => self.complete_handshake(&envelope),
            SessionState::Active => {
                self.dispatch(envelope);
                Ok(())
            },
            SessionState::Disconnected | SessionState::Connecting => Ok(()),
        }
    }

    fn complete_handshake(&mut self, first: &Envelope) -> Result<()> {
        let Some(pump) = first.declared_channel().map(str::to_string) else {
            debug!("First message declares no channel, still awaiting handshake");
            return Ok(());
        };

        let reqid = self.take_reqid();
        let stop = ControlRequest::stop_listen(reqid, &pump, RESERVED_LISTENER);
        self.queue(CONTROL_PUMP, stop.to_value())?;

        let reqid = self.take_reqid();
        let listen = ControlRequest::listen(reqid, &pump, RESERVED_LISTENER, LISTENER_DEST);
        self.queue(CONTROL_PUMP, listen.to_value())?;

        self.queue(&pump, Command::empty_set_body())?;

        if self.config.reset_on_activate {
            self.differ.reset();
        }
        self.state = SessionState::Active;
        self.pump = Some(pump.clone());
        info!(pump = %pump, "Session active");
        self.events.push_back(SessionEvent::Activated { pump });
        Ok(())
    }

    fn dispatch(&mut self, envelope: Envelope) {
        match envelope.command() {
            Command::Set(joints) | Command::Move(joints) => {
                self.events.push_back(SessionEvent::PoseReceived { joints });
            },
            Command::SendSkeleton => {
                self.events.push_back(SessionEvent::SkeletonRequested {
                    request: envelope.data,
                });
            },
            other @ Command::Unrecognized(_) => {
                debug!(pump = %envelope.pump, command = other.name(), "Ignoring unrecognized command");
            },
        }
    }

    fn sample_and_send(&mut self, now: Instant) -> Result<()> {
        let Some(snapshot) = self.source.sample() else {
            return Ok(());
        };
        let diff = self.differ.diff(&snapshot, &self.transmit, now);
        if !diff.should_send {
            self.stats.updates_suppressed += 1;
            return Ok(());
        }
        if diff.updates.is_empty() {
            // Nothing to send, but joints that dropped out leave the baseline.
            self.differ.commit(diff.updates, now);
            self.stats.updates_suppressed += 1;
            return Ok(());
        }

        let pump = self.pump.clone().ok_or(PuppetryError::NotConnected)?;
        self.queue(&pump, Command::set_body(&diff.updates))?;
        self.differ.commit(diff.updates, now);
        self.stats.updates_sent += 1;
        self.flush_outbound()
    }

    fn take_reqid(&mut self) -> i64 {
        let id = self.next_reqid;
        self.next_reqid += 1;
        id
    }

    /// Encode an envelope and append it to the outbound buffer as one frame.
    fn queue(&mut self, pump: &str, data: Value) -> Result<()> {
        let envelope = Envelope::new(pump, data);
        let payload = self.config.notation.encode(&envelope)?;
        let before = self.outbound.len();
        encode_payload_into(&payload, &mut self.outbound);
        self.pending_frames.push_back(self.outbound.len() - before);
        Ok(())
    }

    fn flush_outbound(&mut self) -> Result<()> {
        while !self.outbound.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(());
            };
            match stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.outbound.advance(n);
                    self.stats.bytes_sent += n as u64;
                    self.complete_frames(n);
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Count frames whose last byte went out in a write of `written` bytes.
    fn complete_frames(&mut self, mut written: usize) {
        while written > 0 {
            let Some(front) = self.pending_frames.front_mut() else {
                break;
            };
            if written >= *front {
                written -= *front;
                self.pending_frames.pop_front();
                self.stats.frames_sent += 1;
            } else {
                *front -= written;
                break;
            }
        }
    }

    fn handle_error(&mut self, err: PuppetryError) {
        if err.is_would_block() {
            return;
        }
        if err.is_peer_closed() {
            info!("Consumer closed the connection");
        } else if err.is_connection_fatal() {
            warn!(error = %err, "Session connection failed");
        } else {
            warn!(error = %err, "Session error");
            return;
        }
        self.disconnect();
    }
}

impl<P> std::fmt::Debug for SessionClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("target", &self.config.target())
            .field("state", &self.state)
            .field("pump", &self.pump)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use super::*;
    use crate::codec::encode_payload;
    use crate::pose::{JointPose, PoseSnapshot, Quat};

    type NoPose = fn() -> Option<PoseSnapshot>;

    fn idle() -> Option<PoseSnapshot> {
        None
    }

    fn client() -> SessionClient<NoPose> {
        SessionClient::new(SessionConfig::default(), TransmitConfig::new(), idle as NoPose)
    }

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn poll_until<P: PoseSource>(client: &mut SessionClient<P>, done: impl Fn(&SessionClient<P>) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(client) && Instant::now() < deadline {
            client.poll_tick();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn hello(pump: &str) -> Vec<u8> {
        let env = Envelope::new("", serde_json::json!({ "command": pump }));
        encode_payload(&serde_json::to_vec(&env).unwrap()).to_vec()
    }

    #[test]
    fn test_starts_disconnected() {
        let client = client();
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(client.pump().is_none());
        assert_eq!(client.stats(), SessionStats::default());
    }

    #[test]
    fn test_connect_refused_stays_disconnected() {
        let mut client = client();
        let port = free_port();
        assert!(client.connect("127.0.0.1", port).is_err());
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_privileged_port_rejected() {
        let mut client = client();
        let err = client.connect("127.0.0.1", 80).unwrap_err();
        assert!(matches!(err, PuppetryError::Config(_)));
    }

    #[test]
    fn test_zero_read_timeout_rejected_before_connecting() {
        let config = SessionConfig {
            read_timeout_ms: 0,
            ..SessionConfig::default()
        };
        let mut client = SessionClient::new(config, TransmitConfig::new(), idle as NoPose);
        let err = client.connect("127.0.0.1", free_port()).unwrap_err();
        assert!(matches!(err, PuppetryError::Config(_)));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_send_requires_active() {
        let mut client = client();
        let err = client.send(serde_json::json!({"command": "set"})).unwrap_err();
        assert!(matches!(err, PuppetryError::NotConnected));
    }

    #[test]
    fn test_close_is_terminal() {
        let mut client = client();
        client.close();
        assert!(client.is_closed());
        assert_eq!(client.poll_tick(), Tick::Stop);
        assert_eq!(client.sample_tick(), Tick::Stop);
        assert!(matches!(
            client.connect("127.0.0.1", 5000),
            Err(PuppetryError::SessionClosed)
        ));
    }

    #[test]
    fn test_sample_tick_reschedules_at_interval() {
        let mut client = client();
        client.transmit_mut().set_interval(Duration::from_millis(250));
        assert_eq!(client.sample_tick(), Tick::After(Duration::from_millis(250)));
        assert_eq!(client.poll_tick(), Tick::After(Duration::from_millis(10)));
    }

    #[test]
    fn test_handshake_then_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = client();
        client.connect("127.0.0.1", port).unwrap();
        assert_eq!(client.state(), SessionState::AwaitingHandshake);

        let (mut peer, _) = listener.accept().unwrap();
        peer.write_all(&hello("puppetry")).unwrap();

        poll_until(&mut client, |c| c.state() == SessionState::Active);
        assert_eq!(client.pump(), Some("puppetry"));
        assert_eq!(client.stats().frames_sent, 3);

        drop(peer);
        poll_until(&mut client, |c| c.state() == SessionState::Disconnected);
        assert_eq!(client.state(), SessionState::Disconnected);

        let events: Vec<_> = client.drain_events().collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::Activated {
                    pump: "puppetry".into()
                },
                SessionEvent::Disconnected,
            ]
        );
    }

    #[test]
    fn test_auto_reconnect_after_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = SessionConfig::default().with_auto_reconnect(Duration::ZERO);
        let source = || {
            Some(PoseSnapshot::new().with_joint("mHead", JointPose::rotation(Quat::IDENTITY)))
        };
        let mut client = SessionClient::new(config, TransmitConfig::new(), source);
        client.connect("127.0.0.1", port).unwrap();
        let (peer, _) = listener.accept().unwrap();
        drop(peer);

        poll_until(&mut client, |c| c.stats().disconnects == 1);
        poll_until(&mut client, |c| c.stats().connects == 2);
        assert_eq!(client.state(), SessionState::AwaitingHandshake);
    }

    #[test]
    fn test_frames_before_read_error_are_dispatched() {
        let mut client = client();
        client.state = SessionState::AwaitingHandshake;
        client.decoder.push(&hello("puppetry"));

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let err = client.ingest(Err(reset.into())).unwrap_err();
        assert!(matches!(err, PuppetryError::Io(_)));
        assert_eq!(client.state(), SessionState::Active);
        assert_eq!(client.pump(), Some("puppetry"));
    }

    #[test]
    fn test_frames_sent_counts_only_written_frames() {
        let mut client = client();
        client.state = SessionState::Active;
        client.pump = Some("puppetry".into());
        client.send(serde_json::json!({"command": "set"})).unwrap();
        client.send(serde_json::json!({"command": "set"})).unwrap();
        assert_eq!(client.stats().frames_sent, 0);

        let first = client.pending_frames[0];
        client.complete_frames(first + 1);
        assert_eq!(client.stats().frames_sent, 1);
        assert_eq!(client.pending_frames.len(), 1);

        client.disconnect();
        assert_eq!(client.stats().frames_sent, 1);
        assert!(client.pending_frames.is_empty());
    }

    #[test]
    fn test_disabled_joint_leaves_baseline() {
        let source = || {
            Some(
                PoseSnapshot::new()
                    .with_joint("mHead", JointPose::rotation(Quat::IDENTITY))
                    .with_joint("mNeck", JointPose::rotation(Quat::IDENTITY)),
            )
        };
        let transmit = TransmitConfig::new()
            .with_joint("mHead", false, true)
            .with_joint("mNeck", false, true);
        let mut client = SessionClient::new(SessionConfig::default(), transmit, source);
        client.state = SessionState::Active;
        client.pump = Some("puppetry".into());
        let t0 = Instant::now();

        client.sample_and_send(t0).unwrap();
        assert_eq!(client.stats().updates_sent, 1);

        client.transmit_mut().disable("mNeck");
        client.sample_and_send(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(client.stats().updates_sent, 2);
        assert!(!client.differ.last().contains_key("mNeck"));

        client.transmit_mut().disable("mHead");
        client.sample_and_send(t0 + Duration::from_millis(20)).unwrap();
        assert_eq!(client.stats().updates_sent, 2);
        assert!(client.differ.last().is_empty());

        client.sample_and_send(t0 + Duration::from_millis(30)).unwrap();
        assert_eq!(client.stats().updates_suppressed, 2);
    }
}
