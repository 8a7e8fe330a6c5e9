//! End-to-end relay tests.
//!
//! A relay runs on an ephemeral loopback port with an in-memory duplex pipe
//! standing in for the host's stdio. Clients are real TCP sockets.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use puppetry::codec::{write_frame, Frame, FrameReader};
use puppetry::error::{PuppetryError, Result};
use puppetry::relay::{RelayConfig, RelayHandle, RelayServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Host side of the relay's upstream pipe.
struct Host {
    frames: FrameReader<ReadHalf<DuplexStream>>,
    sink: WriteHalf<DuplexStream>,
}

impl Host {
    async fn emit(&mut self, payload: &'static [u8]) {
        write_frame(&mut self.sink, &Frame::from(payload)).await.unwrap();
    }

    /// Push enough large frames to fill a non-reading client's socket buffers.
    async fn flood(&mut self, frames: usize) {
        let big = Bytes::from(vec![b'x'; 256 * 1024]);
        for _ in 0..frames {
            write_frame(&mut self.sink, &Frame::new(big.clone())).await.unwrap();
        }
    }

    async fn recv(&mut self) -> Frame {
        timeout(WAIT, self.frames.read_frame())
            .await
            .expect("timed out waiting for upstream frame")
            .unwrap()
            .expect("relay closed upstream")
    }
}

struct Relay {
    addr: SocketAddr,
    handle: RelayHandle,
    task: JoinHandle<Result<()>>,
}

impl Relay {
    async fn wait_for_clients(&self, n: u64) {
        timeout(WAIT, async {
            while self.handle.stats().connections_active() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("clients never registered");
    }
}

async fn start_relay(config: RelayConfig) -> (Relay, Host) {
    let server = RelayServer::bind(config.with_port(0)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();

    let (relay_side, host_side) = tokio::io::duplex(64 * 1024);
    let (relay_in, relay_out) = tokio::io::split(relay_side);
    let (host_in, host_out) = tokio::io::split(host_side);

    let task = tokio::spawn(server.run(relay_in, relay_out));
    (
        Relay { addr, handle, task },
        Host {
            frames: FrameReader::new(host_in),
            sink: host_out,
        },
    )
}

struct Client {
    frames: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            frames: FrameReader::new(read),
            writer,
        }
    }

    async fn recv(&mut self) -> Vec<u8> {
        timeout(WAIT, self.frames.read_frame())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .expect("relay closed the connection")
            .into_payload()
            .to_vec()
    }

    async fn send(&mut self, payload: &'static [u8]) {
        write_frame(&mut self.writer, &Frame::from(payload)).await.unwrap();
    }

    /// Wait for the relay to close this connection.
    async fn closed(&mut self) -> bool {
        match timeout(WAIT, self.frames.read_frame()).await {
            Ok(Ok(None)) | Ok(Err(_)) => true,
            Ok(Ok(Some(_))) | Err(_) => false,
        }
    }
}

/// Read and discard until the relay closes the connection.
async fn drain_until_closed(stream: &mut TcpStream) -> bool {
    let mut buf = vec![0u8; 64 * 1024];
    timeout(WAIT, async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {},
            }
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_late_joiner_receives_initial_frame_first() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    host.emit(b"F1").await;

    let mut a = Client::connect(relay.addr).await;
    assert_eq!(a.recv().await, b"F1");

    let mut b = Client::connect(relay.addr).await;
    relay.wait_for_clients(2).await;

    host.emit(b"F2").await;

    assert_eq!(a.recv().await, b"F2");
    assert_eq!(b.recv().await, b"F1");
    assert_eq!(b.recv().await, b"F2");
}

#[tokio::test]
async fn test_client_connecting_long_after_first_frame_gets_it() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    host.emit(b"initial").await;
    host.emit(b"second").await;
    host.emit(b"third").await;
    timeout(WAIT, async {
        while relay.handle.stats().upstream_frames() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut late = Client::connect(relay.addr).await;
    assert_eq!(late.recv().await, b"initial");

    host.emit(b"fourth").await;
    assert_eq!(late.recv().await, b"fourth");
}

#[tokio::test]
async fn test_fault_isolation() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    let mut a = Client::connect(relay.addr).await;
    let b = Client::connect(relay.addr).await;
    let mut c = Client::connect(relay.addr).await;
    relay.wait_for_clients(3).await;

    drop(b);
    relay.wait_for_clients(2).await;

    host.emit(b"after-drop").await;
    host.emit(b"again").await;

    assert_eq!(a.recv().await, b"after-drop");
    assert_eq!(c.recv().await, b"after-drop");
    assert_eq!(a.recv().await, b"again");
    assert_eq!(c.recv().await, b"again");
    assert_eq!(relay.handle.stats().connections_total(), 3);
}

#[tokio::test]
async fn test_upstream_truncation_shuts_everything_down() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    let mut a = Client::connect(relay.addr).await;
    let mut b = Client::connect(relay.addr).await;
    relay.wait_for_clients(2).await;

    host.sink.write_all(b"12:abc").await.unwrap();
    host.sink.shutdown().await.unwrap();

    let outcome = timeout(WAIT, relay.task).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(PuppetryError::Upstream(_))));

    assert!(a.closed().await);
    assert!(b.closed().await);
    assert!(TcpStream::connect(relay.addr).await.is_err());
}

#[tokio::test]
async fn test_upstream_eof_closes_clients() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    let mut a = Client::connect(relay.addr).await;
    relay.wait_for_clients(1).await;

    host.emit(b"last").await;
    assert_eq!(a.recv().await, b"last");
    host.sink.shutdown().await.unwrap();

    timeout(WAIT, relay.task).await.unwrap().unwrap().unwrap();
    assert!(a.closed().await);
}

#[tokio::test]
async fn test_client_frames_forwarded_upstream_whole() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    let mut a = Client::connect(relay.addr).await;
    let mut b = Client::connect(relay.addr).await;
    relay.wait_for_clients(2).await;

    a.send(b"{\"from\":\"a\"}").await;
    b.send(b"{\"from\":\"b\"}").await;
    a.send(b"{\"from\":\"a2\"}").await;

    let mut received = HashSet::new();
    for _ in 0..3 {
        received.insert(host.recv().await.into_payload().to_vec());
    }

    let expected: HashSet<Vec<u8>> = [
        b"{\"from\":\"a\"}".to_vec(),
        b"{\"from\":\"b\"}".to_vec(),
        b"{\"from\":\"a2\"}".to_vec(),
    ]
    .into_iter()
    .collect();
    assert_eq!(received, expected);
    assert_eq!(relay.handle.stats().client_frames(), 3);
}

#[tokio::test]
async fn test_client_order_preserved_upstream() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    let mut a = Client::connect(relay.addr).await;
    relay.wait_for_clients(1).await;

    a.send(b"one").await;
    a.send(b"two").await;
    a.send(b"three").await;

    assert_eq!(&host.recv().await.payload()[..], b"one");
    assert_eq!(&host.recv().await.payload()[..], b"two");
    assert_eq!(&host.recv().await.payload()[..], b"three");
}

#[tokio::test]
async fn test_oversized_client_frame_only_drops_that_client() {
    let (relay, mut host) = start_relay(RelayConfig::default().with_max_frame_len(16)).await;

    let mut good = Client::connect(relay.addr).await;
    let mut bad = Client::connect(relay.addr).await;
    relay.wait_for_clients(2).await;

    bad.writer.write_all(b"1000:").await.unwrap();
    assert!(bad.closed().await);
    relay.wait_for_clients(1).await;

    host.emit(b"still here").await;
    assert_eq!(good.recv().await, b"still here");
}

#[tokio::test]
async fn test_shutdown_handle_stops_relay() {
    let (relay, _host) = start_relay(RelayConfig::default()).await;

    let mut a = Client::connect(relay.addr).await;
    relay.wait_for_clients(1).await;

    relay.handle.shutdown();
    timeout(WAIT, relay.task).await.unwrap().unwrap().unwrap();
    assert!(a.closed().await);
}

#[tokio::test]
async fn test_non_reading_client_does_not_stall_shutdown() {
    let (relay, mut host) = start_relay(RelayConfig::default()).await;

    let mut stalled = TcpStream::connect(relay.addr).await.unwrap();
    relay.wait_for_clients(1).await;

    host.flood(64).await;
    host.sink.write_all(b"99:abc").await.unwrap();
    host.sink.shutdown().await.unwrap();

    let outcome = timeout(WAIT, relay.task)
        .await
        .expect("relay did not stop")
        .unwrap();
    assert!(matches!(outcome, Err(PuppetryError::Upstream(_))));
    assert_eq!(relay.handle.stats().connections_active(), 0);
    assert!(drain_until_closed(&mut stalled).await);
}

#[tokio::test]
async fn test_overflowed_client_is_disconnected() {
    let (relay, mut host) = start_relay(RelayConfig::default().with_client_queue(4)).await;

    let mut stalled = TcpStream::connect(relay.addr).await.unwrap();
    relay.wait_for_clients(1).await;

    host.flood(128).await;

    relay.wait_for_clients(0).await;
    assert_eq!(relay.handle.stats().clients_dropped(), 1);
    assert!(drain_until_closed(&mut stalled).await);
}
