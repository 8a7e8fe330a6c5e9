//! Puppetry Stream CLI binary.
//!
//! # Commands
//!
//! - `relay` - Bridge framed stdio to socket clients
//! - `stream` - Stream a synthetic idle pose to a consumer
//! - `config` - Print the effective configuration

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use puppetry::{
    config::Config,
    pose::{JointPose, PoseSnapshot, PoseSource, Quat},
    relay::RelayServer,
    scheduler::{Scheduler, Tick},
    session::{SessionClient, SessionEvent},
    Notation, VERSION,
};

#[derive(Parser)]
#[command(name = "puppetry")]
#[command(version = VERSION)]
#[command(about = "Puppetry Stream - real-time joint transform streaming", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/puppetry/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay framed stdin/stdout to TCP clients
    Relay {
        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Reject frames larger than this many bytes
        #[arg(long)]
        max_frame_len: Option<usize>,
    },

    /// Stream a synthetic idle-sway pose to a consumer
    Stream {
        /// Consumer host
        #[arg(long)]
        host: Option<String>,

        /// Consumer port
        #[arg(short, long)]
        port: Option<u16>,

        /// Payload notation (json, msgpack)
        #[arg(short, long)]
        notation: Option<Notation>,

        /// Sampling interval in milliseconds (clamped to 50-5000)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Keep reconnecting after the consumer goes away
        #[arg(long)]
        reconnect: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Relay {
            port,
            host,
            max_frame_len,
        } => cmd_relay(config, host, port, max_frame_len),
        Commands::Stream {
            host,
            port,
            notation,
            interval_ms,
            reconnect,
            duration,
        } => cmd_stream(
            config,
            host,
            port,
            notation,
            interval_ms,
            reconnect,
            duration,
        ),
        Commands::Config => cmd_config(&config),
    }
}

/// Logs always go to stderr: stdout carries relay frames.
fn init_logging(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_relay(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    max_frame_len: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.relay.host = host;
    }
    if let Some(port) = port {
        config.relay.port = port;
    }
    if max_frame_len.is_some() {
        config.relay.max_frame_len = max_frame_len;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = RelayServer::bind(config.relay).await?;
        let handle = server.handle();
        let mut task = tokio::spawn(server.run(tokio::io::stdin(), tokio::io::stdout()));

        tokio::select! {
            result = &mut task => result??,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down relay");
                handle.shutdown();
                task.await??;
            },
        }
        Ok::<_, anyhow::Error>(())
    })
}

#[allow(clippy::too_many_arguments)]
fn cmd_stream(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    notation: Option<Notation>,
    interval_ms: Option<u64>,
    reconnect: bool,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.session.host = host;
    }
    if let Some(port) = port {
        config.session.port = port;
    }
    if let Some(notation) = notation {
        config.session.notation = notation;
    }
    if reconnect {
        config.session.auto_reconnect = true;
    }
    if let Some(ms) = interval_ms {
        config.transmit.set_interval(Duration::from_millis(ms));
    }
    config.validate()?;

    let mut transmit = config.transmit;
    if transmit.enabled_joints().next().is_none() {
        for joint in IdleSway::JOINTS {
            transmit.enable(joint, false, true);
        }
    }

    let host = config.session.host.clone();
    let port = config.session.port;
    let auto_reconnect = config.session.auto_reconnect;
    let mut client = SessionClient::new(config.session, transmit, IdleSway::new());

    if let Err(e) = client.connect(&host, port) {
        if !auto_reconnect {
            return Err(e).with_context(|| format!("connecting to {host}:{port}"));
        }
        tracing::warn!(error = %e, "Consumer not reachable yet, will retry");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let mut scheduler = Scheduler::new();
        client.schedule(&mut scheduler);
        scheduler.schedule_after(Duration::ZERO, log_events::<IdleSway>);
        if let Some(secs) = duration {
            scheduler.schedule_after(Duration::from_secs(secs), |client: &mut SessionClient<IdleSway>| {
                client.close();
                Tick::Stop
            });
        }

        tokio::select! {
            _ = scheduler.run(&mut client) => {},
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        }
    });

    client.close();
    let stats = client.stats();
    tracing::info!(
        updates_sent = stats.updates_sent,
        updates_suppressed = stats.updates_suppressed,
        bytes_sent = stats.bytes_sent,
        "Stream finished"
    );
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn log_events<P: PoseSource>(client: &mut SessionClient<P>) -> Tick {
    for event in client.drain_events() {
        match event {
            SessionEvent::Activated { pump } => tracing::info!(%pump, "Streaming"),
            SessionEvent::PoseReceived { joints } => {
                tracing::info!(joints = joints.len(), "Consumer sent joint transforms");
            },
            SessionEvent::SkeletonRequested { .. } => {
                tracing::info!("Skeleton requested; synthetic source has none to send");
            },
            SessionEvent::Disconnected => tracing::info!("Consumer disconnected"),
        }
    }
    if client.is_closed() {
        Tick::Stop
    } else {
        Tick::After(Duration::from_millis(100))
    }
}

/// Gentle breathing and head sway for exercising a consumer.
struct IdleSway {
    start: Instant,
}

impl IdleSway {
    const JOINTS: [&'static str; 3] = ["mChest", "mNeck", "mHead"];

    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl PoseSource for IdleSway {
    fn sample(&mut self) -> Option<PoseSnapshot> {
        let t = self.start.elapsed().as_secs_f32();
        let breath = (t * TAU / 4.0).sin();
        let sway = (t * TAU / 7.0).sin();
        let nod = (t * TAU / 5.0).sin();

        Some(
            PoseSnapshot::new()
                .with_joint(
                    "mChest",
                    JointPose::rotation(Quat::from_axis_angle([1.0, 0.0, 0.0], 0.03 * breath)),
                )
                .with_joint(
                    "mNeck",
                    JointPose::rotation(Quat::from_axis_angle([0.0, 0.0, 1.0], 0.10 * sway)),
                )
                .with_joint(
                    "mHead",
                    JointPose::rotation(Quat::from_axis_angle([0.0, 1.0, 0.0], 0.08 * nod)),
                ),
        )
    }
}
