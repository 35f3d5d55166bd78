//! camview - headless camera stream watcher
//!
//! This binary:
//! 1. Negotiates a transport for one camera (or uses the one given)
//! 2. Keeps the stream alive, reconnecting at a fixed interval
//! 3. Prints connection and motion events as they happen
//! 4. Logs stream statistics periodically until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use camview::{
    CameraEndpoint, Credentials, EventStream, HeadlessSurface, HttpFetcher, JpegDecoder, Player,
    PlayerConfig, PlayerEvent, SessionState, TransportPreference,
};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watch an IP camera and report connection and motion events"
)]
struct Args {
    /// Camera base URL. `http://` is assumed when no scheme is given.
    url: String,

    /// Camera username.
    #[arg(long, env = "CAMVIEW_USERNAME")]
    username: Option<String>,

    /// Camera password.
    #[arg(long, env = "CAMVIEW_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Transport: auto, hls, rtsp, mjpeg or jpeg.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    transport: String,

    /// Snapshot rate for the jpeg transport.
    #[arg(long)]
    fps: Option<u32>,

    /// Reconnect delay in milliseconds (0 disables reconnecting).
    #[arg(long, value_name = "MS")]
    reconnect_ms: Option<u64>,

    /// Enable motion detection.
    #[arg(long)]
    motion: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = PlayerConfig::load()?;
    if let Some(fps) = args.fps {
        config.jpeg.fps = fps;
    }
    if let Some(ms) = args.reconnect_ms {
        config.reconnect_interval = Duration::from_millis(ms);
    }
    config.motion.enabled |= args.motion;
    config.validate()?;

    let preference: TransportPreference = args.transport.parse()?;
    let mut endpoint = CameraEndpoint::new(&args.url)?.with_preferred_transport(preference);
    if let (Some(username), Some(password)) = (args.username, args.password) {
        endpoint = endpoint.with_credentials(Credentials::new(username, password));
    }

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("install ctrl-c handler")?;

    let reconnect = config.reconnect_interval;
    let (mut player, mut events) = Player::builder(config)
        .fetcher(Arc::new(HttpFetcher::new()))
        .decoder(Arc::new(JpegDecoder))
        .surface(HeadlessSurface::default())
        .build()?;
    log::info!("watching {} ({})", endpoint.redacted(), preference);

    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
    'watch: loop {
        let negotiated = tokio::select! {
            result = player.connect(endpoint.clone()) => result,
            _ = stop_rx.recv() => break 'watch,
        };
        print_events(&mut events);
        if let Err(err) = negotiated {
            if reconnect.is_zero() {
                return Err(anyhow!(err));
            }
            log::warn!("{}; retrying in {} ms", err, reconnect.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(reconnect) => continue 'watch,
                _ = stop_rx.recv() => break 'watch,
            }
        }

        loop {
            tokio::select! {
                state = player.step() => {
                    print_events(&mut events);
                    if state == SessionState::Disconnected {
                        if reconnect.is_zero() {
                            break 'watch;
                        }
                        tokio::time::sleep(reconnect).await;
                        continue 'watch;
                    }
                }
                _ = stats_tick.tick() => {
                    if let Some(stats) = player.stats() {
                        log::info!(
                            "{} frames, {:.1} fps, resolution {:?}, generation {}",
                            stats.frames,
                            stats.fps,
                            stats.resolution,
                            stats.generation
                        );
                    }
                }
                _ = stop_rx.recv() => break 'watch,
            }
        }
    }

    player.disconnect();
    print_events(&mut events);
    log::info!("stopped");
    Ok(())
}

fn print_events(events: &mut EventStream) {
    for event in events.drain() {
        match event {
            PlayerEvent::Connected(transport) => println!("connected via {}", transport),
            PlayerEvent::Disconnected => println!("disconnected"),
            PlayerEvent::Error {
                message,
                recoverable,
            } => {
                let kind = if recoverable { "error" } else { "fatal" };
                println!("{}: {}", kind, message);
            }
            PlayerEvent::MotionStarted => println!("motion started"),
            PlayerEvent::MotionStopped => println!("motion stopped"),
            PlayerEvent::Reconnecting { transport, delay } => {
                println!("reconnecting via {} in {} ms", transport, delay.as_millis())
            }
        }
    }
}
