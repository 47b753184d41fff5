//! carlink-bridge — entry point.
//!
//! Runs the hotplug monitor as a daemon: whenever a dongle attaches it
//! opens the USB link, configures a session, and pumps inbound events.
//! With `--transcoder` the H.264 stream is piped into an external
//! process (ffmpeg or similar) reading from stdin.
//!
//! ```text
//! carlink-bridge                                  Run with defaults (800x480 @ 30)
//! carlink-bridge --width 1280 --height 720        Custom geometry
//! carlink-bridge --transcoder "ffmpeg -f h264 -i pipe:0 -f null -"
//! RUST_LOG=carlink_core=debug carlink-bridge      Verbose wire logging
//! ```

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use carlink_core::protocol::{audio_format, MediaType, Message};
use carlink_core::{
    DongleConfig, FrameBuffer, HotplugMonitor, LinkError, MicSource, Session, StateManager,
    UsbTransport, WifiBand,
};

/// The external decoder needs a moment to initialise before the first
/// access unit; earlier writes come back as "invalid data" errors.
const TRANSCODER_WARMUP: Duration = Duration::from_millis(200);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "carlink-bridge", about = "CarPlay/Android-Auto dongle bridge daemon")]
struct Cli {
    /// Projected display width in pixels.
    #[arg(long, default_value_t = 800)]
    width: i32,

    /// Projected display height in pixels.
    #[arg(long, default_value_t = 480)]
    height: i32,

    /// Video frame rate requested from the phone.
    #[arg(long, default_value_t = 30)]
    fps: i32,

    /// Display density reported to the dongle.
    #[arg(long, default_value_t = 140)]
    dpi: i32,

    /// WiFi band the dongle advertises: "2.4ghz" or "5ghz".
    #[arg(long, default_value = "5ghz")]
    wifi: String,

    /// Microphone routing: "os" or "box".
    #[arg(long, default_value = "os")]
    mic: String,

    /// Start with the dark UI theme.
    #[arg(long)]
    night_mode: bool,

    /// Box name shown during pairing.
    #[arg(long, default_value = "goCarPlay")]
    box_name: String,

    /// Disable auto-enabling Android work mode on Android plug events.
    #[arg(long)]
    no_auto_android: bool,

    /// External command consuming raw H.264 on stdin.
    #[arg(long)]
    transcoder: Option<String>,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

impl Cli {
    fn dongle_config(&self) -> anyhow::Result<DongleConfig> {
        let wifi_type = match self.wifi.as_str() {
            "2.4ghz" => WifiBand::Band24,
            "5ghz" => WifiBand::Band5,
            other => anyhow::bail!("unknown wifi band {other:?} (use 2.4ghz or 5ghz)"),
        };
        let mic_type = match self.mic.as_str() {
            "os" => MicSource::Os,
            "box" => MicSource::Box,
            other => anyhow::bail!("unknown mic source {other:?} (use os or box)"),
        };
        Ok(DongleConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
            dpi: self.dpi,
            night_mode: self.night_mode,
            box_name: self.box_name.clone(),
            auto_detect_android_mode: !self.no_auto_android,
            wifi_type,
            mic_type,
            ..Default::default()
        })
    }
}

// ── Main ─────────────────────────────────────────────────────────

type ActiveSession = Arc<Mutex<Option<Arc<Session<UsbTransport>>>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("carlink-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "display {}x{} @ {} fps, dpi {}",
        cli.width, cli.height, cli.fps, cli.dpi
    );

    let config = cli.dongle_config()?;
    let transcoder = cli.transcoder.clone();

    let state = Arc::new(StateManager::new());
    let active: ActiveSession = Arc::new(Mutex::new(None));

    // Log link state transitions.
    {
        let mut observer = state.subscribe();
        tokio::spawn(async move {
            while let Some(new_state) = observer.changed().await {
                info!("link state: {new_state}");
            }
        });
    }

    let monitor = {
        let connect_active = active.clone();
        let disconnect_active = active.clone();
        HotplugMonitor::new(state.clone())
            .on_connect(move || {
                let config = config.clone();
                let transcoder = transcoder.clone();
                let active = connect_active.clone();
                async move { connect(config, transcoder, active).await }
            })
            .on_disconnect(move || {
                let active = disconnect_active.clone();
                async move { disconnect(active).await }
            })
    };

    monitor.start();
    // Pick up a dongle that was plugged in before we launched.
    monitor.trigger_connection_attempt();

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");

    monitor.stop().await;
    disconnect(active).await;
    Ok(())
}

// ── Connection lifecycle ─────────────────────────────────────────

async fn connect(
    config: DongleConfig,
    transcoder: Option<String>,
    active: ActiveSession,
) -> Result<(), LinkError> {
    // Presence was confirmed by the monitor; no retry budget here.
    let transport = UsbTransport::open_once().await?;
    let session = Session::start(transport, config).await?;

    // Inbound pump.
    {
        let session = session.clone();
        tokio::spawn(async move {
            let result = session.run(on_message, |err| warn!("link error: {err}")).await;
            match result {
                Err(err) if err.is_cancelled() => debug!("dispatch loop cancelled"),
                Err(err) => warn!("dispatch loop ended: {err}"),
                Ok(()) => {}
            }
        });
    }

    // Optional transcoder feed.
    if let Some(command) = transcoder {
        let video = session.video();
        let cancel = session.cancellation_token();
        tokio::spawn(async move {
            if let Err(err) = feed_transcoder(&command, video, cancel).await {
                warn!("transcoder pipeline ended: {err:#}");
            }
        });
    }

    *active.lock().await = Some(session);
    Ok(())
}

async fn disconnect(active: ActiveSession) {
    if let Some(session) = active.lock().await.take() {
        session.shutdown().await;
    }
}

/// Inbound event logging; the session already routed video frames into
/// the latest-wins buffer before we see them.
fn on_message(message: Message) {
    match message {
        Message::Video(_) => {}
        Message::Audio(audio) => {
            if let Some(format) = audio_format(audio.decode_type) {
                debug!(
                    "audio: type {} ({} Hz, {} ch)",
                    audio.decode_type, format.frequency, format.channels
                );
            }
        }
        Message::Media(media) => match media.media_type {
            MediaType::Data => info!(
                "media info: {}",
                String::from_utf8_lossy(&media.info).trim_end_matches('\0')
            ),
            MediaType::AlbumCover => info!("album cover: {} bytes", media.info.len()),
        },
        Message::BoxSettings(settings) => {
            info!("box settings: {}", String::from_utf8_lossy(&settings))
        }
        Message::Unknown { kind, data } => {
            debug!("unknown message kind {kind:#x} ({} bytes)", data.len())
        }
        // Plugged/Unplugged/Phase are logged by the session itself.
        other => debug!("inbound: {other:?}"),
    }
}

// ── Transcoder feed ──────────────────────────────────────────────

/// Spawn the external H.264 consumer and feed it the latest-wins
/// stream until the session ends.
async fn feed_transcoder(
    command: &str,
    video: Arc<FrameBuffer>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts.next().context("empty transcoder command")?;

    let mut child = tokio::process::Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn transcoder {program:?}"))?;
    let mut stdin = child.stdin.take().context("transcoder stdin unavailable")?;

    info!("transcoder started: {command}");
    tokio::time::sleep(TRANSCODER_WARMUP).await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = video.recv() => match frame {
                Some(frame) => stdin
                    .write_all(&frame.data)
                    .await
                    .context("write access unit to transcoder")?,
                None => break, // buffer closed on detach
            },
        }
    }

    drop(stdin);
    let _ = child.kill().await;
    info!("transcoder stopped");
    Ok(())
}
