//! Session orchestration: cold-start configuration, heartbeat, inbound
//! dispatch, and the typed send API.
//!
//! ## Cold start
//!
//! After the transport opens, the dongle expects a precise ordered
//! bundle of configuration messages. Each step only awaits local send
//! success — the dongle acknowledges asynchronously on the inbound
//! channel:
//!
//! ```text
//! SendFile(/tmp/screen_dpi)        Open{geometry}
//! SendFile(/tmp/night_mode)        SendFile(/tmp/hand_drive_mode)
//! SendFile(/tmp/charge_mode)       SendFile(/etc/box_name)
//! CarPlay{Wifi24g|Wifi5g}          BoxSettings{json}
//! CarPlay{SupportWifi}             CarPlay{mic}
//! CarPlay{audio transfer}          [SendFile(/etc/android_work_mode)]
//! sleep 600ms                      CarPlay{WifiConnect}
//! ```
//!
//! The 600 ms settle before `WifiConnect` is load-bearing; the dongle
//! drops the association without it. From then on a `Heartbeat` goes
//! out every 2 s until the session ends — miss a few and the dongle
//! times the host out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DongleConfig;
use crate::error::LinkError;
use crate::protocol::{
    file_path, CarPlayCommand, LogoKind, MediaData, MediaType, Message, Open, Plugged, SendFile,
    Touch, TouchAction, TouchPoint,
};
use crate::usb::Transport;
use crate::video::{FrameBuffer, VideoFrame};

/// Heartbeat cadence the dongle firmware expects.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Settle delay between microphone configuration and `WifiConnect`.
const SETTLE_DELAY: Duration = Duration::from_millis(600);

/// How long `shutdown` waits for the dispatch loop before tearing the
/// transport down regardless.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// ── MediaInfo ────────────────────────────────────────────────────

/// Now-playing metadata pushed to the dongle's UI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaInfo {
    #[serde(rename = "MediaSongName")]
    pub song_name: String,
    #[serde(rename = "MediaAlbumName")]
    pub album_name: String,
    #[serde(rename = "MediaArtistName")]
    pub artist_name: String,
    #[serde(rename = "MediaAPPName")]
    pub app_name: String,
    /// Track length in seconds.
    #[serde(rename = "MediaSongDuration")]
    pub duration: i64,
    /// Playback position in seconds.
    #[serde(rename = "MediaSongPlayTime")]
    pub play_time: i64,
}

// ── Session ──────────────────────────────────────────────────────

/// One configured dongle session.
///
/// Owns the transport, the latest-wins video buffer, and the heartbeat
/// task. Constructed by [`Session::start`], which runs the cold-start
/// handshake; destroyed by [`Session::shutdown`].
pub struct Session<T: Transport> {
    transport: Arc<T>,
    config: DongleConfig,
    /// The one post-handshake config mutation: flipped (at most once)
    /// when an Android device plugs in and auto-detection is on.
    android_work_mode: AtomicBool,
    video: Arc<FrameBuffer>,
    frame_count: AtomicU64,
    cancel: CancellationToken,
    heartbeat: StdMutex<Option<JoinHandle<()>>>,
    dispatch_done: tokio::sync::Notify,
    dispatch_active: AtomicBool,
}

impl<T: Transport + 'static> Session<T> {
    /// Configure a freshly opened transport and start the heartbeat.
    ///
    /// On handshake failure the transport is closed and the error
    /// surfaced; the hotplug monitor will retry on the next attach.
    pub async fn start(transport: T, config: DongleConfig) -> Result<Arc<Self>, LinkError> {
        let session = Arc::new(Self {
            transport: Arc::new(transport),
            android_work_mode: AtomicBool::new(config.android_work_mode),
            config,
            video: Arc::new(FrameBuffer::new()),
            frame_count: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            heartbeat: StdMutex::new(None),
            dispatch_done: tokio::sync::Notify::new(),
            dispatch_active: AtomicBool::new(false),
        });

        if let Err(err) = session.configure().await {
            session.transport.close().await;
            return Err(err);
        }
        session.start_heartbeat();
        info!("dongle session configured and running");
        Ok(session)
    }

    /// The cold-start message bundle, in firmware order.
    async fn configure(&self) -> Result<(), LinkError> {
        let config = &self.config;
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            dpi = config.dpi,
            "configuring dongle"
        );

        self.send(&Message::SendFile(SendFile::with_i32(
            file_path::SCREEN_DPI,
            config.dpi,
        )))
        .await?;

        self.send(&Message::Open(Open {
            width: config.width,
            height: config.height,
            video_frame_rate: config.fps,
            format: config.format,
            packet_max: config.packet_max,
            i_box_version: config.i_box_version,
            phone_work_mode: config.phone_work_mode,
        }))
        .await?;

        self.send(&Message::SendFile(SendFile::with_i32(
            file_path::NIGHT_MODE,
            config.night_mode as i32,
        )))
        .await?;

        self.send(&Message::SendFile(SendFile::with_i32(
            file_path::HAND_DRIVE_MODE,
            config.hand as i32,
        )))
        .await?;

        self.send(&Message::SendFile(SendFile::with_i32(
            file_path::CHARGE_MODE,
            1,
        )))
        .await?;

        self.send(&Message::SendFile(SendFile {
            file_name: file_path::BOX_NAME.to_string(),
            content: config.box_name.as_bytes().to_vec(),
        }))
        .await?;

        self.send(&Message::CarPlay(config.wifi_command())).await?;
        self.send(&self.box_settings()?).await?;
        self.send(&Message::CarPlay(CarPlayCommand::SupportWifi))
            .await?;
        self.send(&Message::CarPlay(config.mic_command())).await?;
        self.send(&Message::CarPlay(config.audio_transfer_command()))
            .await?;

        if self.android_work_mode.load(Ordering::SeqCst) {
            self.send(&Message::SendFile(SendFile::with_i32(
                file_path::ANDROID_WORK_MODE,
                1,
            )))
            .await?;
        }

        // Without this settle the dongle ignores the association request.
        tokio::time::sleep(SETTLE_DELAY).await;
        self.send(&Message::CarPlay(CarPlayCommand::WifiConnect))
            .await?;

        Ok(())
    }

    fn box_settings(&self) -> Result<Message, LinkError> {
        let sync_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        // Firmware revisions disagree on the channel key's case; send both.
        let settings = json!({
            "mediaDelay": self.config.media_delay,
            "syncTime": sync_time,
            "androidAutoSizeW": self.config.width,
            "androidAutoSizeH": self.config.height,
            "WiFiChannel": self.config.effective_wifi_channel(),
            "wifiChannel": self.config.effective_wifi_channel(),
        });
        Ok(Message::BoxSettings(serde_json::to_vec(&settings)?))
    }

    fn start_heartbeat(&self) {
        let mut guard = self.heartbeat.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let transport = self.transport.clone();
        let cancel = self.cancel.child_token();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick; the first beat goes out
            // one interval after configuration.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                if let Err(err) = transport.send(&Message::Heartbeat).await {
                    warn!("heartbeat send failed: {err}");
                }
            }
        }));
    }

    // ── Inbound dispatch ──────────────────────────────────────────

    /// Decode inbound messages until cancellation.
    ///
    /// Every message reaches `on_message` in wire order. Transient
    /// decode/transfer errors go to `on_error` and the loop continues —
    /// the dongle recovers from occasional glitches, and persistent
    /// failure surfaces as a detach on the hotplug monitor. Returns
    /// [`LinkError::Cancelled`] on deliberate shutdown.
    pub async fn run(
        &self,
        mut on_message: impl FnMut(Message) + Send,
        mut on_error: impl FnMut(LinkError) + Send,
    ) -> Result<(), LinkError> {
        self.dispatch_active.store(true, Ordering::SeqCst);
        let result = loop {
            match self.transport.recv(&self.cancel).await {
                Ok(message) => {
                    self.handle_inbound(&message).await;
                    on_message(message);
                }
                Err(LinkError::Cancelled) => break Err(LinkError::Cancelled),
                Err(err) => on_error(err),
            }
        };
        self.dispatch_active.store(false, Ordering::SeqCst);
        self.dispatch_done.notify_waiters();
        result
    }

    /// Orchestrator-side handling, before the user sees the message.
    async fn handle_inbound(&self, message: &Message) {
        match message {
            Message::Video(video) => {
                let count = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
                let dropped = self.video.push(VideoFrame {
                    width: video.width,
                    height: video.height,
                    data: video.data.clone(),
                });
                if dropped > 0 {
                    debug!("dropped {dropped} stale video frame(s) (frame #{count})");
                }
            }
            Message::Plugged(plugged) => {
                info!(
                    "phone plugged: {} (wifi: {:?})",
                    plugged.phone_type, plugged.wifi
                );
                self.maybe_enable_android_work_mode(plugged).await;
            }
            Message::Unplugged => info!("phone unplugged"),
            Message::Phase(phase) => debug!("dongle phase: {}", phase.value),
            _ => {}
        }
    }

    /// Auto-enable Android work mode on the first Android plug event.
    async fn maybe_enable_android_work_mode(&self, plugged: &Plugged) {
        if !self.config.auto_detect_android_mode {
            return;
        }
        if self.android_work_mode.load(Ordering::SeqCst) {
            return;
        }
        if !plugged.phone_type.is_android() {
            return;
        }

        let result = self
            .send(&Message::SendFile(SendFile::with_i32(
                file_path::ANDROID_WORK_MODE,
                1,
            )))
            .await;
        match result {
            Ok(()) => {
                self.android_work_mode.store(true, Ordering::SeqCst);
                info!(
                    "auto-enabled android work mode for {}",
                    plugged.phone_type
                );
            }
            Err(err) => warn!("failed to enable android work mode: {err}"),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────

    /// Stop the heartbeat and dispatch loop, close the transport, and
    /// reset the video pipeline. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let heartbeat = self.heartbeat.lock().unwrap().take();
        if let Some(handle) = heartbeat {
            let _ = handle.await;
        }

        if self.dispatch_active.load(Ordering::SeqCst) {
            // Bounded courtesy wait; teardown proceeds regardless.
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.dispatch_done.notified()).await;
        }

        self.transport.close().await;
        self.video.clear();
        self.video.close();
        self.frame_count.store(0, Ordering::SeqCst);
        info!("dongle session shut down");
    }

    // ── Accessors ─────────────────────────────────────────────────

    /// The latest-wins H.264 buffer downstream consumers read from.
    pub fn video(&self) -> Arc<FrameBuffer> {
        self.video.clone()
    }

    /// Session configuration (immutable after start).
    pub fn config(&self) -> &DongleConfig {
        &self.config
    }

    /// Current Android-work-mode flag, including the auto-enable flip.
    pub fn android_work_mode(&self) -> bool {
        self.android_work_mode.load(Ordering::SeqCst)
    }

    /// Video frames received since start (reset on shutdown).
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Token observers can use to notice session teardown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    // ── Send API ──────────────────────────────────────────────────

    /// Marshal and send one message.
    pub async fn send(&self, message: &Message) -> Result<(), LinkError> {
        self.transport.send(message).await
    }

    /// Send a single touch event. `x` and `y` are normalised [0, 1]
    /// screen coordinates, scaled to the dongle's 0..10000 surface.
    pub async fn send_touch(
        &self,
        x: f32,
        y: f32,
        action: TouchAction,
    ) -> Result<(), LinkError> {
        self.send(&Message::Touch(Touch {
            action,
            x: scale_touch(x),
            y: scale_touch(y),
            flags: 0,
        }))
        .await
    }

    /// Send a multi-point touch frame.
    pub async fn send_multi_touch(&self, points: &[TouchPoint]) -> Result<(), LinkError> {
        self.send(&Message::MultiTouch(points.to_vec())).await
    }

    /// Send a bare CarPlay command (buttons, Siri, focus, …).
    pub async fn send_command(&self, command: CarPlayCommand) -> Result<(), LinkError> {
        self.send(&Message::CarPlay(command)).await
    }

    /// Toggle the dongle's night-mode theme.
    pub async fn send_night_mode(&self, enable: bool) -> Result<(), LinkError> {
        self.send_command(if enable {
            CarPlayCommand::EnableNightMode
        } else {
            CarPlayCommand::DisableNightMode
        })
        .await
    }

    /// Accept or reject an incoming phone call.
    pub async fn send_phone_call_action(&self, accept: bool) -> Result<(), LinkError> {
        self.send_command(if accept {
            CarPlayCommand::AcceptPhoneCall
        } else {
            CarPlayCommand::RejectPhoneCall
        })
        .await
    }

    /// Request or release video focus.
    pub async fn send_video_focus(&self, request: bool) -> Result<(), LinkError> {
        self.send_command(if request {
            CarPlayCommand::RequestVideoFocus
        } else {
            CarPlayCommand::ReleaseVideoFocus
        })
        .await
    }

    /// Ask the phone for a fresh keyframe.
    pub async fn request_key_frame(&self) -> Result<(), LinkError> {
        self.send_command(CarPlayCommand::Frame).await
    }

    /// Push now-playing metadata (null-terminated JSON on the wire).
    pub async fn send_media_info(&self, info: &MediaInfo) -> Result<(), LinkError> {
        let mut payload = serde_json::to_vec(info)?;
        payload.push(0);
        self.send(&Message::Media(MediaData {
            media_type: MediaType::Data,
            info: payload,
        }))
        .await
    }

    /// Push album-cover image bytes.
    pub async fn send_album_cover(&self, image: Vec<u8>) -> Result<(), LinkError> {
        self.send(&Message::Media(MediaData {
            media_type: MediaType::AlbumCover,
            info: image,
        }))
        .await
    }

    /// Select the dongle's idle-screen logo.
    pub async fn send_logo_type(&self, logo: LogoKind) -> Result<(), LinkError> {
        self.send(&Message::Logo(logo)).await
    }

    /// Write the OEM icon configuration (`/etc/airplay.conf`).
    pub async fn send_icon_config(&self, label: Option<&str>) -> Result<(), LinkError> {
        self.send(&Message::SendFile(SendFile {
            file_name: file_path::AIRPLAY_CONFIG.to_string(),
            content: icon_config_blob(label).into_bytes(),
        }))
        .await
    }

    /// Ask the dongle to drop the phone link.
    pub async fn disconnect_phone(&self) -> Result<(), LinkError> {
        self.send(&Message::DisconnectPhone).await
    }

    /// Ask the dongle to power down its session.
    pub async fn close_dongle(&self) -> Result<(), LinkError> {
        self.send(&Message::CloseDongle).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Map a normalised coordinate onto the dongle's 0..10000 surface.
fn scale_touch(value: f32) -> u32 {
    (value * 10000.0).round().clamp(0.0, 10000.0) as u32
}

/// The `key = value` blob written to `/etc/airplay.conf`.
fn icon_config_blob(label: Option<&str>) -> String {
    let mut lines = vec![
        "oemIconVisible = 1".to_string(),
        "name = AutoBox".to_string(),
        "model = Carlink-1.00".to_string(),
        format!("oemIconPath = {}", file_path::OEM_ICON),
    ];
    if let Some(label) = label {
        lines.push(format!("oemIconLabel = {label}"));
    }
    lines.join("\n") + "\n"
}

// ── Tests ────────────────────────────────────────────────────────
