//! # carlink-core — CarPlay/Android-Auto dongle bridge
//!
//! Host-side driver for the 0x1314 family of USB projection dongles.
//! The dongle bridges a phone's projected UI to the host as an H.264
//! stream plus audio and a bidirectional control channel; this crate
//! owns the USB link, the framed wire codec, the session lifecycle,
//! and the real-time video hand-off.
//!
//! ```text
//!  HotplugMonitor ──attach/detach──► StateManager
//!        │                               ▲
//!        ▼                               │
//!  UsbTransport ◄──► codec ◄──► Session ─┘
//!                                 │
//!                                 ├──► FrameBuffer (latest-wins H.264)
//!                                 └──► user handler (touch ack, plug, …)
//! ```
//!
//! | Module     | Purpose                                             |
//! |------------|-----------------------------------------------------|
//! | `protocol` | Frame header, message registry, marshal/unmarshal   |
//! | `usb`      | Bulk endpoints, transport seam, hotplug polling     |
//! | `state`    | Disconnected/Connecting/Connected with observers    |
//! | `session`  | Handshake, heartbeat, dispatch loop, send helpers   |
//! | `video`    | Latest-wins frame buffer feeding the transcoder     |
//! | `config`   | `DongleConfig` with firmware-accurate defaults      |

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod state;
pub mod usb;
pub mod video;

pub use config::{DongleConfig, MicSource, PhoneTypeConfig, WifiBand};
pub use error::LinkError;
pub use protocol::Message;
pub use session::{MediaInfo, Session};
pub use state::{LinkState, StateManager, StateObserver};
pub use usb::{HotplugMonitor, Transport, UsbTransport};
pub use video::{FrameBuffer, VideoFrame};
