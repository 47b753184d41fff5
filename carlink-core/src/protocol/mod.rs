//! The dongle's framed wire protocol.
//!
//! ## Frame layout (little-endian)
//!
//! ```text
//! magic:  u32  = 0x55AA55AA
//! length: u32  payload byte count
//! kind:   u32  message type code
//! check:  u32  = kind ^ 0xFFFFFFFF
//! body:   [u8; length]
//! ```
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `header`   | The 16-byte leading chunk and its validity checks  |
//! | `types`    | Closed enums: commands, touch actions, phone types |
//! | `messages` | Payload structs and the `Message` sum type         |
//! | `codec`    | marshal / decode dispatch over the registry        |

pub mod codec;
pub mod header;
pub mod messages;
pub mod types;

pub use codec::{decode_body, encode_body, marshal};
pub use header::{FrameHeader, HEADER_LEN, MAGIC};
pub use messages::{
    kind, AudioData, AudioPayload, ManufacturerInfo, MediaData, Message, Open, Opened, Phase,
    Plugged, SendFile, Touch, TouchPoint, VideoData,
};
pub use types::{
    audio_format, file_path, AudioCommand, AudioFormat, CarPlayCommand, HandDrive, LogoKind,
    MediaType, MultiTouchAction, PhoneType, TouchAction,
};
