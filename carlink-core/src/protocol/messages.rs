//! Payload structures and the `Message` sum type.
//!
//! The dongle's wire registry is a closed set of type codes; each code
//! maps to one payload layout. `Message` enumerates every known kind —
//! the registry lookup the original firmware tooling does with runtime
//! reflection is a plain `match` here. Code 0x01 is shared by two kinds:
//! `Open` travels host → dongle, `Opened` dongle → host; inbound decoding
//! always selects `Opened`.
//!
//! Fixed-layout payloads are packed little-endian by hand, the same way
//! the frame header is. Trailer-style payloads (`AudioData`, `VideoData`,
//! `MediaData`, …) carry their quirks in [`crate::protocol::codec`].

use crate::error::LinkError;
use crate::protocol::types::{
    AudioCommand, CarPlayCommand, LogoKind, MediaType, MultiTouchAction, PhoneType, TouchAction,
};

// ── Type codes ───────────────────────────────────────────────────

/// Wire type codes, one per registry entry.
pub mod kind {
    pub const OPEN: u32 = 0x01;
    pub const PLUGGED: u32 = 0x02;
    pub const PHASE: u32 = 0x03;
    pub const UNPLUGGED: u32 = 0x04;
    pub const TOUCH: u32 = 0x05;
    pub const VIDEO_DATA: u32 = 0x06;
    pub const AUDIO_DATA: u32 = 0x07;
    pub const CAR_PLAY: u32 = 0x08;
    pub const LOGO_TYPE: u32 = 0x09;
    pub const BLUETOOTH_ADDRESS: u32 = 0x0a;
    pub const BLUETOOTH_PIN: u32 = 0x0c;
    pub const BLUETOOTH_DEVICE_NAME: u32 = 0x0d;
    pub const WIFI_DEVICE_NAME: u32 = 0x0e;
    pub const DISCONNECT_PHONE: u32 = 0x0f;
    pub const BLUETOOTH_PAIRED_LIST: u32 = 0x12;
    pub const MANUFACTURER_INFO: u32 = 0x14;
    pub const CLOSE_DONGLE: u32 = 0x15;
    pub const MULTI_TOUCH: u32 = 0x17;
    pub const HICAR_LINK: u32 = 0x18;
    pub const BOX_SETTINGS: u32 = 0x19;
    pub const MEDIA_DATA: u32 = 0x2a;
    pub const SEND_FILE: u32 = 0x99;
    pub const HEARTBEAT: u32 = 0xaa;
    pub const SOFTWARE_VERSION: u32 = 0xcc;
}

// ── Open / Opened ────────────────────────────────────────────────

/// Host → dongle session open request. Seven packed i32 fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Open {
    pub width: i32,
    pub height: i32,
    pub video_frame_rate: i32,
    pub format: i32,
    pub packet_max: i32,
    pub i_box_version: i32,
    pub phone_work_mode: i32,
}

impl Open {
    pub const SIZE: usize = 28;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        for field in [
            self.width,
            self.height,
            self.video_frame_rate,
            self.format,
            self.packet_max,
            self.i_box_version,
            self.phone_work_mode,
        ] {
            buf.extend_from_slice(&field.to_le_bytes());
        }
        buf
    }
}

/// Dongle → host acknowledgement of `Open`. Same layout, opposite
/// direction; the dongle echoes the geometry it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub format: i32,
    pub packet_max: i32,
    pub i_box: i32,
    pub phone_mode: i32,
}

impl Opened {
    pub const SIZE: usize = 28;

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::SIZE {
            return Err(LinkError::TruncatedPayload {
                kind: "Opened",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let f = |i: usize| i32::from_le_bytes(data[i * 4..i * 4 + 4].try_into().unwrap());
        Ok(Self {
            width: f(0),
            height: f(1),
            fps: f(2),
            format: f(3),
            packet_max: f(4),
            i_box: f(5),
            phone_mode: f(6),
        })
    }
}

// ── Plugged / Phase ──────────────────────────────────────────────

/// A phone attached to the dongle. The WiFi word is optional on the
/// wire; older firmware sends a 4-byte body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plugged {
    pub phone_type: PhoneType,
    pub wifi: Option<i32>,
}

impl Plugged {
    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < 4 {
            return Err(LinkError::TruncatedPayload {
                kind: "Plugged",
                expected: 4,
                actual: data.len(),
            });
        }
        let phone_type =
            PhoneType::try_from(u32::from_le_bytes(data[0..4].try_into().unwrap()))?;
        let wifi = if data.len() >= 8 {
            Some(i32::from_le_bytes(data[4..8].try_into().unwrap()))
        } else {
            None
        };
        Ok(Self { phone_type, wifi })
    }
}

/// Dongle lifecycle step notification. Opaque to the host; logged for
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub value: u32,
}

impl Phase {
    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < 4 {
            return Err(LinkError::TruncatedPayload {
                kind: "Phase",
                expected: 4,
                actual: data.len(),
            });
        }
        Ok(Self {
            value: u32::from_le_bytes(data[0..4].try_into().unwrap()),
        })
    }
}

// ── Touch ────────────────────────────────────────────────────────

/// Single-touch event, host → dongle. Coordinates are pre-scaled to the
/// dongle's 0..10000 logical surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Touch {
    pub action: TouchAction,
    pub x: u32,
    pub y: u32,
    pub flags: u32,
}

impl Touch {
    pub const SIZE: usize = 16;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&(self.action as u32).to_le_bytes());
        buf.extend_from_slice(&self.x.to_le_bytes());
        buf.extend_from_slice(&self.y.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::SIZE {
            return Err(LinkError::TruncatedPayload {
                kind: "Touch",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            action: TouchAction::try_from(u32::from_le_bytes(data[0..4].try_into().unwrap()))?,
            x: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            y: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            flags: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        })
    }
}

/// One contact point of a multi-touch frame (16 bytes each on the wire).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    /// Normalised x in [0, 1].
    pub x: f32,
    /// Normalised y in [0, 1].
    pub y: f32,
    pub action: MultiTouchAction,
    pub id: u32,
}

impl TouchPoint {
    pub const SIZE: usize = 16;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.x.to_le_bytes());
        buf[4..8].copy_from_slice(&self.y.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.action as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&self.id.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::SIZE {
            return Err(LinkError::TruncatedPayload {
                kind: "TouchPoint",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            x: f32::from_le_bytes(data[0..4].try_into().unwrap()),
            y: f32::from_le_bytes(data[4..8].try_into().unwrap()),
            action: MultiTouchAction::try_from(u32::from_le_bytes(
                data[8..12].try_into().unwrap(),
            ))?,
            id: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        })
    }
}

// ── VideoData ────────────────────────────────────────────────────

/// One H.264 access unit with its 20-byte metadata prefix.
///
/// `data` is always a fresh allocation — never a view into the USB
/// transfer buffer, which is reused by the next read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoData {
    pub width: i32,
    pub height: i32,
    pub flags: i32,
    pub length: i32,
    pub unknown: i32,
    pub data: Vec<u8>,
}

impl VideoData {
    pub const PREFIX_SIZE: usize = 20;

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::PREFIX_SIZE {
            return Err(LinkError::TruncatedPayload {
                kind: "VideoData",
                expected: Self::PREFIX_SIZE,
                actual: data.len(),
            });
        }
        let f = |i: usize| i32::from_le_bytes(data[i * 4..i * 4 + 4].try_into().unwrap());
        Ok(Self {
            width: f(0),
            height: f(1),
            flags: f(2),
            length: f(3),
            unknown: f(4),
            data: data[Self::PREFIX_SIZE..].to_vec(),
        })
    }
}

// ── AudioData ────────────────────────────────────────────────────

/// What follows the fixed 12-byte `AudioData` prefix. The dongle
/// overloads the frame: trailer length alone selects the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    /// 1-byte trailer: a stream command.
    Command(AudioCommand),
    /// 4-byte trailer: volume ramp duration.
    VolumeDuration(i32),
    /// Anything else: raw PCM samples.
    Pcm(Vec<u8>),
}

/// Audio frame: 12-byte prefix (`decode_type`, `volume`, `audio_type`)
/// plus a length-disambiguated trailer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub decode_type: u32,
    pub volume: f32,
    pub audio_type: i32,
    pub payload: AudioPayload,
}

impl AudioData {
    pub const PREFIX_SIZE: usize = 12;

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::PREFIX_SIZE {
            return Err(LinkError::TruncatedPayload {
                kind: "AudioData",
                expected: Self::PREFIX_SIZE,
                actual: data.len(),
            });
        }
        let decode_type = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let volume = f32::from_le_bytes(data[4..8].try_into().unwrap());
        let audio_type = i32::from_le_bytes(data[8..12].try_into().unwrap());

        let trailer = &data[Self::PREFIX_SIZE..];
        let payload = match trailer.len() {
            1 => AudioPayload::Command(AudioCommand::try_from(trailer[0])?),
            4 => AudioPayload::VolumeDuration(i32::from_le_bytes(trailer.try_into().unwrap())),
            _ => AudioPayload::Pcm(trailer.to_vec()),
        };

        Ok(Self {
            decode_type,
            volume,
            audio_type,
            payload,
        })
    }
}

// ── MediaData ────────────────────────────────────────────────────

/// Now-playing metadata or album art (type 0x2a).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaData {
    pub media_type: MediaType,
    /// Null-terminated JSON for [`MediaType::Data`], raw image bytes
    /// for [`MediaType::AlbumCover`].
    pub info: Vec<u8>,
}

impl MediaData {
    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < 4 {
            return Err(LinkError::TruncatedPayload {
                kind: "MediaData",
                expected: 4,
                actual: data.len(),
            });
        }
        let media_type =
            MediaType::try_from(u32::from_le_bytes(data[0..4].try_into().unwrap()))?;
        Ok(Self {
            media_type,
            info: data[4..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.info.len());
        buf.extend_from_slice(&(self.media_type as u32).to_le_bytes());
        buf.extend_from_slice(&self.info);
        buf
    }
}

// ── SendFile ─────────────────────────────────────────────────────

/// Write a file into the dongle's virtual filesystem.
///
/// Wire layout: `i32 name_len | name bytes (null-terminated) |
/// i32 content_len | content bytes`. The name length counts the
/// terminating NUL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl SendFile {
    /// Convenience constructor for the common path + i32 value case.
    pub fn with_i32(path: &str, value: i32) -> Self {
        Self {
            file_name: path.to_string(),
            content: value.to_le_bytes().to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let name_len = self.file_name.len() + 1; // trailing NUL
        let mut buf = Vec::with_capacity(8 + name_len + self.content.len());
        buf.extend_from_slice(&(name_len as i32).to_le_bytes());
        buf.extend_from_slice(self.file_name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&(self.content.len() as i32).to_le_bytes());
        buf.extend_from_slice(&self.content);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        let too_short = |actual| LinkError::TruncatedPayload {
            kind: "SendFile",
            expected: 8,
            actual,
        };
        if data.len() < 8 {
            return Err(too_short(data.len()));
        }
        let name_len = i32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        if data.len() < 4 + name_len + 4 {
            return Err(too_short(data.len()));
        }
        let name_bytes = &data[4..4 + name_len];
        let name_bytes = match name_bytes.iter().position(|&b| b == 0) {
            Some(n) => &name_bytes[..n],
            None => name_bytes,
        };
        let content_off = 4 + name_len;
        let content_len =
            i32::from_le_bytes(data[content_off..content_off + 4].try_into().unwrap()) as usize;
        if data.len() < content_off + 4 + content_len {
            return Err(too_short(data.len()));
        }
        Ok(Self {
            file_name: String::from_utf8(name_bytes.to_vec())?,
            content: data[content_off + 4..content_off + 4 + content_len].to_vec(),
        })
    }
}

// ── ManufacturerInfo ─────────────────────────────────────────────

/// Two opaque words the dongle reports at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerInfo {
    pub a: i32,
    pub b: i32,
}

impl ManufacturerInfo {
    pub const SIZE: usize = 8;

    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < Self::SIZE {
            return Err(LinkError::TruncatedPayload {
                kind: "ManufacturerInfo",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            a: i32::from_le_bytes(data[0..4].try_into().unwrap()),
            b: i32::from_le_bytes(data[4..8].try_into().unwrap()),
        })
    }
}

// ── Message ──────────────────────────────────────────────────────

/// Every message the bridge can put on or take off the bus.
///
/// `Unknown` preserves unrecognised type codes instead of failing the
/// decode; new firmware revisions add codes without notice.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Host → dongle session open (0x01 outbound).
    Open(Open),
    /// Dongle → host open acknowledgement (0x01 inbound).
    Opened(Opened),
    Plugged(Plugged),
    Phase(Phase),
    Unplugged,
    Touch(Touch),
    Video(VideoData),
    Audio(AudioData),
    CarPlay(CarPlayCommand),
    Logo(LogoKind),
    BluetoothAddress(String),
    BluetoothPin(String),
    BluetoothDeviceName(String),
    WifiDeviceName(String),
    DisconnectPhone,
    BluetoothPairedList(String),
    ManufacturerInfo(ManufacturerInfo),
    CloseDongle,
    MultiTouch(Vec<TouchPoint>),
    HiCarLink(String),
    /// Opaque JSON blob, both directions.
    BoxSettings(Vec<u8>),
    Media(MediaData),
    SendFile(SendFile),
    Heartbeat,
    SoftwareVersion(String),
    /// Type code not in the registry. Not an error.
    Unknown { kind: u32, data: Vec<u8> },
}

impl Message {
    /// The registry type code for this message.
    ///
    /// `Unknown` has no registered code and cannot be re-encoded.
    pub fn kind(&self) -> Result<u32, LinkError> {
        Ok(match self {
            Message::Open(_) | Message::Opened(_) => kind::OPEN,
            Message::Plugged(_) => kind::PLUGGED,
            Message::Phase(_) => kind::PHASE,
            Message::Unplugged => kind::UNPLUGGED,
            Message::Touch(_) => kind::TOUCH,
            Message::Video(_) => kind::VIDEO_DATA,
            Message::Audio(_) => kind::AUDIO_DATA,
            Message::CarPlay(_) => kind::CAR_PLAY,
            Message::Logo(_) => kind::LOGO_TYPE,
            Message::BluetoothAddress(_) => kind::BLUETOOTH_ADDRESS,
            Message::BluetoothPin(_) => kind::BLUETOOTH_PIN,
            Message::BluetoothDeviceName(_) => kind::BLUETOOTH_DEVICE_NAME,
            Message::WifiDeviceName(_) => kind::WIFI_DEVICE_NAME,
            Message::DisconnectPhone => kind::DISCONNECT_PHONE,
            Message::BluetoothPairedList(_) => kind::BLUETOOTH_PAIRED_LIST,
            Message::ManufacturerInfo(_) => kind::MANUFACTURER_INFO,
            Message::CloseDongle => kind::CLOSE_DONGLE,
            Message::MultiTouch(_) => kind::MULTI_TOUCH,
            Message::HiCarLink(_) => kind::HICAR_LINK,
            Message::BoxSettings(_) => kind::BOX_SETTINGS,
            Message::Media(_) => kind::MEDIA_DATA,
            Message::SendFile(_) => kind::SEND_FILE,
            Message::Heartbeat => kind::HEARTBEAT,
            Message::SoftwareVersion(_) => kind::SOFTWARE_VERSION,
            Message::Unknown { kind, .. } => return Err(LinkError::EncodeUnknownKind(*kind)),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_encodes_seven_words() {
        let open = Open {
            width: 800,
            height: 480,
            video_frame_rate: 30,
            format: 5,
            packet_max: 49152,
            i_box_version: 2,
            phone_work_mode: 2,
        };
        let encoded = open.encode();
        assert_eq!(encoded.len(), Open::SIZE);
        assert_eq!(&encoded[0..4], &800i32.to_le_bytes());
        assert_eq!(&encoded[8..12], &30i32.to_le_bytes());
        assert_eq!(&encoded[16..20], &49152i32.to_le_bytes());
    }

    #[test]
    fn opened_decode_mirrors_open_layout() {
        let open = Open {
            width: 1280,
            height: 720,
            video_frame_rate: 60,
            format: 5,
            packet_max: 49152,
            i_box_version: 2,
            phone_work_mode: 2,
        };
        let opened = Opened::decode(&open.encode()).unwrap();
        assert_eq!(opened.width, 1280);
        assert_eq!(opened.height, 720);
        assert_eq!(opened.fps, 60);
    }

    #[test]
    fn plugged_with_and_without_wifi() {
        let mut body = 5u32.to_le_bytes().to_vec();
        let p = Plugged::decode(&body).unwrap();
        assert_eq!(p.phone_type, PhoneType::AndroidAuto);
        assert_eq!(p.wifi, None);

        body.extend_from_slice(&1i32.to_le_bytes());
        let p = Plugged::decode(&body).unwrap();
        assert_eq!(p.wifi, Some(1));
    }

    #[test]
    fn video_data_copies_bitstream() {
        let mut body = vec![0u8; VideoData::PREFIX_SIZE];
        body[12..16].copy_from_slice(&3i32.to_le_bytes()); // length word
        body.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let video = VideoData::decode(&body).unwrap();
        assert_eq!(video.length, 3);
        assert_eq!(video.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);

        // Mutating the source buffer must not affect the decoded frame.
        body[VideoData::PREFIX_SIZE] = 0x00;
        assert_eq!(video.data[0], 0xDE);
    }

    #[test]
    fn audio_trailer_disambiguation() {
        let mut prefix = Vec::new();
        prefix.extend_from_slice(&1u32.to_le_bytes());
        prefix.extend_from_slice(&0.5f32.to_le_bytes());
        prefix.extend_from_slice(&2i32.to_le_bytes());

        // 1-byte trailer → command
        let mut body = prefix.clone();
        body.push(AudioCommand::SiriStart as u8);
        let audio = AudioData::decode(&body).unwrap();
        assert_eq!(audio.payload, AudioPayload::Command(AudioCommand::SiriStart));

        // 4-byte trailer → volume duration
        let mut body = prefix.clone();
        body.extend_from_slice(&250i32.to_le_bytes());
        let audio = AudioData::decode(&body).unwrap();
        assert_eq!(audio.payload, AudioPayload::VolumeDuration(250));

        // anything else → PCM
        let mut body = prefix.clone();
        body.extend_from_slice(&[0u8; 52]);
        let audio = AudioData::decode(&body).unwrap();
        assert!(matches!(audio.payload, AudioPayload::Pcm(ref d) if d.len() == 52));
        assert_eq!(audio.decode_type, 1);
        assert_eq!(audio.audio_type, 2);
    }

    #[test]
    fn send_file_layout() {
        let msg = SendFile::with_i32("/tmp/screen_dpi", 140);
        let encoded = msg.encode();

        // name_len includes the NUL terminator
        let name_len = i32::from_le_bytes(encoded[0..4].try_into().unwrap()) as usize;
        assert_eq!(name_len, "/tmp/screen_dpi".len() + 1);
        assert_eq!(&encoded[4..4 + name_len - 1], b"/tmp/screen_dpi");
        assert_eq!(encoded[4 + name_len - 1], 0);

        let content_off = 4 + name_len;
        let content_len =
            i32::from_le_bytes(encoded[content_off..content_off + 4].try_into().unwrap());
        assert_eq!(content_len, 4);
        assert_eq!(&encoded[content_off + 4..], &140i32.to_le_bytes());
    }

    #[test]
    fn unknown_has_no_kind() {
        let msg = Message::Unknown {
            kind: 0x7f,
            data: vec![1, 2, 3],
        };
        assert!(matches!(
            msg.kind(),
            Err(LinkError::EncodeUnknownKind(0x7f))
        ));
    }

    #[test]
    fn open_and_opened_share_a_code() {
        let open = Message::Open(Open {
            width: 0,
            height: 0,
            video_frame_rate: 0,
            format: 0,
            packet_max: 0,
            i_box_version: 0,
            phone_work_mode: 0,
        });
        let opened = Message::Opened(Opened::decode(&[0u8; 28]).unwrap());
        assert_eq!(open.kind().unwrap(), kind::OPEN);
        assert_eq!(opened.kind().unwrap(), kind::OPEN);
    }
}
