//! Marshal / unmarshal between [`Message`] values and wire frames.
//!
//! A full frame is `header (16 bytes) || body (header.length bytes)`.
//! Encoding a zero-field kind (Heartbeat, Unplugged, DisconnectPhone,
//! CloseDongle) produces an empty body and `length = 0`.
//!
//! Decoding never resynchronises: a header that fails validation means
//! the stream position is lost and the session must be torn down.

use crate::error::LinkError;
use crate::protocol::header::FrameHeader;
use crate::protocol::messages::{
    kind, AudioData, AudioPayload, ManufacturerInfo, MediaData, Message, Opened, Phase, Plugged,
    SendFile, Touch, TouchPoint, VideoData,
};
use crate::protocol::types::{CarPlayCommand, LogoKind};

/// Encode a message into a complete wire frame (header + body).
pub fn marshal(message: &Message) -> Result<Vec<u8>, LinkError> {
    let msg_kind = message.kind()?;
    let body = encode_body(message)?;
    let header = FrameHeader::new(msg_kind, body.len() as u32);

    let mut frame = Vec::with_capacity(16 + body.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Encode just the payload body of a message.
pub fn encode_body(message: &Message) -> Result<Vec<u8>, LinkError> {
    Ok(match message {
        Message::Open(open) => open.encode(),
        Message::Opened(opened) => {
            let mut buf = Vec::with_capacity(Opened::SIZE);
            for field in [
                opened.width,
                opened.height,
                opened.fps,
                opened.format,
                opened.packet_max,
                opened.i_box,
                opened.phone_mode,
            ] {
                buf.extend_from_slice(&field.to_le_bytes());
            }
            buf
        }
        Message::Plugged(p) => {
            let mut buf = (p.phone_type as u32).to_le_bytes().to_vec();
            if let Some(wifi) = p.wifi {
                buf.extend_from_slice(&wifi.to_le_bytes());
            }
            buf
        }
        Message::Phase(p) => p.value.to_le_bytes().to_vec(),
        Message::Touch(t) => t.encode(),
        Message::Video(v) => {
            let mut buf = Vec::with_capacity(VideoData::PREFIX_SIZE + v.data.len());
            for field in [v.width, v.height, v.flags, v.length, v.unknown] {
                buf.extend_from_slice(&field.to_le_bytes());
            }
            buf.extend_from_slice(&v.data);
            buf
        }
        Message::Audio(a) => {
            let mut buf = Vec::with_capacity(AudioData::PREFIX_SIZE);
            buf.extend_from_slice(&a.decode_type.to_le_bytes());
            buf.extend_from_slice(&a.volume.to_le_bytes());
            buf.extend_from_slice(&a.audio_type.to_le_bytes());
            match &a.payload {
                AudioPayload::Command(cmd) => buf.push(*cmd as u8),
                AudioPayload::VolumeDuration(d) => buf.extend_from_slice(&d.to_le_bytes()),
                AudioPayload::Pcm(data) => buf.extend_from_slice(data),
            }
            buf
        }
        Message::CarPlay(cmd) => (*cmd as u32).to_le_bytes().to_vec(),
        Message::Logo(logo) => (*logo as u32).to_le_bytes().to_vec(),
        Message::BluetoothAddress(s)
        | Message::BluetoothPin(s)
        | Message::BluetoothDeviceName(s)
        | Message::WifiDeviceName(s)
        | Message::BluetoothPairedList(s)
        | Message::HiCarLink(s)
        | Message::SoftwareVersion(s) => {
            let mut buf = s.as_bytes().to_vec();
            buf.push(0);
            buf
        }
        Message::ManufacturerInfo(info) => {
            let mut buf = info.a.to_le_bytes().to_vec();
            buf.extend_from_slice(&info.b.to_le_bytes());
            buf
        }
        Message::MultiTouch(points) => {
            let mut buf = Vec::with_capacity(points.len() * TouchPoint::SIZE);
            for point in points {
                buf.extend_from_slice(&point.encode());
            }
            buf
        }
        Message::BoxSettings(settings) => settings.clone(),
        Message::Media(media) => media.encode(),
        Message::SendFile(file) => file.encode(),
        // Zero-field kinds: empty body.
        Message::Unplugged
        | Message::DisconnectPhone
        | Message::CloseDongle
        | Message::Heartbeat => Vec::new(),
        Message::Unknown { kind, .. } => return Err(LinkError::EncodeUnknownKind(*kind)),
    })
}

/// Decode a payload body against its header type code.
///
/// Code 0x01 always decodes to [`Message::Opened`] — the host never
/// receives its own `Open`. An unregistered code yields
/// [`Message::Unknown`] rather than an error.
pub fn decode_body(msg_kind: u32, body: &[u8]) -> Result<Message, LinkError> {
    Ok(match msg_kind {
        kind::OPEN => Message::Opened(Opened::decode(body)?),
        kind::PLUGGED => Message::Plugged(Plugged::decode(body)?),
        kind::PHASE => Message::Phase(Phase::decode(body)?),
        kind::UNPLUGGED => Message::Unplugged,
        kind::TOUCH => Message::Touch(Touch::decode(body)?),
        kind::VIDEO_DATA => Message::Video(VideoData::decode(body)?),
        kind::AUDIO_DATA => Message::Audio(AudioData::decode(body)?),
        kind::CAR_PLAY => {
            let code = decode_u32(body, "CarPlay")?;
            Message::CarPlay(CarPlayCommand::try_from(code)?)
        }
        kind::LOGO_TYPE => {
            let code = decode_u32(body, "LogoType")?;
            Message::Logo(LogoKind::try_from(code)?)
        }
        kind::BLUETOOTH_ADDRESS => Message::BluetoothAddress(null_term_string(body)?),
        kind::BLUETOOTH_PIN => Message::BluetoothPin(null_term_string(body)?),
        kind::BLUETOOTH_DEVICE_NAME => Message::BluetoothDeviceName(null_term_string(body)?),
        kind::WIFI_DEVICE_NAME => Message::WifiDeviceName(null_term_string(body)?),
        kind::DISCONNECT_PHONE => Message::DisconnectPhone,
        kind::BLUETOOTH_PAIRED_LIST => Message::BluetoothPairedList(null_term_string(body)?),
        kind::MANUFACTURER_INFO => Message::ManufacturerInfo(ManufacturerInfo::decode(body)?),
        kind::CLOSE_DONGLE => Message::CloseDongle,
        kind::MULTI_TOUCH => {
            let count = body.len() / TouchPoint::SIZE;
            let mut points = Vec::with_capacity(count);
            for i in 0..count {
                points.push(TouchPoint::decode(
                    &body[i * TouchPoint::SIZE..(i + 1) * TouchPoint::SIZE],
                )?);
            }
            Message::MultiTouch(points)
        }
        kind::HICAR_LINK => Message::HiCarLink(null_term_string(body)?),
        kind::BOX_SETTINGS => Message::BoxSettings(body.to_vec()),
        kind::MEDIA_DATA => Message::Media(MediaData::decode(body)?),
        kind::SEND_FILE => Message::SendFile(SendFile::decode(body)?),
        kind::HEARTBEAT => Message::Heartbeat,
        kind::SOFTWARE_VERSION => Message::SoftwareVersion(null_term_string(body)?),
        other => Message::Unknown {
            kind: other,
            data: body.to_vec(),
        },
    })
}

fn decode_u32(body: &[u8], name: &'static str) -> Result<u32, LinkError> {
    if body.len() < 4 {
        return Err(LinkError::TruncatedPayload {
            kind: name,
            expected: 4,
            actual: body.len(),
        });
    }
    Ok(u32::from_le_bytes(body[0..4].try_into().unwrap()))
}

/// Extract a null-terminated ASCII string, tolerating a missing
/// terminator and trailing padding.
fn null_term_string(body: &[u8]) -> Result<String, LinkError> {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    Ok(String::from_utf8(body[..end].to_vec())?)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::HEADER_LEN;
    use crate::protocol::messages::Open;
    use crate::protocol::types::{AudioCommand, MediaType, MultiTouchAction, PhoneType};

    #[test]
    fn heartbeat_frame_bytes() {
        let frame = marshal(&Message::Heartbeat).unwrap();
        assert_eq!(
            frame,
            vec![
                0xaa, 0x55, 0xaa, 0x55, // magic
                0x00, 0x00, 0x00, 0x00, // length 0
                0xaa, 0x00, 0x00, 0x00, // kind 0xaa
                0x55, 0xff, 0xff, 0xff, // kind ^ 0xFFFFFFFF
            ]
        );
    }

    #[test]
    fn header_roundtrip_for_registry_kinds() {
        let messages = [
            Message::Heartbeat,
            Message::Unplugged,
            Message::DisconnectPhone,
            Message::CloseDongle,
            Message::CarPlay(CarPlayCommand::WifiConnect),
            Message::Logo(LogoKind::Siri),
            Message::Touch(Touch {
                action: crate::protocol::types::TouchAction::Down,
                x: 5000,
                y: 5000,
                flags: 0,
            }),
            Message::SendFile(SendFile::with_i32("/tmp/charge_mode", 1)),
            Message::Open(Open {
                width: 800,
                height: 480,
                video_frame_rate: 30,
                format: 5,
                packet_max: 49152,
                i_box_version: 2,
                phone_work_mode: 2,
            }),
        ];

        for msg in messages {
            let frame = marshal(&msg).unwrap();
            let header = FrameHeader::decode(&frame[..HEADER_LEN]).unwrap();
            assert_eq!(header.kind, msg.kind().unwrap());
            assert_eq!(header.length as usize, frame.len() - HEADER_LEN);
        }
    }

    #[test]
    fn fixed_layout_decode_encode_idempotence() {
        // For fixed-layout kinds, re-encoding a decoded body must
        // reproduce the input bytes.
        let bodies: [(u32, Vec<u8>); 4] = [
            (kind::OPEN, {
                let mut b = Vec::new();
                for v in [800i32, 480, 30, 5, 49152, 2, 2] {
                    b.extend_from_slice(&v.to_le_bytes());
                }
                b
            }),
            (kind::PHASE, 7u32.to_le_bytes().to_vec()),
            (kind::CAR_PLAY, 1002u32.to_le_bytes().to_vec()),
            (kind::MANUFACTURER_INFO, {
                let mut b = 3i32.to_le_bytes().to_vec();
                b.extend_from_slice(&9i32.to_le_bytes());
                b
            }),
        ];

        for (msg_kind, body) in bodies {
            let decoded = decode_body(msg_kind, &body).unwrap();
            assert_eq!(encode_body(&decoded).unwrap(), body, "kind {msg_kind:#x}");
        }
    }

    #[test]
    fn video_decode_copies_and_parses_prefix() {
        let mut body = Vec::new();
        for v in [0i32, 0, 0, 3, 0] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        body.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let decoded = decode_body(kind::VIDEO_DATA, &body).unwrap();
        let Message::Video(video) = decoded else {
            panic!("expected VideoData");
        };
        assert_eq!(video.width, 0);
        assert_eq!(video.length, 3);
        assert_eq!(video.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);

        // Fresh allocation: clearing the source leaves the frame intact.
        body.clear();
        assert_eq!(video.data.len(), 4);
    }

    #[test]
    fn audio_variants_by_trailer_length() {
        let mut prefix = Vec::new();
        prefix.extend_from_slice(&2u32.to_le_bytes());
        prefix.extend_from_slice(&1.0f32.to_le_bytes());
        prefix.extend_from_slice(&1i32.to_le_bytes());

        let mut body = prefix.clone();
        body.push(AudioCommand::OutputStart as u8);
        let Message::Audio(a) = decode_body(kind::AUDIO_DATA, &body).unwrap() else {
            panic!()
        };
        assert_eq!(a.payload, AudioPayload::Command(AudioCommand::OutputStart));

        let mut body = prefix.clone();
        body.extend_from_slice(&100i32.to_le_bytes());
        let Message::Audio(a) = decode_body(kind::AUDIO_DATA, &body).unwrap() else {
            panic!()
        };
        assert_eq!(a.payload, AudioPayload::VolumeDuration(100));

        let mut body = prefix.clone();
        body.extend_from_slice(&vec![0u8; 64 - 12]);
        let Message::Audio(a) = decode_body(kind::AUDIO_DATA, &body).unwrap() else {
            panic!()
        };
        assert!(matches!(a.payload, AudioPayload::Pcm(ref p) if p.len() == 52));
    }

    #[test]
    fn multi_touch_splits_on_sixteen_bytes() {
        let points = vec![
            TouchPoint {
                x: 0.25,
                y: 0.5,
                action: MultiTouchAction::Down,
                id: 0,
            },
            TouchPoint {
                x: 0.75,
                y: 0.5,
                action: MultiTouchAction::Move,
                id: 1,
            },
        ];
        let body = encode_body(&Message::MultiTouch(points.clone())).unwrap();
        assert_eq!(body.len(), 32);

        let Message::MultiTouch(decoded) = decode_body(kind::MULTI_TOUCH, &body).unwrap() else {
            panic!()
        };
        assert_eq!(decoded, points);
    }

    #[test]
    fn null_terminated_string_kinds() {
        let Message::BluetoothDeviceName(name) =
            decode_body(kind::BLUETOOTH_DEVICE_NAME, b"AutoKit\x00").unwrap()
        else {
            panic!()
        };
        assert_eq!(name, "AutoKit");

        // Missing terminator is tolerated.
        let Message::WifiDeviceName(name) =
            decode_body(kind::WIFI_DEVICE_NAME, b"AutoKit-5G").unwrap()
        else {
            panic!()
        };
        assert_eq!(name, "AutoKit-5G");

        // Fixed 32-byte field with NUL padding.
        let mut version = b"2021.10.11.1".to_vec();
        version.resize(32, 0);
        let Message::SoftwareVersion(v) = decode_body(kind::SOFTWARE_VERSION, &version).unwrap()
        else {
            panic!()
        };
        assert_eq!(v, "2021.10.11.1");
    }

    #[test]
    fn media_data_variants() {
        let mut body = 1u32.to_le_bytes().to_vec();
        body.extend_from_slice(b"{\"MediaSongName\":\"x\"}\x00");
        let Message::Media(media) = decode_body(kind::MEDIA_DATA, &body).unwrap() else {
            panic!()
        };
        assert_eq!(media.media_type, MediaType::Data);
        assert_eq!(&media.info[..1], b"{");

        let mut body = 3u32.to_le_bytes().to_vec();
        body.extend_from_slice(&[0xFF, 0xD8, 0xFF]);
        let Message::Media(media) = decode_body(kind::MEDIA_DATA, &body).unwrap() else {
            panic!()
        };
        assert_eq!(media.media_type, MediaType::AlbumCover);
        assert_eq!(media.info, vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let decoded = decode_body(0x42, &[1, 2, 3]).unwrap();
        assert_eq!(
            decoded,
            Message::Unknown {
                kind: 0x42,
                data: vec![1, 2, 3],
            }
        );
        // ... but it cannot be marshalled back.
        assert!(matches!(
            marshal(&decoded),
            Err(LinkError::EncodeUnknownKind(0x42))
        ));
    }

    #[test]
    fn open_code_decodes_as_opened() {
        let body = Open {
            width: 800,
            height: 480,
            video_frame_rate: 30,
            format: 5,
            packet_max: 49152,
            i_box_version: 2,
            phone_work_mode: 2,
        }
        .encode();
        let decoded = decode_body(kind::OPEN, &body).unwrap();
        assert!(matches!(decoded, Message::Opened(o) if o.width == 800 && o.fps == 30));
    }

    #[test]
    fn plugged_decodes_phone_type() {
        let body = 3u32.to_le_bytes().to_vec();
        let Message::Plugged(p) = decode_body(kind::PLUGGED, &body).unwrap() else {
            panic!()
        };
        assert_eq!(p.phone_type, PhoneType::CarPlay);
    }
}
