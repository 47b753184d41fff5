//! Closed protocol enums and constant tables.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.
//! Every discriminant comes straight off the dongle's wire protocol.

use std::fmt;

use crate::error::LinkError;

// ── CarPlayCommand ───────────────────────────────────────────────

/// Command codes carried by a `CarPlay` control frame (type 0x08).
///
/// Codes below 1000 are host → dongle requests; 1000-and-up codes are
/// used in both directions (the dongle reports pairing progress with
/// them).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarPlayCommand {
    Invalid = 0,
    StartRecordAudio = 1,
    StopRecordAudio = 2,
    RequestHostUi = 3,
    BtnSiri = 5,
    CarMicrophone = 7,
    Frame = 12,
    BoxMicrophone = 15,
    EnableNightMode = 16,
    DisableNightMode = 17,
    AudioTransferOn = 22,
    AudioTransferOff = 23,
    Wifi24g = 24,
    Wifi5g = 25,
    BtnLeft = 100,
    BtnRight = 101,
    BtnSelectDown = 104,
    BtnSelectUp = 105,
    BtnBack = 106,
    BtnUp = 113,
    BtnDown = 114,
    BtnHome = 200,
    BtnPlay = 201,
    BtnPause = 202,
    BtnPlayOrPause = 203,
    BtnNextTrack = 204,
    BtnPrevTrack = 205,
    AcceptPhoneCall = 300,
    RejectPhoneCall = 301,
    RequestVideoFocus = 500,
    ReleaseVideoFocus = 501,
    SupportWifi = 1000,
    AutoConnectEnable = 1001,
    WifiConnect = 1002,
    ScanningDevice = 1003,
    DeviceFound = 1004,
    DeviceNotFound = 1005,
    ConnectDeviceFailed = 1006,
    BtConnected = 1007,
    BtDisconnected = 1008,
    WifiConnected = 1009,
    WifiDisconnected = 1010,
    BtPairStart = 1011,
    SupportWifiNeedKo = 1012,
}

impl TryFrom<u32> for CarPlayCommand {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use CarPlayCommand::*;
        Ok(match value {
            0 => Invalid,
            1 => StartRecordAudio,
            2 => StopRecordAudio,
            3 => RequestHostUi,
            5 => BtnSiri,
            7 => CarMicrophone,
            12 => Frame,
            15 => BoxMicrophone,
            16 => EnableNightMode,
            17 => DisableNightMode,
            22 => AudioTransferOn,
            23 => AudioTransferOff,
            24 => Wifi24g,
            25 => Wifi5g,
            100 => BtnLeft,
            101 => BtnRight,
            104 => BtnSelectDown,
            105 => BtnSelectUp,
            106 => BtnBack,
            113 => BtnUp,
            114 => BtnDown,
            200 => BtnHome,
            201 => BtnPlay,
            202 => BtnPause,
            203 => BtnPlayOrPause,
            204 => BtnNextTrack,
            205 => BtnPrevTrack,
            300 => AcceptPhoneCall,
            301 => RejectPhoneCall,
            500 => RequestVideoFocus,
            501 => ReleaseVideoFocus,
            1000 => SupportWifi,
            1001 => AutoConnectEnable,
            1002 => WifiConnect,
            1003 => ScanningDevice,
            1004 => DeviceFound,
            1005 => DeviceNotFound,
            1006 => ConnectDeviceFailed,
            1007 => BtConnected,
            1008 => BtDisconnected,
            1009 => WifiConnected,
            1010 => WifiDisconnected,
            1011 => BtPairStart,
            1012 => SupportWifiNeedKo,
            _ => {
                return Err(LinkError::UnknownVariant {
                    type_name: "CarPlayCommand",
                    value,
                })
            }
        })
    }
}

impl fmt::Display for CarPlayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Touch actions ────────────────────────────────────────────────

/// Single-touch action codes (type 0x05 frames).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchAction {
    Down = 14,
    Move = 15,
    Up = 16,
}

impl TryFrom<u32> for TouchAction {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            14 => Ok(TouchAction::Down),
            15 => Ok(TouchAction::Move),
            16 => Ok(TouchAction::Up),
            _ => Err(LinkError::UnknownVariant {
                type_name: "TouchAction",
                value,
            }),
        }
    }
}

/// Multi-touch action codes. Distinct from [`TouchAction`] — the dongle
/// uses a different numbering for the multi-point form.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiTouchAction {
    Up = 0,
    Down = 1,
    Move = 2,
}

impl TryFrom<u32> for MultiTouchAction {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MultiTouchAction::Up),
            1 => Ok(MultiTouchAction::Down),
            2 => Ok(MultiTouchAction::Move),
            _ => Err(LinkError::UnknownVariant {
                type_name: "MultiTouchAction",
                value,
            }),
        }
    }
}

// ── PhoneType ────────────────────────────────────────────────────

/// Projection protocol the plugged phone speaks.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhoneType {
    AndroidMirror = 1,
    CarPlay = 3,
    IPhoneMirror = 4,
    AndroidAuto = 5,
    HiCar = 6,
}

impl PhoneType {
    /// Android-family devices, eligible for Android work mode.
    pub fn is_android(self) -> bool {
        matches!(self, PhoneType::AndroidAuto | PhoneType::AndroidMirror)
    }
}

impl TryFrom<u32> for PhoneType {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PhoneType::AndroidMirror),
            3 => Ok(PhoneType::CarPlay),
            4 => Ok(PhoneType::IPhoneMirror),
            5 => Ok(PhoneType::AndroidAuto),
            6 => Ok(PhoneType::HiCar),
            _ => Err(LinkError::UnknownVariant {
                type_name: "PhoneType",
                value,
            }),
        }
    }
}

impl fmt::Display for PhoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhoneType::AndroidMirror => write!(f, "AndroidMirror"),
            PhoneType::CarPlay => write!(f, "CarPlay"),
            PhoneType::IPhoneMirror => write!(f, "iPhoneMirror"),
            PhoneType::AndroidAuto => write!(f, "AndroidAuto"),
            PhoneType::HiCar => write!(f, "HiCar"),
        }
    }
}

// ── MediaType / LogoKind / HandDrive ─────────────────────────────

/// Discriminant of a `MediaData` (type 0x2a) frame body.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// Structured track info, usually null-terminated JSON.
    Data = 1,
    /// Raw album-cover image bytes.
    AlbumCover = 3,
}

impl TryFrom<u32> for MediaType {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MediaType::Data),
            3 => Ok(MediaType::AlbumCover),
            _ => Err(LinkError::UnknownVariant {
                type_name: "MediaType",
                value,
            }),
        }
    }
}

/// Logo selection for the dongle's idle screen (type 0x09).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogoKind {
    HomeButton = 1,
    Siri = 2,
}

impl TryFrom<u32> for LogoKind {
    type Error = LinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(LogoKind::HomeButton),
            2 => Ok(LogoKind::Siri),
            _ => Err(LinkError::UnknownVariant {
                type_name: "LogoKind",
                value,
            }),
        }
    }
}

/// Which side the steering wheel is on. Affects UI mirroring.
#[repr(u32)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HandDrive {
    #[default]
    Left = 0,
    Right = 1,
}

// ── Audio tables ─────────────────────────────────────────────────

/// One-byte audio stream commands carried in the `AudioData` trailer.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCommand {
    OutputStart = 0x01,
    OutputStop = 0x02,
    InputConfig = 0x03,
    PhonecallStart = 0x04,
    PhonecallStop = 0x05,
    NaviStart = 0x06,
    NaviStop = 0x07,
    SiriStart = 0x08,
    SiriStop = 0x09,
    MediaStart = 0x0a,
    MediaStop = 0x0b,
    AlertStart = 0x0c,
    AlertStop = 0x0d,
}

impl TryFrom<u8> for AudioCommand {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use AudioCommand::*;
        Ok(match value {
            0x01 => OutputStart,
            0x02 => OutputStop,
            0x03 => InputConfig,
            0x04 => PhonecallStart,
            0x05 => PhonecallStop,
            0x06 => NaviStart,
            0x07 => NaviStop,
            0x08 => SiriStart,
            0x09 => SiriStop,
            0x0a => MediaStart,
            0x0b => MediaStop,
            0x0c => AlertStart,
            0x0d => AlertStop,
            _ => {
                return Err(LinkError::UnknownVariant {
                    type_name: "AudioCommand",
                    value: value as u32,
                })
            }
        })
    }
}

/// PCM parameters implied by an `AudioData` decode type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub frequency: u32,
    pub channels: u16,
    pub bits: u16,
}

/// Map a decode-type code to its PCM format, `None` for codes the
/// dongle has never been observed to send.
pub fn audio_format(decode_type: u32) -> Option<AudioFormat> {
    let (frequency, channels, bits) = match decode_type {
        0 => (0, 0, 0),
        1 => (44100, 2, 16),
        2 => (48000, 2, 16),
        3 => (8000, 1, 16),
        4 => (48000, 2, 16),
        5 => (16000, 1, 16),
        6 => (24000, 1, 16),
        7 => (16000, 2, 16),
        _ => return None,
    };
    Some(AudioFormat {
        frequency,
        channels,
        bits,
    })
}

// ── Virtual file paths ───────────────────────────────────────────

/// Fixed paths inside the dongle's filesystem, written via `SendFile`.
pub mod file_path {
    pub const SCREEN_DPI: &str = "/tmp/screen_dpi";
    pub const NIGHT_MODE: &str = "/tmp/night_mode";
    pub const HAND_DRIVE_MODE: &str = "/tmp/hand_drive_mode";
    pub const CHARGE_MODE: &str = "/tmp/charge_mode";
    pub const BOX_NAME: &str = "/etc/box_name";
    pub const OEM_ICON: &str = "/etc/oem_icon.png";
    pub const AIRPLAY_CONFIG: &str = "/etc/airplay.conf";
    pub const ICON_120: &str = "/etc/icon_120x120.png";
    pub const ICON_180: &str = "/etc/icon_180x180.png";
    pub const ICON_256: &str = "/etc/icon_256x256.png";
    pub const ANDROID_WORK_MODE: &str = "/etc/android_work_mode";
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carplay_command_roundtrip() {
        let cmds = [
            CarPlayCommand::Invalid,
            CarPlayCommand::BtnSiri,
            CarPlayCommand::CarMicrophone,
            CarPlayCommand::Frame,
            CarPlayCommand::BoxMicrophone,
            CarPlayCommand::AudioTransferOn,
            CarPlayCommand::AudioTransferOff,
            CarPlayCommand::Wifi24g,
            CarPlayCommand::Wifi5g,
            CarPlayCommand::BtnHome,
            CarPlayCommand::AcceptPhoneCall,
            CarPlayCommand::RequestVideoFocus,
            CarPlayCommand::SupportWifi,
            CarPlayCommand::WifiConnect,
            CarPlayCommand::BtPairStart,
            CarPlayCommand::SupportWifiNeedKo,
        ];
        for cmd in cmds {
            assert_eq!(CarPlayCommand::try_from(cmd as u32).unwrap(), cmd);
        }
    }

    #[test]
    fn carplay_command_invalid() {
        assert!(CarPlayCommand::try_from(0xDEAD).is_err());
    }

    #[test]
    fn touch_actions_are_disjoint_numberings() {
        // The dongle really does use 14/15/16 for single touch and
        // 0/1/2 for multi-touch.
        assert_eq!(TouchAction::Down as u32, 14);
        assert_eq!(MultiTouchAction::Down as u32, 1);
        assert_eq!(TouchAction::try_from(15).unwrap(), TouchAction::Move);
        assert_eq!(
            MultiTouchAction::try_from(2).unwrap(),
            MultiTouchAction::Move
        );
        assert!(TouchAction::try_from(0).is_err());
    }

    #[test]
    fn phone_type_android_detection() {
        assert!(PhoneType::AndroidAuto.is_android());
        assert!(PhoneType::AndroidMirror.is_android());
        assert!(!PhoneType::CarPlay.is_android());
        assert!(!PhoneType::HiCar.is_android());
    }

    #[test]
    fn audio_format_table() {
        assert_eq!(
            audio_format(1),
            Some(AudioFormat {
                frequency: 44100,
                channels: 2,
                bits: 16
            })
        );
        assert_eq!(
            audio_format(5),
            Some(AudioFormat {
                frequency: 16000,
                channels: 1,
                bits: 16
            })
        );
        assert_eq!(audio_format(0).unwrap().frequency, 0);
        assert_eq!(audio_format(8), None);
    }

    #[test]
    fn audio_command_roundtrip() {
        for code in 0x01u8..=0x0d {
            let cmd = AudioCommand::try_from(code).unwrap();
            assert_eq!(cmd as u8, code);
        }
        assert!(AudioCommand::try_from(0x0e).is_err());
    }
}
