//! Dongle session configuration.
//!
//! A `DongleConfig` is assembled once, handed to the session, and treated
//! as immutable from then on — the only post-handshake mutation is the
//! Android-work-mode auto-enable flip, which lives on the session itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::types::{CarPlayCommand, HandDrive, PhoneType};

// ── WifiBand / MicSource ─────────────────────────────────────────

/// Which WiFi band the dongle should advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WifiBand {
    #[serde(rename = "2.4ghz")]
    Band24,
    #[default]
    #[serde(rename = "5ghz")]
    Band5,
}

/// Where microphone audio is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MicSource {
    /// The dongle's own microphone path.
    #[serde(rename = "box")]
    Box,
    /// The host OS captures and forwards audio.
    #[default]
    #[serde(rename = "os")]
    Os,
}

// ── PhoneTypeConfig ──────────────────────────────────────────────

/// Per-phone-type overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhoneTypeConfig {
    /// Keyframe request interval in milliseconds, if the phone type
    /// needs periodic refreshes.
    pub frame_interval: Option<i32>,
}

// ── DongleConfig ─────────────────────────────────────────────────

/// Everything the cold-start handshake sends to the dongle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DongleConfig {
    pub android_work_mode: bool,
    /// Auto-enable Android work mode when an Android device plugs in.
    pub auto_detect_android_mode: bool,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub dpi: i32,
    pub format: i32,
    pub i_box_version: i32,
    pub packet_max: i32,
    pub phone_work_mode: i32,
    pub night_mode: bool,
    pub box_name: String,
    pub hand: HandDrive,
    /// Delay applied to media audio, in milliseconds.
    pub media_delay: i32,
    pub audio_transfer_mode: bool,
    pub wifi_type: WifiBand,
    /// Explicit WiFi channel; 0 picks the band default.
    pub wifi_channel: i32,
    pub mic_type: MicSource,
    /// Keyed by the wire phone-type code.
    pub phone_config: BTreeMap<u32, PhoneTypeConfig>,
}

impl Default for DongleConfig {
    fn default() -> Self {
        let mut phone_config = BTreeMap::new();
        phone_config.insert(
            PhoneType::CarPlay as u32,
            PhoneTypeConfig {
                frame_interval: Some(5000),
            },
        );
        phone_config.insert(
            PhoneType::AndroidAuto as u32,
            PhoneTypeConfig {
                frame_interval: None,
            },
        );

        Self {
            android_work_mode: false,
            auto_detect_android_mode: true,
            width: 800,
            height: 480,
            fps: 60,
            dpi: 140,
            format: 5,
            i_box_version: 2,
            packet_max: 49152,
            phone_work_mode: 2,
            night_mode: true,
            box_name: "goCarPlay".to_string(),
            hand: HandDrive::Left,
            media_delay: 1000,
            audio_transfer_mode: false,
            wifi_type: WifiBand::Band5,
            wifi_channel: 36,
            mic_type: MicSource::Os,
            phone_config,
        }
    }
}

impl DongleConfig {
    /// Effective WiFi channel: the explicit setting, else the band
    /// default (36 on 5 GHz, 1 on 2.4 GHz).
    pub fn effective_wifi_channel(&self) -> i32 {
        if self.wifi_channel > 0 {
            return self.wifi_channel;
        }
        match self.wifi_type {
            WifiBand::Band5 => 36,
            WifiBand::Band24 => 1,
        }
    }

    /// The band-select command for the handshake.
    pub fn wifi_command(&self) -> CarPlayCommand {
        match self.wifi_type {
            WifiBand::Band5 => CarPlayCommand::Wifi5g,
            WifiBand::Band24 => CarPlayCommand::Wifi24g,
        }
    }

    /// The microphone-routing command for the handshake.
    pub fn mic_command(&self) -> CarPlayCommand {
        match self.mic_type {
            MicSource::Box => CarPlayCommand::BoxMicrophone,
            MicSource::Os => CarPlayCommand::CarMicrophone,
        }
    }

    /// The audio-transfer command for the handshake.
    pub fn audio_transfer_command(&self) -> CarPlayCommand {
        if self.audio_transfer_mode {
            CarPlayCommand::AudioTransferOn
        } else {
            CarPlayCommand::AudioTransferOff
        }
    }

    /// Keyframe interval override for a phone type, if configured.
    pub fn frame_interval(&self, phone_type: PhoneType) -> Option<i32> {
        self.phone_config
            .get(&(phone_type as u32))
            .and_then(|c| c.frame_interval)
    }
}

// ── Tests ────────────────────────────────────────────────────────
