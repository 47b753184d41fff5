//! Domain-specific error types for the dongle link.
//!
//! All fallible operations return `Result<T, LinkError>`.
//! Framing errors are terminal for a session — the codec never resyncs;
//! the hotplug monitor is the authority for tearing the link down.

use thiserror::Error;

/// The canonical error type for the carlink bridge.
#[derive(Debug, Error)]
pub enum LinkError {
    // ── Transport Errors ─────────────────────────────────────────
    /// Send or receive was called without open endpoints.
    #[error("not connected to a dongle")]
    NotConnected,

    /// Enumeration found no dongle after the retry budget was spent.
    #[error("no compatible dongle device found")]
    DeviceNotFound,

    /// A bulk transfer failed in the USB stack.
    #[error("usb transfer error: {0}")]
    UsbIo(#[from] nusb::transfer::TransferError),

    /// Opening or claiming the device failed.
    #[error("usb device error: {0}")]
    Usb(#[from] std::io::Error),

    /// A cancellation token was raised while a transfer was pending.
    /// Non-alarming; signals clean shutdown.
    #[error("operation cancelled")]
    Cancelled,

    // ── Framing Errors ───────────────────────────────────────────
    /// The frame header does not start with the magic word.
    #[error("invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    /// The header's type cross-check failed (`kind ^ check != 0xFFFFFFFF`).
    #[error("invalid type cross-check: kind {kind:#x}, check {check:#x}")]
    InvalidType { kind: u32, check: u32 },

    /// A payload body was shorter than its fixed layout requires.
    #[error("truncated {kind} payload: {actual} bytes (need {expected})")]
    TruncatedPayload {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Marshal was called on a message with no registry code
    /// (an `Unknown` record). Programmer error.
    #[error("cannot encode message without a registered type code: {0:#x}")]
    EncodeUnknownKind(u32),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u32 },

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON encoding of a settings or media payload failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Channel Errors ───────────────────────────────────────────
    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl LinkError {
    /// Returns `true` for the clean-shutdown error.
    ///
    /// Callers use this to distinguish deliberate teardown from I/O
    /// failure when a receive loop exits.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LinkError::Cancelled)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LinkError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = LinkError::InvalidMagic(0xdeadbeef);
        assert!(e.to_string().contains("0xdeadbeef"));

        let e = LinkError::InvalidType {
            kind: 0x06,
            check: 0x0,
        };
        assert!(e.to_string().contains("cross-check"));

        let e = LinkError::TruncatedPayload {
            kind: "VideoData",
            expected: 20,
            actual: 7,
        };
        assert!(e.to_string().contains("VideoData"));
        assert!(e.to_string().contains("20"));
    }

    #[test]
    fn cancelled_is_recognised() {
        assert!(LinkError::Cancelled.is_cancelled());
        assert!(!LinkError::NotConnected.is_cancelled());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: LinkError = io_err.into();
        assert!(matches!(e, LinkError::Usb(_)));
    }
}
