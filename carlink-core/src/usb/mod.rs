//! USB access to the dongle: device identity, the transport seam, and
//! the hotplug monitor.
//!
//! Known dongles (AutoKit / Carlinkit family):
//!
//! | VID    | PID    |
//! |--------|--------|
//! | 0x1314 | 0x1520 |
//! | 0x1314 | 0x1521 |
//!
//! All of them expose the protocol on interface 0, bulk endpoints
//! IN = 0x81 and OUT = 0x01. First match wins; one dongle per process.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LinkError;
use crate::protocol::Message;

pub mod hotplug;
pub mod transport;

pub use hotplug::{DeviceProbe, HotplugMonitor, UsbProbe};
pub use transport::UsbTransport;

// ── Device identity ──────────────────────────────────────────────

/// Vendor ID shared by every known dongle.
pub const VENDOR_ID: u16 = 0x1314;

/// Known product IDs.
pub const PRODUCT_IDS: &[u16] = &[0x1520, 0x1521];

/// Interface carrying the protocol endpoints.
pub const DEVICE_INTERFACE: u8 = 0;

/// Bulk IN endpoint address.
pub const ENDPOINT_IN: u8 = 0x81;

/// Bulk OUT endpoint address.
pub const ENDPOINT_OUT: u8 = 0x01;

/// Does a VID/PID pair belong to a supported dongle?
pub fn is_known_device(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && PRODUCT_IDS.contains(&product_id)
}

// ── Transport ────────────────────────────────────────────────────

/// The seam between the session orchestrator and the wire.
///
/// [`UsbTransport`] is the production implementation; tests drive the
/// orchestrator over in-memory fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Marshal and write one message. Writes are serialized; the frame
    /// goes out as two bulk transfers (16-byte header, then body).
    async fn send(&self, message: &Message) -> Result<(), LinkError>;

    /// Read and decode the next message. Blocks until a frame arrives,
    /// the transport closes, or `cancel` is raised
    /// ([`LinkError::Cancelled`]).
    async fn recv(&self, cancel: &CancellationToken) -> Result<Message, LinkError>;

    /// Release the endpoints and device claim. Idempotent.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_table() {
        assert!(is_known_device(0x1314, 0x1520));
        assert!(is_known_device(0x1314, 0x1521));
        assert!(!is_known_device(0x1314, 0x1522));
        assert!(!is_known_device(0x1d50, 0x1520));
    }
}
