//! Bulk-transfer transport over the dongle's USB endpoints.
//!
//! Two wire quirks live here and must not be "fixed":
//!
//! - Every outbound frame is written as **two** bulk transfers — the
//!   16-byte header, then the body. The firmware does not accept a
//!   single combined transfer. Both writes happen under one lock so
//!   frames never interleave.
//! - Inbound framing is read-exact: 16 header bytes, validate, then
//!   exactly `length` body bytes. A failed validation poisons the
//!   stream position; there is no resync, the caller tears down.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use nusb::transfer::RequestBuffer;
use nusb::Interface;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::protocol::{decode_body, marshal, FrameHeader, Message, HEADER_LEN};
use crate::usb::{is_known_device, Transport, DEVICE_INTERFACE, ENDPOINT_IN, ENDPOINT_OUT};

/// Cold-start retry budget: the dongle can take a few seconds to
/// enumerate after power-up.
const COLD_START_RETRIES: u32 = 5;
const COLD_START_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Size of each bulk IN request. Matches the `packet_max` the session
/// advertises in `Open`; transfers shorter than the device's packet
/// would overflow.
const READ_CHUNK: usize = 49152;

// ── Enumeration ──────────────────────────────────────────────────

/// Is any known dongle currently enumerated on the bus?
pub fn device_present() -> bool {
    match nusb::list_devices() {
        Ok(mut devices) => {
            devices.any(|d| is_known_device(d.vendor_id(), d.product_id()))
        }
        Err(err) => {
            warn!("usb enumeration failed: {err}");
            false
        }
    }
}

// ── UsbTransport ─────────────────────────────────────────────────

/// Open endpoints to a single dongle.
///
/// Reads accumulate transfer payloads in an internal buffer so frames
/// can be consumed exactly, independent of how the device packs them
/// into transfers.
pub struct UsbTransport {
    /// `None` once closed. The nusb handles release the claim, the
    /// device, and the context in reverse order when dropped.
    interface: StdMutex<Option<Interface>>,
    /// Serializes the two-part frame write on the OUT endpoint.
    write_lock: Mutex<()>,
    /// Reader-side accumulator; single consumer by contract.
    read_buf: Mutex<Vec<u8>>,
}

impl UsbTransport {
    /// Open the first matching dongle with the cold-start retry budget
    /// (5 retries, 3 s apart).
    pub async fn open() -> Result<Self, LinkError> {
        Self::open_with_retries(COLD_START_RETRIES, COLD_START_RETRY_DELAY).await
    }

    /// Single open attempt, no retries. Used on hotplug attach, where
    /// presence was already confirmed by the monitor.
    pub async fn open_once() -> Result<Self, LinkError> {
        Self::open_with_retries(0, Duration::ZERO).await
    }

    /// Open with a configurable retry budget.
    pub async fn open_with_retries(
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, LinkError> {
        let mut remaining = max_retries;
        loop {
            match Self::try_open() {
                Ok(transport) => return Ok(transport),
                Err(LinkError::DeviceNotFound) if remaining > 0 => {
                    remaining -= 1;
                    debug!("dongle not found, retrying ({remaining} attempts remaining)");
                    tokio::time::sleep(retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn try_open() -> Result<Self, LinkError> {
        let device_info = nusb::list_devices()?
            .find(|d| is_known_device(d.vendor_id(), d.product_id()))
            .ok_or(LinkError::DeviceNotFound)?;

        info!(
            "found dongle {:04x}:{:04x}",
            device_info.vendor_id(),
            device_info.product_id()
        );

        let device = device_info.open()?;
        let interface = device.detach_and_claim_interface(DEVICE_INTERFACE)?;
        info!("claimed interface {DEVICE_INTERFACE}, endpoints IN={ENDPOINT_IN:#04x} OUT={ENDPOINT_OUT:#04x}");

        Ok(Self {
            interface: StdMutex::new(Some(interface)),
            write_lock: Mutex::new(()),
            read_buf: Mutex::new(Vec::new()),
        })
    }

    fn iface(&self) -> Result<Interface, LinkError> {
        self.interface
            .lock()
            .unwrap()
            .clone()
            .ok_or(LinkError::NotConnected)
    }

    /// Pull exactly `n` bytes off the IN endpoint, buffering any excess
    /// for the next call.
    async fn read_exact(
        &self,
        interface: &Interface,
        n: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, LinkError> {
        let mut pending = self.read_buf.lock().await;
        while pending.len() < n {
            let request = RequestBuffer::new(READ_CHUNK);
            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                completion = interface.bulk_in(ENDPOINT_IN, request) => completion,
            };
            let data = completion.into_result()?;
            pending.extend_from_slice(&data);
        }
        Ok(pending.drain(..n).collect())
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn send(&self, message: &Message) -> Result<(), LinkError> {
        let interface = self.iface()?;
        let frame = marshal(message)?;

        // Header and body are separate transfers; the lock spans both
        // so concurrent senders cannot interleave a frame.
        let _guard = self.write_lock.lock().await;
        interface
            .bulk_out(ENDPOINT_OUT, frame[..HEADER_LEN].to_vec())
            .await
            .into_result()?;
        if frame.len() > HEADER_LEN {
            interface
                .bulk_out(ENDPOINT_OUT, frame[HEADER_LEN..].to_vec())
                .await
                .into_result()?;
        }
        Ok(())
    }

    async fn recv(&self, cancel: &CancellationToken) -> Result<Message, LinkError> {
        let interface = self.iface()?;

        let header_bytes = self.read_exact(&interface, HEADER_LEN, cancel).await?;
        let header = FrameHeader::decode(&header_bytes)?;

        let body = if header.length > 0 {
            self.read_exact(&interface, header.length as usize, cancel)
                .await?
        } else {
            Vec::new()
        };

        decode_body(header.kind, &body)
    }

    async fn close(&self) {
        // Dropping the Interface releases the claim, then the device,
        // then the context. Subsequent send/recv see NotConnected.
        let released = self.interface.lock().unwrap().take();
        if released.is_some() {
            info!("usb transport closed");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
