//! The 16-byte frame header every bus message starts with.
//!
//! ## Wire format (little-endian)
//!
//! ```text
//! magic:   u32  (4)  always 0x55AA55AA
//! length:  u32  (4)  payload byte count
//! kind:    u32  (4)  message type code
//! check:   u32  (4)  kind ^ 0xFFFFFFFF
//! ```
//!
//! A frame failing either the magic check or the XOR cross-check is
//! invalid; the stream position is considered poisoned and the caller
//! must tear the session down rather than resync.

use crate::error::LinkError;

/// Magic word opening every frame.
pub const MAGIC: u32 = 0x55AA_55AA;

/// Encoded header size on the wire.
pub const HEADER_LEN: usize = 16;

// ── FrameHeader ──────────────────────────────────────────────────

/// Parsed view of the fixed leading chunk of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload byte count (the header itself excluded).
    pub length: u32,
    /// Message type code.
    pub kind: u32,
}

impl FrameHeader {
    /// Build a header for a payload of `length` bytes with type `kind`.
    pub fn new(kind: u32, length: u32) -> Self {
        Self { length, kind }
    }

    /// Serialize to the 16-byte wire layout.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.kind.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.kind ^ 0xFFFF_FFFF).to_le_bytes());
        buf
    }

    /// Parse and validate a 16-byte header.
    ///
    /// Fails with [`LinkError::InvalidMagic`] or [`LinkError::InvalidType`];
    /// either failure poisons the stream position.
    pub fn decode(data: &[u8]) -> Result<Self, LinkError> {
        if data.len() < HEADER_LEN {
            return Err(LinkError::TruncatedPayload {
                kind: "FrameHeader",
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(LinkError::InvalidMagic(magic));
        }

        let length = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let kind = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let check = u32::from_le_bytes(data[12..16].try_into().unwrap());
        if kind ^ 0xFFFF_FFFF != check {
            return Err(LinkError::InvalidType { kind, check });
        }

        Ok(Self { length, kind })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let hdr = FrameHeader::new(0x06, 1234);
        let encoded = hdr.encode();
        let decoded = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn xor_check_holds_for_all_kinds() {
        for kind in [0x01u32, 0x05, 0x06, 0x08, 0x99, 0xaa, 0xcc] {
            let encoded = FrameHeader::new(kind, 0).encode();
            let k = u32::from_le_bytes(encoded[8..12].try_into().unwrap());
            let n = u32::from_le_bytes(encoded[12..16].try_into().unwrap());
            assert_eq!(k ^ n, 0xFFFF_FFFF);
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = FrameHeader::new(0x06, 0).encode();
        encoded[0] = 0x00;
        assert!(matches!(
            FrameHeader::decode(&encoded),
            Err(LinkError::InvalidMagic(_))
        ));
    }

    #[test]
    fn rejects_bad_cross_check() {
        let mut encoded = FrameHeader::new(0x06, 0).encode();
        encoded[12] ^= 0xFF; // corrupt the check word
        assert!(matches!(
            FrameHeader::decode(&encoded),
            Err(LinkError::InvalidType { kind: 0x06, .. })
        ));
    }

    #[test]
    fn rejects_short_input() {
        assert!(FrameHeader::decode(&[0u8; 15]).is_err());
    }

    #[test]
    fn heartbeat_header_bytes() {
        // Known-good frame observed on the bus.
        let encoded = FrameHeader::new(0xaa, 0).encode();
        assert_eq!(
            encoded,
            [
                0xaa, 0x55, 0xaa, 0x55, // magic
                0x00, 0x00, 0x00, 0x00, // length
                0xaa, 0x00, 0x00, 0x00, // kind
                0x55, 0xff, 0xff, 0xff, // kind ^ 0xFFFFFFFF
            ]
        );
    }
}
