//! Packet layout and header codec.
//!
//! A stream file is a bare concatenation of packets with no file header,
//! footer, magic number, checksum or index:
//!
//! ```text
//! ┌───────────────────────────┐
//! │ timestamp  (f32, seconds) │
//! │ length     (u64 | usize)  │  width and byte order depend on layout
//! │ payload    (length bytes) │  opaque, never interpreted
//! ├───────────────────────────┤
//! │ next packet ...           │
//! └───────────────────────────┘
//! ```
//!
//! Two layouts exist. [`PacketLayout::Portable`] pins both fields to
//! little-endian with a 64-bit length and is used for new recordings.
//! [`PacketLayout::Native`] uses the host byte order and word size, which
//! is what the legacy capture tool wrote.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// Header size of the portable layout (f32 + u64)
pub const PORTABLE_HEADER_SIZE: usize = 4 + 8;

/// Header size of the native layout on this host (f32 + usize)
pub const NATIVE_HEADER_SIZE: usize = 4 + std::mem::size_of::<usize>();

/// Largest header of any layout
pub const MAX_HEADER_SIZE: usize = PORTABLE_HEADER_SIZE;

/// Byte layout of a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PacketLayout {
    /// `[f32 LE][u64 LE]`, identical on every platform
    #[default]
    Portable,
    /// `[f32 native][usize native]`, only readable on a matching host
    Native,
}

impl PacketLayout {
    /// Number of header bytes preceding each payload.
    pub const fn header_size(self) -> usize {
        match self {
            PacketLayout::Portable => PORTABLE_HEADER_SIZE,
            PacketLayout::Native => NATIVE_HEADER_SIZE,
        }
    }

    /// Encode a header into `buf`, returning the used prefix.
    pub fn encode_header<'a>(
        self,
        header: &PacketHeader,
        buf: &'a mut [u8; MAX_HEADER_SIZE],
    ) -> &'a [u8] {
        match self {
            PacketLayout::Portable => {
                buf[0..4].copy_from_slice(&header.timestamp.to_le_bytes());
                buf[4..12].copy_from_slice(&header.length.to_le_bytes());
            }
            PacketLayout::Native => {
                // Lengths come from in-memory slices, so they always fit a usize
                let length = header.length as usize;
                buf[0..4].copy_from_slice(&header.timestamp.to_ne_bytes());
                buf[4..NATIVE_HEADER_SIZE].copy_from_slice(&length.to_ne_bytes());
            }
        }
        &buf[..self.header_size()]
    }

    /// Decode a header from the first `header_size()` bytes of `buf`.
    ///
    /// Returns `None` if `buf` is too short to hold a header.
    pub fn decode_header(self, buf: &[u8]) -> Option<PacketHeader> {
        if buf.len() < self.header_size() {
            return None;
        }

        let (ts, len) = buf.split_at(4);
        let ts: [u8; 4] = ts.try_into().ok()?;

        match self {
            PacketLayout::Portable => {
                let len: [u8; 8] = len[..8].try_into().ok()?;
                Some(PacketHeader {
                    timestamp: f32::from_le_bytes(ts),
                    length: u64::from_le_bytes(len),
                })
            }
            PacketLayout::Native => {
                let len: [u8; std::mem::size_of::<usize>()] =
                    len[..std::mem::size_of::<usize>()].try_into().ok()?;
                Some(PacketHeader {
                    timestamp: f32::from_ne_bytes(ts),
                    length: usize::from_ne_bytes(len) as u64,
                })
            }
        }
    }

    /// Write a header to `writer`.
    pub fn write_header<W: Write>(self, writer: &mut W, header: &PacketHeader) -> io::Result<()> {
        let mut buf = [0u8; MAX_HEADER_SIZE];
        writer.write_all(self.encode_header(header, &mut buf))
    }
}

impl std::fmt::Display for PacketLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketLayout::Portable => write!(f, "portable"),
            PacketLayout::Native => write!(f, "native"),
        }
    }
}

/// Fixed-size prefix of every packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    /// Seconds since the start of the recording
    pub timestamp: f32,
    /// Payload length in bytes
    pub length: u64,
}

/// One timestamped record of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub timestamp: f32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(timestamp: f32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
        }
    }

    /// Header describing this packet.
    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            timestamp: self.timestamp,
            length: self.payload.len() as u64,
        }
    }

    /// Bytes this packet occupies on disk with the given layout.
    pub fn encoded_size(&self, layout: PacketLayout) -> u64 {
        (layout.header_size() + self.payload.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_header_bytes() {
        let header = PacketHeader {
            timestamp: 1.5,
            length: 3,
        };

        let mut buf = [0u8; MAX_HEADER_SIZE];
        let bytes = PacketLayout::Portable.encode_header(&header, &mut buf);

        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[4..12], &[3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_native_header_matches_host() {
        let header = PacketHeader {
            timestamp: 2.25,
            length: 513,
        };

        let mut buf = [0u8; MAX_HEADER_SIZE];
        let bytes = PacketLayout::Native.encode_header(&header, &mut buf);

        assert_eq!(bytes.len(), NATIVE_HEADER_SIZE);
        assert_eq!(&bytes[0..4], &2.25f32.to_ne_bytes());
        assert_eq!(&bytes[4..], &513usize.to_ne_bytes());
        assert_eq!(PacketLayout::Native.decode_header(bytes), Some(header));
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(PacketLayout::Portable.decode_header(&[0u8; 11]), None);
        assert_eq!(
            PacketLayout::Native.decode_header(&vec![0u8; NATIVE_HEADER_SIZE - 1]),
            None
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = Vec::new();
        PacketLayout::Portable
            .write_header(
                &mut bytes,
                &PacketHeader {
                    timestamp: 0.5,
                    length: 7,
                },
            )
            .unwrap();
        bytes.extend_from_slice(b"payload");

        let header = PacketLayout::Portable.decode_header(&bytes).unwrap();
        assert_eq!(header.timestamp, 0.5);
        assert_eq!(header.length, 7);
    }

    #[test]
    fn test_encoded_size() {
        let packet = Packet::new(0.0, b"abc".to_vec());
        assert_eq!(packet.encoded_size(PacketLayout::Portable), 15);
        assert_eq!(
            packet.encoded_size(PacketLayout::Native),
            (NATIVE_HEADER_SIZE + 3) as u64
        );
    }
}
