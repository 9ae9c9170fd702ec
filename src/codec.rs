/*
    Copyright (C) 2019  John Goerzen <jgoerzen@complete.org

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <http://www.gnu.org/licenses/>.

*/


//! Over-the-air frame layout for the SX126x fixed-point transmission
//! mode.  Every outbound frame starts with a six byte header:
//!
//! ```text
//! dest_hi dest_lo dest_offset src_hi src_lo src_offset payload...
//! ```
//!
//! Addresses are big-endian.  Offsets are the channel relative to the
//! start of the band the frequency lives in.

use crate::error::{ConsoleError, Result};

pub const HEADER_LEN: usize = 6;

/// Address that every node accepts frames from, and that accepts frames
/// from every node on the same channel.
pub const BROADCAST_ADDRESS: u16 = 0xFFFF;

/// Offset of the 868.125 MHz channel used for telemetry.
pub const TELEMETRY_OFFSET: u8 = 18;

/// Source offset stamped on telemetry frames.  Peers expect this fixed
/// value rather than the sender's own channel.
pub const TELEMETRY_SOURCE_OFFSET: u8 = 12;

pub const HIGH_BAND_BASE_MHZ: u16 = 850;
pub const LOW_BAND_BASE_MHZ: u16 = 410;

const LOW_BAND_TOP_MHZ: u16 = 493;
const HIGH_BAND_TOP_MHZ: u16 = 930;

/// The start of the band `freq_mhz` is measured from.
pub fn band_base(freq_mhz: u16) -> u16 {
    if freq_mhz >= HIGH_BAND_BASE_MHZ {
        HIGH_BAND_BASE_MHZ
    } else {
        LOW_BAND_BASE_MHZ
    }
}

/// Converts a frequency in MHz to the one-byte channel offset used on
/// the air.  Frequencies outside 410-493 and 850-930 MHz are refused
/// rather than wrapped.
pub fn to_offset(freq_mhz: u16) -> Result<u8> {
    let supported = (LOW_BAND_BASE_MHZ..=LOW_BAND_TOP_MHZ).contains(&freq_mhz)
        || (HIGH_BAND_BASE_MHZ..=HIGH_BAND_TOP_MHZ).contains(&freq_mhz);
    if !supported {
        return Err(ConsoleError::config(format!(
            "frequency {} MHz is outside the supported bands ({}-{} and {}-{} MHz)",
            freq_mhz, LOW_BAND_BASE_MHZ, LOW_BAND_TOP_MHZ, HIGH_BAND_BASE_MHZ, HIGH_BAND_TOP_MHZ
        )));
    }
    let offset = freq_mhz - band_base(freq_mhz);
    if offset > u16::from(u8::MAX) {
        return Err(ConsoleError::config(format!(
            "frequency {} MHz gives offset {}, which does not fit in a byte",
            freq_mhz, offset
        )));
    }
    Ok(offset as u8)
}

/// A node as configured: its address and the frequency it listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    pub address: u16,
    pub frequency_mhz: u16,
}

impl NodeIdentity {
    pub fn new(address: u16, frequency_mhz: u16) -> NodeIdentity {
        NodeIdentity { address, frequency_mhz }
    }

    /// The address and channel offset to put on the air for this node.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Ok(Endpoint {
            address: self.address,
            offset: to_offset(self.frequency_mhz)?,
        })
    }
}

/// One side of a frame header: an address and a validated offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub address: u16,
    pub offset: u8,
}

impl Endpoint {
    pub const TELEMETRY: Endpoint = Endpoint {
        address: BROADCAST_ADDRESS,
        offset: TELEMETRY_OFFSET,
    };

    pub const TELEMETRY_SOURCE: Endpoint = Endpoint {
        address: BROADCAST_ADDRESS,
        offset: TELEMETRY_SOURCE_OFFSET,
    };
}

/// The fixed part of an outbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub dest: Endpoint,
    pub src: Endpoint,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let dest = self.dest.address.to_be_bytes();
        let src = self.src.address.to_be_bytes();
        [dest[0], dest[1], self.dest.offset, src[0], src[1], self.src.offset]
    }

    /// Splits a full frame back into its header and payload.  None if the
    /// frame is too short to hold a header.
    pub fn parse(frame: &[u8]) -> Option<(Header, &[u8])> {
        if frame.len() < HEADER_LEN {
            return None;
        }
        let header = Header {
            dest: Endpoint {
                address: u16::from_be_bytes([frame[0], frame[1]]),
                offset: frame[2],
            },
            src: Endpoint {
                address: u16::from_be_bytes([frame[3], frame[4]]),
                offset: frame[5],
            },
        };
        Some((header, &frame[HEADER_LEN..]))
    }
}

/// Builds an outbound frame.  The payload is copied verbatim after the
/// header; any byte sequence, including an empty one, is accepted.
pub fn encode(dest_addr: u16, dest_offset: u8, src_addr: u16, src_offset: u8, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        dest: Endpoint { address: dest_addr, offset: dest_offset },
        src: Endpoint { address: src_addr, offset: src_offset },
    };
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Same as [`encode`], taking both ends as endpoints.
pub fn encode_to(dest: Endpoint, src: Endpoint, payload: &[u8]) -> Vec<u8> {
    encode(dest.address, dest.offset, src.address, src.offset, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_frame() {
        let frame = encode(1, 2, 3, 4, b"hi");
        assert_eq!(frame, vec![0x00, 0x01, 0x02, 0x00, 0x03, 0x04, b'h', b'i']);
    }

    #[test]
    fn empty_payload_is_just_the_header() {
        let frame = encode(0xABCD, 7, 0x0102, 9, b"");
        assert_eq!(frame, vec![0xAB, 0xCD, 7, 0x01, 0x02, 9]);
    }

    #[test]
    fn address_split_is_high_byte_first() {
        for addr in (0..=u16::MAX).step_by(257).chain(std::iter::once(u16::MAX)) {
            let frame = encode(addr, 0, addr, 0, &[]);
            assert_eq!(frame[0], (addr >> 8) as u8);
            assert_eq!(frame[1], (addr & 0xFF) as u8);
            assert_eq!((u16::from(frame[3]) << 8) | u16::from(frame[4]), addr);
        }
    }

    #[test]
    fn payload_is_opaque() {
        let payload = [0xFFu8, 0x00, 0xC0, 0x1B];
        let frame = encode(5, 6, 7, 8, &payload);
        let (header, rest) = Header::parse(&frame).unwrap();
        assert_eq!(rest, &payload);
        assert_eq!(header.dest, Endpoint { address: 5, offset: 6 });
        assert_eq!(header.src, Endpoint { address: 7, offset: 8 });
    }

    #[test]
    fn parse_rejects_short_frames() {
        assert!(Header::parse(&[1, 2, 3, 4, 5]).is_none());
    }

    #[test]
    fn offsets_for_supported_bands() {
        assert_eq!(to_offset(410).unwrap(), 0);
        assert_eq!(to_offset(433).unwrap(), 23);
        assert_eq!(to_offset(493).unwrap(), 83);
        assert_eq!(to_offset(850).unwrap(), 0);
        assert_eq!(to_offset(868).unwrap(), TELEMETRY_OFFSET);
        assert_eq!(to_offset(930).unwrap(), 80);
        for f in (410..=493).chain(850..=930) {
            assert!(to_offset(f).is_ok(), "{} MHz", f);
        }
    }

    #[test]
    fn out_of_band_frequencies_are_config_errors() {
        for f in &[0u16, 409, 494, 600, 700, 849, 931, 2400] {
            match to_offset(*f) {
                Err(ConsoleError::Config(_)) => {}
                other => panic!("{} MHz gave {:?}", f, other),
            }
        }
    }

    #[test]
    fn telemetry_header_bytes() {
        let frame = encode_to(Endpoint::TELEMETRY, Endpoint::TELEMETRY_SOURCE, b"");
        assert_eq!(frame, vec![0xFF, 0xFF, 0x12, 0xFF, 0xFF, 0x0C]);
    }

    #[test]
    fn identity_endpoint() {
        let ep = NodeIdentity::new(0x0102, 915).endpoint().unwrap();
        assert_eq!(ep, Endpoint { address: 0x0102, offset: 65 });
        assert!(NodeIdentity::new(1, 500).endpoint().is_err());
    }
}
