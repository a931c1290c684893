//! The simulator's IP-like packet and its text wire formats.
//!
//! Datagrams are comma-delimited text. Three header layouts exist, one per
//! operating mode:
//!
//! - plain: `destIP,destPort,message`
//! - TTL-aware: `destIP,destPort,ttl,message`
//! - fragmentation-aware: `destIP,destPort,ttl,id,offset,size,flag,message`
//!
//! In the fragmentation layout, `size` is the total payload length of the
//! original unfragmented packet as an 8-digit zero-padded decimal, and `flag`
//! is `1` when more fragments follow. Only the header commas delimit; the
//! message itself may contain commas.

use crate::addr::{AddrParseError, RouterAddr};
use std::fmt::Write;
use thiserror::Error as ThisError;

/// Hop budget given to locally originated packets.
pub const DEFAULT_TTL: u8 = 20;

/// One IP-like packet. The wire carries the destination only; the reassembly
/// key is the `(dest, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dest: RouterAddr,
    pub ttl: u8,
    pub id: u16,
    /// Byte offset of `payload` within the original packet.
    pub offset: usize,
    /// Total payload length of the original packet.
    pub total: usize,
    /// Whether more fragments follow this one.
    pub more_fragments: bool,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Creates a whole, unfragmented packet.
    pub fn new(dest: RouterAddr, id: u16, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            dest,
            ttl: DEFAULT_TTL,
            id,
            offset: 0,
            total: payload.len(),
            more_fragments: false,
            payload,
        }
    }

    /// Whether this packet is a piece of a larger one and must go through
    /// reassembly before delivery.
    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.offset > 0
    }

    /// Serializes the packet in the given wire layout.
    pub fn to_wire(&self, format: WireFormat) -> Vec<u8> {
        let mut out = String::new();
        match format {
            WireFormat::Plain => {
                write!(out, "{},{},", self.dest.ip, self.dest.port).unwrap();
            }
            WireFormat::Ttl => {
                write!(out, "{},{},{},", self.dest.ip, self.dest.port, self.ttl).unwrap();
            }
            WireFormat::Fragmentation => {
                write!(
                    out,
                    "{},{},{},{},{},{:08},{},",
                    self.dest.ip,
                    self.dest.port,
                    self.ttl,
                    self.id,
                    self.offset,
                    self.total,
                    u8::from(self.more_fragments),
                )
                .unwrap();
            }
        }
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parses a datagram in the given wire layout.
    pub fn from_wire(datagram: &[u8], format: WireFormat) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(datagram).map_err(|_| ParseError::NotText)?;
        let header_fields = match format {
            WireFormat::Plain => 2,
            WireFormat::Ttl => 3,
            WireFormat::Fragmentation => 7,
        };
        let mut fields = text.splitn(header_fields + 1, ',');
        let mut next = || fields.next().ok_or(ParseError::TooFewFields);

        let ip = next()?.parse().map_err(ParseError::Addr)?;
        let port = next()?
            .parse()
            .map_err(|_| AddrParseError::Port)
            .map_err(ParseError::Addr)?;
        let dest = RouterAddr::new(ip, port);

        let ttl = match format {
            WireFormat::Plain => DEFAULT_TTL,
            _ => next()?.parse().map_err(|_| ParseError::Ttl)?,
        };

        let packet = match format {
            WireFormat::Fragmentation => {
                let id = next()?.parse().map_err(|_| ParseError::Id)?;
                let offset: usize = next()?.parse().map_err(|_| ParseError::Offset)?;
                let size: &str = next()?;
                if size.len() != 8 {
                    return Err(ParseError::SizeWidth);
                }
                let total = size.parse().map_err(|_| ParseError::Size)?;
                let more_fragments = match next()? {
                    "0" => false,
                    "1" => true,
                    _ => return Err(ParseError::Flag),
                };
                let payload = next()?.as_bytes().to_vec();
                // Checked: a huge wire offset must not wrap past the total.
                offset
                    .checked_add(payload.len())
                    .filter(|&end| end <= total)
                    .ok_or(ParseError::Overrun)?;
                Self {
                    dest,
                    ttl,
                    id,
                    offset,
                    total,
                    more_fragments,
                    payload,
                }
            }
            _ => {
                let payload: Vec<u8> = next()?.as_bytes().to_vec();
                Self {
                    dest,
                    ttl,
                    id: 0,
                    offset: 0,
                    total: payload.len(),
                    more_fragments: false,
                    payload,
                }
            }
        };
        Ok(packet)
    }
}

/// The header layout in use on the wire. Fixed per simulation, resolved from
/// the operating mode before any router starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Plain,
    Ttl,
    Fragmentation,
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("datagram is not valid utf-8")]
    NotText,
    #[error("datagram has too few comma-separated fields")]
    TooFewFields,
    #[error("invalid destination address: {0}")]
    Addr(AddrParseError),
    #[error("ttl field was not a number in 0..=255")]
    Ttl,
    #[error("id field was not a number in 0..=65535")]
    Id,
    #[error("offset field was not a number")]
    Offset,
    #[error("size field must be exactly 8 digits")]
    SizeWidth,
    #[error("size field was not a number")]
    Size,
    #[error("fragment flag must be 0 or 1")]
    Flag,
    #[error("fragment extends past the stated total size")]
    Overrun,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> RouterAddr {
        RouterAddr::localhost(8882)
    }

    #[test]
    fn plain_round_trip() {
        let packet = Packet::new(dest(), 0, *b"hello there");
        let wire = packet.to_wire(WireFormat::Plain);
        assert_eq!(wire, b"127.0.0.1,8882,hello there");
        assert_eq!(Packet::from_wire(&wire, WireFormat::Plain), Ok(packet));
    }

    #[test]
    fn ttl_round_trip() {
        let mut packet = Packet::new(dest(), 0, *b"hi");
        packet.ttl = 3;
        let wire = packet.to_wire(WireFormat::Ttl);
        assert_eq!(wire, b"127.0.0.1,8882,3,hi");
        assert_eq!(Packet::from_wire(&wire, WireFormat::Ttl), Ok(packet));
    }

    #[test]
    fn fragmentation_layout_is_zero_padded() {
        let packet = Packet::new(dest(), 42, *b"payload");
        let wire = packet.to_wire(WireFormat::Fragmentation);
        assert_eq!(wire, b"127.0.0.1,8882,20,42,0,00000007,0,payload");
        assert_eq!(
            Packet::from_wire(&wire, WireFormat::Fragmentation),
            Ok(packet)
        );
    }

    #[test]
    fn payload_may_contain_commas() {
        let wire = b"127.0.0.1,8882,20,1,0,00000011,0,a,b,c,d,e,f";
        let packet = Packet::from_wire(wire, WireFormat::Fragmentation).unwrap();
        assert_eq!(packet.payload, b"a,b,c,d,e,f");
    }

    #[test]
    fn middle_fragment_parses() {
        let wire = b"127.0.0.1,8882,19,7,1500,00006000,1,x";
        let packet = Packet::from_wire(wire, WireFormat::Fragmentation).unwrap();
        assert_eq!(packet.offset, 1500);
        assert_eq!(packet.total, 6000);
        assert!(packet.more_fragments);
        assert!(packet.is_fragment());
    }

    #[test]
    fn malformed_is_rejected() {
        let cases: [(&[u8], ParseError); 6] = [
            (b"127.0.0.1,8882", ParseError::TooFewFields),
            (b"127.0.0.1,8882,x,1,0,00000001,0,a", ParseError::Ttl),
            (b"127.0.0.1,8882,20,1,0,17,0,a", ParseError::SizeWidth),
            (b"127.0.0.1,8882,20,1,0,00000001,2,a", ParseError::Flag),
            (b"127.0.0.1,8882,20,1,5,00000004,0,ab", ParseError::Overrun),
            // An offset near usize::MAX must not wrap around the total.
            (
                b"127.0.0.1,8882,20,1,18446744073709551615,00000005,0,abc",
                ParseError::Overrun,
            ),
        ];
        for (wire, expected) in cases {
            assert_eq!(
                Packet::from_wire(wire, WireFormat::Fragmentation),
                Err(expected)
            );
        }
    }
}
