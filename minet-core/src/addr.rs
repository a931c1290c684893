//! Addresses for routers and the autonomous systems they stand for.

use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error as ThisError;

/// An IPv4 address in the simulated internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ipv4Address([u8; 4]);

impl Ipv4Address {
    /// The address `127.0.0.1`. Every router in a local simulation binds here.
    pub const LOCALHOST: Self = Self([127u8, 0, 0, 1]);

    /// Creates a new address from four octets.
    pub const fn new(address: [u8; 4]) -> Self {
        Self(address)
    }

    /// Gets the address as a `[u8; 4]`.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(n: [u8; 4]) -> Self {
        Self(n)
    }
}

impl From<u32> for Ipv4Address {
    fn from(n: u32) -> Self {
        Self(n.to_be_bytes())
    }
}

impl From<Ipv4Address> for u32 {
    fn from(address: Ipv4Address) -> Self {
        u32::from_be_bytes(address.0)
    }
}

impl FromStr for Ipv4Address {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(AddrParseError::Octets)?;
            *octet = part.parse().map_err(|_| AddrParseError::Octet)?;
        }
        if parts.next().is_some() {
            return Err(AddrParseError::Octets);
        }
        Ok(Self(octets))
    }
}

/// The listening address of one router. Doubles as the identifier of the
/// autonomous system that router stands for in path-vector routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouterAddr {
    pub ip: Ipv4Address,
    pub port: u16,
}

impl RouterAddr {
    pub const fn new(ip: Ipv4Address, port: u16) -> Self {
        Self { ip, port }
    }

    /// A localhost address, the common case for simulations.
    pub const fn localhost(port: u16) -> Self {
        Self::new(Ipv4Address::LOCALHOST, port)
    }
}

impl Display for RouterAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for RouterAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s.split_once(':').ok_or(AddrParseError::MissingPort)?;
        Ok(Self {
            ip: ip.parse()?,
            port: port.parse().map_err(|_| AddrParseError::Port)?,
        })
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("expected four dot-separated octets")]
    Octets,
    #[error("address octet was not a number in 0..=255")]
    Octet,
    #[error("expected an ip:port pair")]
    MissingPort,
    #[error("port was not a number in 0..=65535")]
    Port,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trip() {
        let addr = RouterAddr::new(Ipv4Address::new([10, 0, 0, 7]), 8881);
        assert_eq!(addr.to_string(), "10.0.0.7:8881");
        assert_eq!("10.0.0.7:8881".parse(), Ok(addr));
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(
            "127.0.0.1".parse::<RouterAddr>(),
            Err(AddrParseError::MissingPort)
        );
        assert_eq!("1.2.3".parse::<Ipv4Address>(), Err(AddrParseError::Octets));
        assert_eq!(
            "1.2.3.4.5".parse::<Ipv4Address>(),
            Err(AddrParseError::Octets)
        );
        assert_eq!("1.2.3.300".parse::<Ipv4Address>(), Err(AddrParseError::Octet));
        assert_eq!(
            "127.0.0.1:banana".parse::<RouterAddr>(),
            Err(AddrParseError::Port)
        );
    }
}
