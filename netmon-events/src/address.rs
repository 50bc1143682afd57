use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::CodecError;

/// An IP address as carried on the wire: either 4 or 16 raw bytes in network
/// order. Events never mix families between source and destination, but the
/// two endpoints of a filter predicate (`source_ip`, `destination_ip`, `ip`)
/// can each be compared independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl Address {
    /// The `addrlen` discriminator stored on the wire: 4 or 16.
    pub fn addrlen(&self) -> u8 {
        match self {
            Address::V4(_) => 4,
            Address::V6(_) => 16,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::V4(b) => b.as_slice(),
            Address::V6(b) => b.as_slice(),
        }
    }

    pub fn from_bytes(addrlen: u8, bytes: &[u8]) -> Result<Self, CodecError> {
        match addrlen {
            4 => {
                let mut a = [0u8; 4];
                a.copy_from_slice(&bytes[..4]);
                Ok(Address::V4(a))
            }
            16 => {
                let mut a = [0u8; 16];
                a.copy_from_slice(&bytes[..16]);
                Ok(Address::V6(a))
            }
            other => Err(CodecError::InvalidAddrLen(other)),
        }
    }

    pub fn is_v4(&self) -> bool {
        matches!(self, Address::V4(_))
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, Address::V6(_))
    }
}

impl From<Ipv4Addr> for Address {
    fn from(a: Ipv4Addr) -> Self {
        Address::V4(a.octets())
    }
}

impl From<Ipv6Addr> for Address {
    fn from(a: Ipv6Addr) -> Self {
        Address::V6(a.octets())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(b) => write!(f, "{}", Ipv4Addr::from(*b)),
            Address::V6(b) => write!(f, "{}", Ipv6Addr::from(*b)),
        }
    }
}

/// Returns true if both addresses share the same `addrlen` family.
pub fn same_family(a: &Address, b: &Address) -> bool {
    a.addrlen() == b.addrlen()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_v4() {
        let a = Address::V4([10, 0, 0, 1]);
        assert_eq!(a.addrlen(), 4);
        let b = Address::from_bytes(4, a.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrip_v6() {
        let a = Address::V6([0u8; 16]);
        assert_eq!(a.addrlen(), 16);
        let b = Address::from_bytes(16, a.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_addrlen() {
        assert!(Address::from_bytes(5, &[0; 5]).is_err());
    }

    #[test]
    fn display_matches_std() {
        let a = Address::V4([93, 184, 216, 34]);
        assert_eq!(a.to_string(), "93.184.216.34");
    }
}
