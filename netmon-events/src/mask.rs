//! CIDR network masks, used by the `ip`/`dns_response` filter identifiers
//! (spec.md §4.6, §8 property 6).

use crate::address::Address;
use crate::error::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mask {
    V4 { base: [u8; 4], prefix: u8 },
    V6 { base: [u8; 16], prefix: u8 },
}

impl Mask {
    /// Parses `addr` or `addr/prefix`. A missing prefix defaults to the
    /// address's full width (an exact-address match), which lets the same
    /// syntax serve both the `ip` network identifier and the `dns_response`
    /// exact-address identifier.
    pub fn parse(s: &str) -> Result<Self, FilterError> {
        let (addr_str, prefix_str) = match s.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (s, None),
        };

        if let Ok(v4) = addr_str.parse::<std::net::Ipv4Addr>() {
            let prefix = match prefix_str {
                Some(p) => parse_prefix(p, 32)?,
                None => 32,
            };
            return Ok(Mask::V4 {
                base: v4.octets(),
                prefix,
            });
        }

        if let Ok(v6) = addr_str.parse::<std::net::Ipv6Addr>() {
            let prefix = match prefix_str {
                Some(p) => parse_prefix(p, 128)?,
                None => 128,
            };
            return Ok(Mask::V6 {
                base: v6.octets(),
                prefix,
            });
        }

        Err(FilterError::InvalidValue {
            ident: "ip".to_string(),
            reason: format!("'{s}' is not a valid IPv4/IPv6 address or CIDR network"),
        })
    }

    pub fn matches(&self, addr: &Address) -> bool {
        match (self, addr) {
            (Mask::V4 { base, prefix }, Address::V4(a)) => prefix_eq(base, a, *prefix),
            (Mask::V6 { base, prefix }, Address::V6(a)) => prefix_eq(base, a, *prefix),
            _ => false,
        }
    }
}

fn parse_prefix(s: &str, max: u8) -> Result<u8, FilterError> {
    let p: u8 = s.parse().map_err(|_| FilterError::InvalidValue {
        ident: "ip".to_string(),
        reason: format!("'{s}' is not a valid prefix length"),
    })?;
    if p > max {
        return Err(FilterError::InvalidValue {
            ident: "ip".to_string(),
            reason: format!("prefix length {p} exceeds {max}"),
        });
    }
    Ok(p)
}

fn prefix_eq(base: &[u8], addr: &[u8], prefix: u8) -> bool {
    let full_bytes = (prefix / 8) as usize;
    let rem_bits = prefix % 8;

    if base[..full_bytes] != addr[..full_bytes] {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rem_bits);
    (base[full_bytes] & mask) == (addr[full_bytes] & mask)
}
