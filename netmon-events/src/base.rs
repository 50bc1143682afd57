use serde::Serialize;

use crate::address::{same_family, Address};
use crate::error::CodecError;

/// Maximum number of A/AAAA records kept from one DNS response (spec §4.2,
/// §9 open question: additional answers beyond this are silently dropped,
/// matching the original implementation).
pub const MAX_DNS_RESPONSES: usize = 24;

/// Fields shared by every event variant: when it happened and which two
/// endpoints it concerns. Composition stands in for the base-class prefix
/// the original C++ events inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BaseEvent {
    pub timestamp: u64,
    pub saddr: Address,
    pub daddr: Address,
}

impl BaseEvent {
    pub fn new(timestamp: u64, saddr: Address, daddr: Address) -> Result<Self, CodecError> {
        if !same_family(&saddr, &daddr) {
            return Err(CodecError::MixedAddressFamily);
        }
        Ok(Self {
            timestamp,
            saddr,
            daddr,
        })
    }

    pub fn addrlen(&self) -> u8 {
        self.saddr.addrlen()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IcmpEvent {
    pub base: BaseEvent,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub transferred: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UdpEvent {
    pub base: BaseEvent,
    pub sport: u16,
    pub dport: u16,
    pub transferred: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsEvent {
    pub base: BaseEvent,
    pub sport: u16,
    pub dport: u16,
    pub transferred: u16,
    pub qtype: u8,
    pub domain: String,
    /// Up to `MAX_DNS_RESPONSES` resolved addresses; empty for queries.
    pub responses: Vec<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TcpBeginEvent {
    pub base: BaseEvent,
    pub sport: u16,
    pub dport: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TcpDataEvent {
    pub base: BaseEvent,
    pub sport: u16,
    pub dport: u16,
    pub creation: u64,
    pub payload: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TcpEndEvent {
    pub base: BaseEvent,
    pub sport: u16,
    pub dport: u16,
    pub creation: u64,
    pub transferred_client: u64,
    pub transferred_server: u64,
}

/// One of the six structured events this system ever emits. Matching on this
/// sum type is how printers, the filter grammar, and the sorter all dispatch
/// over event variants -- there is no base-class pointer to manage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    Icmp(IcmpEvent),
    Udp(UdpEvent),
    Dns(DnsEvent),
    TcpBegin(TcpBeginEvent),
    TcpData(TcpDataEvent),
    TcpEnd(TcpEndEvent),
}

impl Event {
    pub fn base(&self) -> &BaseEvent {
        match self {
            Event::Icmp(e) => &e.base,
            Event::Udp(e) => &e.base,
            Event::Dns(e) => &e.base,
            Event::TcpBegin(e) => &e.base,
            Event::TcpData(e) => &e.base,
            Event::TcpEnd(e) => &e.base,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.base().timestamp
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Icmp(_) => EventKind::Icmp,
            Event::Udp(_) => EventKind::Udp,
            Event::Dns(_) => EventKind::Dns,
            Event::TcpBegin(_) => EventKind::TcpBegin,
            Event::TcpData(_) => EventKind::TcpData,
            Event::TcpEnd(_) => EventKind::TcpEnd,
        }
    }
}

/// Wire tag for each variant. Values are part of the on-disk format and must
/// never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum EventKind {
    Icmp = 0,
    Udp = 1,
    Dns = 2,
    TcpBegin = 3,
    TcpData = 4,
    TcpEnd = 5,
}

impl EventKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => EventKind::Icmp,
            1 => EventKind::Udp,
            2 => EventKind::Dns,
            3 => EventKind::TcpBegin,
            4 => EventKind::TcpData,
            5 => EventKind::TcpEnd,
            _ => return None,
        })
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Icmp => "icmp",
            EventKind::Udp => "udp",
            EventKind::Dns => "dns",
            EventKind::TcpBegin => "tcp_begin",
            EventKind::TcpData => "tcp_data",
            EventKind::TcpEnd => "tcp_end",
        }
    }
}
