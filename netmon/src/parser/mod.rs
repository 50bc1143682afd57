//! Link/network-layer packet parser (spec.md §4.1): Ethernet, VLAN tags,
//! MPLS label stacks, IPv4 and IPv6 (with the IPv6 extension-header chain),
//! dispatching to per-protocol hooks. No allocation, no mutation of the
//! packet buffer; a hook left at its default no-op implementation means
//! "ignore this protocol, succeed".

use netmon_events::Address;

use crate::error::PacketError;

#[derive(Debug, Clone, Copy)]
pub struct PacketCtx {
    pub saddr: Address,
    pub daddr: Address,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TcpSegmentInfo {
    pub sport: u16,
    pub dport: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
}

pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_ACK: u8 = 0x10;

/// Per-protocol callbacks invoked by the parser. Implementors only override
/// the protocols they care about.
pub trait Hooks {
    fn on_tcp(&mut self, _ctx: PacketCtx, _tcp: TcpSegmentInfo, _packet_len: u16, _payload: &[u8]) {}
    fn on_udp(&mut self, _ctx: PacketCtx, _sport: u16, _dport: u16, _packet_len: u16, _payload: &[u8]) {}
    fn on_icmp(&mut self, _ctx: PacketCtx, _icmp_type: u8, _icmp_code: u8, _packet_len: u16) {}
}

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_VLAN_QINQ: u16 = 0x88A8;
const ETHERTYPE_MPLS_UNICAST: u16 = 0x8847;
const ETHERTYPE_MPLS_MULTICAST: u16 = 0x8848;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_ICMPV6: u8 = 58;

/// Parses one Ethernet frame, dispatching the IP payload through `hooks`.
pub fn parse_frame(buf: &[u8], timestamp: u64, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    if buf.len() < 14 {
        return Err(PacketError::TooShort {
            need: 14,
            have: buf.len(),
        });
    }

    let mut pos = 12;
    loop {
        let ethertype = read_u16(buf, pos)?;
        pos += 2;

        match ethertype {
            ETHERTYPE_VLAN | ETHERTYPE_VLAN_QINQ => {
                pos += 2; // skip the 2-byte tag, loop re-reads the inner ethertype
            }
            ETHERTYPE_MPLS_UNICAST | ETHERTYPE_MPLS_MULTICAST => {
                return parse_mpls(buf, pos, timestamp, hooks);
            }
            ETHERTYPE_IPV4 => return parse_ipv4(&buf[pos..], timestamp, hooks),
            ETHERTYPE_IPV6 => return parse_ipv6(&buf[pos..], timestamp, hooks),
            _ => return Ok(()), // unrecognised ethertype: captured, ignored
        }
    }
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16, PacketError> {
    if pos + 2 > buf.len() {
        return Err(PacketError::TooShort {
            need: pos + 2,
            have: buf.len(),
        });
    }
    Ok(u16::from_be_bytes([buf[pos], buf[pos + 1]]))
}

fn parse_mpls(buf: &[u8], mut pos: usize, timestamp: u64, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    loop {
        if pos + 4 > buf.len() {
            return Err(PacketError::MplsOverrun);
        }
        let label = ((buf[pos] as u32) << 12) | ((buf[pos + 1] as u32) << 4) | ((buf[pos + 2] as u32) >> 4);
        let bottom_of_stack = buf[pos + 2] & 0x1 != 0;
        pos += 4;

        if bottom_of_stack {
            return match label {
                0 => parse_ipv4(&buf[pos..], timestamp, hooks),
                2 => parse_ipv6(&buf[pos..], timestamp, hooks),
                _ => {
                    if pos >= buf.len() {
                        return Err(PacketError::MplsOverrun);
                    }
                    match buf[pos] >> 4 {
                        4 => parse_ipv4(&buf[pos..], timestamp, hooks),
                        6 => parse_ipv6(&buf[pos..], timestamp, hooks),
                        _ => Ok(()),
                    }
                }
            };
        }
    }
}

fn parse_ipv4(buf: &[u8], timestamp: u64, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    if buf.len() < 20 {
        return Err(PacketError::TooShort {
            need: 20,
            have: buf.len(),
        });
    }
    let ihl = buf[0] & 0x0F;
    if ihl < 5 {
        return Err(PacketError::BadIhl { ihl });
    }
    let hdr_len = ihl as usize * 4;
    if buf.len() < hdr_len {
        return Err(PacketError::TooShort {
            need: hdr_len,
            have: buf.len(),
        });
    }
    let tot_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if tot_len != buf.len() {
        return Err(PacketError::Ipv4LengthMismatch {
            tot_len: tot_len as u16,
            len: buf.len(),
        });
    }

    let protocol = buf[9];
    let saddr = Address::V4([buf[12], buf[13], buf[14], buf[15]]);
    let daddr = Address::V4([buf[16], buf[17], buf[18], buf[19]]);
    let ctx = PacketCtx {
        saddr,
        daddr,
        timestamp,
    };

    dispatch_l4(protocol, ctx, buf.len(), &buf[hdr_len..], hooks)
}

fn parse_ipv6(buf: &[u8], timestamp: u64, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    if buf.len() < 40 {
        return Err(PacketError::TooShort {
            need: 40,
            have: buf.len(),
        });
    }
    let plen = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    if plen + 40 != buf.len() {
        return Err(PacketError::Ipv6LengthMismatch {
            plen: plen as u16,
            len: buf.len(),
        });
    }

    let mut next_header = buf[6];
    let saddr = Address::V6(buf[8..24].try_into().expect("slice is 16 bytes"));
    let daddr = Address::V6(buf[24..40].try_into().expect("slice is 16 bytes"));
    let ctx = PacketCtx {
        saddr,
        daddr,
        timestamp,
    };

    let mut offset = 40;
    loop {
        if let Some(protocol) = l4_protocol_number(next_header) {
            return dispatch_l4(protocol, ctx, buf.len(), &buf[offset..], hooks);
        }
        // 59 = "No Next Header"; 50 = ESP, whose payload is opaque.
        if next_header == 59 || next_header == 50 || !is_ipv6_ext_header(next_header) {
            return Ok(());
        }

        if offset + 2 > buf.len() {
            return Err(PacketError::ExtensionHeaderOverrun);
        }
        let next = buf[offset];
        let hdr_ext_len = buf[offset + 1];
        let ext_len = (hdr_ext_len as usize + 1) * 8;
        if offset + ext_len > buf.len() {
            return Err(PacketError::ExtensionHeaderOverrun);
        }
        offset += ext_len;
        next_header = next;
    }
}

/// Entry point for capture frames that arrive already stripped of an
/// Ethernet-style header but that still carry a known ethertype out of band
/// (Linux `cooked` / SLL captures carry the protocol type in their own
/// pseudo-header).
pub fn parse_from_ethertype(ethertype: u16, buf: &[u8], timestamp: u64, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    match ethertype {
        ETHERTYPE_MPLS_UNICAST | ETHERTYPE_MPLS_MULTICAST => parse_mpls(buf, 0, timestamp, hooks),
        ETHERTYPE_IPV4 => parse_ipv4(buf, timestamp, hooks),
        ETHERTYPE_IPV6 => parse_ipv6(buf, timestamp, hooks),
        _ => Ok(()),
    }
}

/// Entry point for raw-IP capture frames (spec.md §6): no link-layer header
/// at all, the IP version nibble is the first nibble of the frame.
pub fn parse_raw_ip(buf: &[u8], timestamp: u64, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    match buf.first().map(|b| b >> 4) {
        Some(4) => parse_ipv4(buf, timestamp, hooks),
        Some(6) => parse_ipv6(buf, timestamp, hooks),
        Some(v) => Err(PacketError::UnknownIpVersion(v)),
        None => Err(PacketError::TooShort { need: 1, have: 0 }),
    }
}

fn is_ipv6_ext_header(next_header: u8) -> bool {
    matches!(next_header, 0 | 43 | 44 | 51 | 60 | 135 | 139 | 140)
}

fn l4_protocol_number(next_header: u8) -> Option<u8> {
    matches!(next_header, PROTO_TCP | PROTO_UDP | PROTO_ICMP | PROTO_ICMPV6).then_some(next_header)
}

fn dispatch_l4(protocol: u8, ctx: PacketCtx, packet_len: usize, l4: &[u8], hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    match protocol {
        PROTO_TCP => parse_tcp(ctx, packet_len, l4, hooks),
        PROTO_UDP => parse_udp(ctx, packet_len, l4, hooks),
        PROTO_ICMP | PROTO_ICMPV6 => parse_icmp(ctx, packet_len, l4, hooks),
        _ => Ok(()),
    }
}

fn parse_tcp(ctx: PacketCtx, packet_len: usize, buf: &[u8], hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    if buf.len() < 20 {
        return Err(PacketError::TooShort {
            need: 20,
            have: buf.len(),
        });
    }
    let sport = u16::from_be_bytes([buf[0], buf[1]]);
    let dport = u16::from_be_bytes([buf[2], buf[3]]);
    let seq = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let ack = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let data_offset = (buf[12] >> 4) as usize * 4;
    let flags = buf[13];

    if data_offset < 20 || data_offset > buf.len() {
        return Err(PacketError::TooShort {
            need: data_offset,
            have: buf.len(),
        });
    }

    hooks.on_tcp(
        ctx,
        TcpSegmentInfo {
            sport,
            dport,
            seq,
            ack,
            flags,
        },
        packet_len as u16,
        &buf[data_offset..],
    );
    Ok(())
}

fn parse_udp(ctx: PacketCtx, packet_len: usize, buf: &[u8], hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    if buf.len() < 8 {
        return Err(PacketError::TooShort {
            need: 8,
            have: buf.len(),
        });
    }
    let sport = u16::from_be_bytes([buf[0], buf[1]]);
    let dport = u16::from_be_bytes([buf[2], buf[3]]);
    hooks.on_udp(ctx, sport, dport, packet_len as u16, &buf[8..]);
    Ok(())
}

fn parse_icmp(ctx: PacketCtx, packet_len: usize, buf: &[u8], hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    if buf.len() < 4 {
        return Err(PacketError::TooShort {
            need: 4,
            have: buf.len(),
        });
    }
    hooks.on_icmp(ctx, buf[0], buf[1], packet_len as u16);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        icmp: RefCell<Vec<(u8, u8, u16)>>,
        udp: RefCell<Vec<(u16, u16)>>,
        tcp: RefCell<Vec<TcpSegmentInfo>>,
    }

    impl Hooks for Recorder {
        fn on_tcp(&mut self, _ctx: PacketCtx, tcp: TcpSegmentInfo, _packet_len: u16, _payload: &[u8]) {
            self.tcp.borrow_mut().push(tcp);
        }
        fn on_udp(&mut self, _ctx: PacketCtx, sport: u16, dport: u16, _packet_len: u16, _payload: &[u8]) {
            self.udp.borrow_mut().push((sport, dport));
        }
        fn on_icmp(&mut self, _ctx: PacketCtx, icmp_type: u8, icmp_code: u8, packet_len: u16) {
            self.icmp.borrow_mut().push((icmp_type, icmp_code, packet_len));
        }
    }

    fn ipv4_icmp_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;

        let mut ip = vec![0u8; 20 + 8];
        ip[0] = 0x45;
        let tot_len = (ip.len() as u16).to_be_bytes();
        ip[2] = tot_len[0];
        ip[3] = tot_len[1];
        ip[9] = PROTO_ICMP;
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        ip[20] = 8; // echo request
        ip[21] = 0;

        frame.extend_from_slice(&ip);
        frame
    }

    #[test]
    fn parses_plain_ipv4_icmp() {
        let frame = ipv4_icmp_frame();
        let mut rec = Recorder::default();
        parse_frame(&frame, 1, &mut rec).unwrap();
        assert_eq!(rec.icmp.borrow()[0], (8, 0, 28));
    }

    #[test]
    fn double_vlan_tag_is_unwrapped() {
        let inner = ipv4_icmp_frame();
        let mut frame = inner[0..12].to_vec();
        frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x01]); // outer VLAN tag
        frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x02]); // inner VLAN tag
        frame.extend_from_slice(&inner[12..]);

        let mut rec = Recorder::default();
        parse_frame(&frame, 1, &mut rec).unwrap();
        assert_eq!(rec.icmp.borrow().len(), 1);
    }

    #[test]
    fn mpls_label_stack_with_ipv4_well_known_label() {
        let inner = ipv4_icmp_frame();
        let mut frame = inner[0..12].to_vec();
        frame.extend_from_slice(&[0x88, 0x47]); // MPLS unicast ethertype

        // outer label (not bottom of stack)
        frame.extend_from_slice(&[0x00, 0x01, 0x00, 0xff]);
        // inner label = 0 (IPv4), bottom of stack set
        frame.extend_from_slice(&[0x00, 0x00, 0x01, 0xff]);

        frame.extend_from_slice(&inner[14..]);

        let mut rec = Recorder::default();
        parse_frame(&frame, 1, &mut rec).unwrap();
        assert_eq!(rec.icmp.borrow().len(), 1);
    }

    #[test]
    fn short_frame_is_rejected() {
        let mut rec = Recorder::default();
        assert!(parse_frame(&[0u8; 10], 1, &mut rec).is_err());
    }

    #[test]
    fn ipv6_three_extension_headers_then_tcp() {
        // hop-by-hop(0) -> routing(43) -> destination-options(60) -> tcp(6)
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&1234u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&80u16.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = TCP_SYN;

        let mut ext = Vec::new();
        // hop-by-hop: next=routing(43), hdrextlen=0 -> 8 bytes total
        ext.extend_from_slice(&[43, 0, 0, 0, 0, 0, 0, 0]);
        // routing: next=dest-opts(60), hdrextlen=0 -> 8 bytes total
        ext.extend_from_slice(&[60, 0, 0, 0, 0, 0, 0, 0]);
        // destination options: next=tcp(6), hdrextlen=0 -> 8 bytes total
        ext.extend_from_slice(&[6, 0, 0, 0, 0, 0, 0, 0]);
        ext.extend_from_slice(&tcp);

        let mut ip6 = vec![0u8; 40];
        ip6[0] = 6 << 4;
        let plen = (ext.len() as u16).to_be_bytes();
        ip6[4] = plen[0];
        ip6[5] = plen[1];
        ip6[6] = 0; // first next-header is hop-by-hop
        ip6[8..24].copy_from_slice(&[0u8; 16]);
        ip6[24..40].copy_from_slice(&[1u8; 16]);
        ip6.extend_from_slice(&ext);

        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x86, 0xDD]);
        frame.extend_from_slice(&ip6);

        let mut rec = Recorder::default();
        parse_frame(&frame, 1, &mut rec).unwrap();
        assert_eq!(rec.tcp.borrow().len(), 1);
        assert_eq!(rec.tcp.borrow()[0].dport, 80);
    }

    #[test]
    fn raw_ip_dispatches_on_version_nibble() {
        let frame = ipv4_icmp_frame();
        let ip = &frame[14..];
        let mut rec = Recorder::default();
        parse_raw_ip(ip, 1, &mut rec).unwrap();
        assert_eq!(rec.icmp.borrow().len(), 1);
    }

    #[test]
    fn raw_ip_rejects_unknown_version_nibble() {
        let mut rec = Recorder::default();
        assert!(parse_raw_ip(&[0x55, 0, 0, 0], 1, &mut rec).is_err());
    }

    #[test]
    fn unknown_ethertype_is_silently_ignored() {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x12;
        frame[13] = 0x34;
        let mut rec = Recorder::default();
        assert!(parse_frame(&frame, 1, &mut rec).is_ok());
        assert!(rec.icmp.borrow().is_empty());
    }
}
