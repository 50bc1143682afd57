//! Length-prefixed, big-endian wire codec for event records (spec.md §4.4).
//!
//! Frame layout: `len (u16) || payload`, where `payload` is
//! `timestamp (u64) || type (u8) || addrlen (u8) || saddr || daddr || ...`.
//! `len` counts only the payload, not itself.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::address::Address;
use crate::base::{
    BaseEvent, DnsEvent, Event, EventKind, IcmpEvent, TcpBeginEvent, TcpDataEvent, TcpEndEvent,
    UdpEvent, MAX_DNS_RESPONSES,
};
use crate::error::CodecError;

/// Sanity bounds on the stored record length, used to reject an obviously
/// corrupt length prefix before trusting it to size a read (spec.md §3, §8
/// property 5 and the "Fatal: event file truncated" error class of §7).
pub const MIN_RECORD_LEN_V4: u16 = 16;
pub const MIN_RECORD_LEN_V6: u16 = 28;
pub const MAX_RECORD_LEN: u16 = 1024;

fn min_len_for_addrlen(addrlen: u8) -> u16 {
    if addrlen == 16 {
        MIN_RECORD_LEN_V6
    } else {
        MIN_RECORD_LEN_V4
    }
}

/// Serialises one event into its wire frame, including the `len` prefix.
pub fn encode(event: &Event) -> Result<Vec<u8>, CodecError> {
    let mut body = Vec::with_capacity(64);
    write_body(&mut body, event)?;

    if body.len() > MAX_RECORD_LEN as usize {
        return Err(CodecError::LengthOutOfBounds {
            len: body.len() as u16,
            min: min_len_for_addrlen(event.base().addrlen()),
            max: MAX_RECORD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(body.len() + 2);
    frame.write_u16::<BigEndian>(body.len() as u16)?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn write_body<W: Write>(w: &mut W, event: &Event) -> Result<(), CodecError> {
    let base = event.base();
    w.write_u64::<BigEndian>(base.timestamp)?;
    w.write_u8(event.kind().tag())?;
    w.write_u8(base.addrlen())?;
    w.write_all(base.saddr.as_bytes())?;
    w.write_all(base.daddr.as_bytes())?;

    match event {
        Event::Icmp(e) => {
            w.write_u8(e.icmp_type)?;
            w.write_u8(e.icmp_code)?;
            w.write_u16::<BigEndian>(e.transferred)?;
        }
        Event::Udp(e) => {
            w.write_u16::<BigEndian>(e.sport)?;
            w.write_u16::<BigEndian>(e.dport)?;
            w.write_u16::<BigEndian>(e.transferred)?;
        }
        Event::Dns(e) => {
            w.write_u16::<BigEndian>(e.sport)?;
            w.write_u16::<BigEndian>(e.dport)?;
            w.write_u16::<BigEndian>(e.transferred)?;
            w.write_u8(e.qtype)?;

            let domain = e.domain.as_bytes();
            if domain.len() > u8::MAX as usize {
                return Err(CodecError::DomainTooLong(domain.len()));
            }
            w.write_u8(domain.len() as u8)?;
            w.write_all(domain)?;

            if e.responses.len() > MAX_DNS_RESPONSES {
                return Err(CodecError::TooManyResponses(e.responses.len()));
            }
            w.write_u8(e.responses.len() as u8)?;
            for addr in &e.responses {
                w.write_u8(addr.addrlen())?;
                w.write_all(addr.as_bytes())?;
            }
        }
        Event::TcpBegin(e) => {
            w.write_u16::<BigEndian>(e.sport)?;
            w.write_u16::<BigEndian>(e.dport)?;
        }
        Event::TcpData(e) => {
            w.write_u16::<BigEndian>(e.sport)?;
            w.write_u16::<BigEndian>(e.dport)?;
            w.write_u64::<BigEndian>(e.creation)?;
            w.write_u16::<BigEndian>(e.payload)?;
        }
        Event::TcpEnd(e) => {
            w.write_u16::<BigEndian>(e.sport)?;
            w.write_u16::<BigEndian>(e.dport)?;
            w.write_u64::<BigEndian>(e.creation)?;
            w.write_u64::<BigEndian>(e.transferred_client)?;
            w.write_u64::<BigEndian>(e.transferred_server)?;
        }
    }

    Ok(())
}

/// Decodes one frame (`len` prefix plus body) from the front of `buf`.
/// Returns the event and the total number of bytes consumed, including the
/// 2-byte length prefix.
pub fn decode(buf: &[u8]) -> Result<(Event, usize), CodecError> {
    if buf.len() < 2 {
        return Err(CodecError::Truncated {
            need: 2,
            have: buf.len(),
        });
    }
    let len = (&buf[0..2]).read_u16::<BigEndian>()? as usize;
    if buf.len() < 2 + len {
        return Err(CodecError::Truncated {
            need: 2 + len,
            have: buf.len(),
        });
    }

    let body = &buf[2..2 + len];
    let event = decode_body(body, len as u16)?;
    Ok((event, 2 + len))
}

/// Decodes one frame from a `Read` stream, returning `None` at a clean EOF
/// (zero bytes available before the length prefix).
pub fn decode_from_reader<R: Read>(r: &mut R) -> Result<Option<Event>, CodecError> {
    let mut len_buf = [0u8; 2];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u16::from_be_bytes(len_buf);
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    Ok(Some(decode_body(&body, len)?))
}

fn decode_body(body: &[u8], len: u16) -> Result<Event, CodecError> {
    let mut cur = io::Cursor::new(body);
    let timestamp = cur.read_u64::<BigEndian>()?;
    let tag = cur.read_u8()?;
    let kind = EventKind::from_tag(tag).ok_or(CodecError::UnknownType(tag))?;
    let addrlen = cur.read_u8()?;

    let min = min_len_for_addrlen(addrlen);
    if len < min || len > MAX_RECORD_LEN {
        return Err(CodecError::LengthOutOfBounds {
            len,
            min,
            max: MAX_RECORD_LEN,
        });
    }

    let mut saddr_buf = vec![0u8; addrlen as usize];
    cur.read_exact(&mut saddr_buf)?;
    let saddr = Address::from_bytes(addrlen, &saddr_buf)?;

    let mut daddr_buf = vec![0u8; addrlen as usize];
    cur.read_exact(&mut daddr_buf)?;
    let daddr = Address::from_bytes(addrlen, &daddr_buf)?;

    let base = BaseEvent {
        timestamp,
        saddr,
        daddr,
    };

    Ok(match kind {
        EventKind::Icmp => {
            let icmp_type = cur.read_u8()?;
            let icmp_code = cur.read_u8()?;
            let transferred = cur.read_u16::<BigEndian>()?;
            Event::Icmp(IcmpEvent {
                base,
                icmp_type,
                icmp_code,
                transferred,
            })
        }
        EventKind::Udp => {
            let sport = cur.read_u16::<BigEndian>()?;
            let dport = cur.read_u16::<BigEndian>()?;
            let transferred = cur.read_u16::<BigEndian>()?;
            Event::Udp(UdpEvent {
                base,
                sport,
                dport,
                transferred,
            })
        }
        EventKind::Dns => {
            let sport = cur.read_u16::<BigEndian>()?;
            let dport = cur.read_u16::<BigEndian>()?;
            let transferred = cur.read_u16::<BigEndian>()?;
            let qtype = cur.read_u8()?;
            let domainlen = cur.read_u8()? as usize;
            let mut domain_buf = vec![0u8; domainlen];
            cur.read_exact(&mut domain_buf)?;
            let domain = String::from_utf8_lossy(&domain_buf).into_owned();

            let nresponses = cur.read_u8()? as usize;
            if nresponses > MAX_DNS_RESPONSES {
                return Err(CodecError::TooManyResponses(nresponses));
            }
            let mut responses = Vec::with_capacity(nresponses);
            for _ in 0..nresponses {
                let rlen = cur.read_u8()?;
                let mut abuf = vec![0u8; rlen as usize];
                cur.read_exact(&mut abuf)?;
                responses.push(Address::from_bytes(rlen, &abuf)?);
            }

            Event::Dns(DnsEvent {
                base,
                sport,
                dport,
                transferred,
                qtype,
                domain,
                responses,
            })
        }
        EventKind::TcpBegin => {
            let sport = cur.read_u16::<BigEndian>()?;
            let dport = cur.read_u16::<BigEndian>()?;
            Event::TcpBegin(TcpBeginEvent { base, sport, dport })
        }
        EventKind::TcpData => {
            let sport = cur.read_u16::<BigEndian>()?;
            let dport = cur.read_u16::<BigEndian>()?;
            let creation = cur.read_u64::<BigEndian>()?;
            let payload = cur.read_u16::<BigEndian>()?;
            Event::TcpData(TcpDataEvent {
                base,
                sport,
                dport,
                creation,
                payload,
            })
        }
        EventKind::TcpEnd => {
            let sport = cur.read_u16::<BigEndian>()?;
            let dport = cur.read_u16::<BigEndian>()?;
            let creation = cur.read_u64::<BigEndian>()?;
            let transferred_client = cur.read_u64::<BigEndian>()?;
            let transferred_server = cur.read_u64::<BigEndian>()?;
            Event::TcpEnd(TcpEndEvent {
                base,
                sport,
                dport,
                creation,
                transferred_client,
                transferred_server,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use test_case::test_case;

    fn sample_icmp() -> Event {
        Event::Icmp(IcmpEvent {
            base: BaseEvent::new(1000, Address::V4([10, 0, 0, 1]), Address::V4([10, 0, 0, 2]))
                .unwrap(),
            icmp_type: 8,
            icmp_code: 0,
            transferred: 84,
        })
    }

    fn sample_dns() -> Event {
        Event::Dns(DnsEvent {
            base: BaseEvent::new(
                2000,
                Address::V4([10, 0, 0, 1]),
                Address::V4([8, 8, 8, 8]),
            )
            .unwrap(),
            sport: 54321,
            dport: 53,
            transferred: 40,
            qtype: 1,
            domain: "example.com".to_string(),
            responses: vec![
                Address::V4([93, 184, 216, 34]),
                Address::V4([93, 184, 215, 34]),
            ],
        })
    }

    fn sample_tcp_end() -> Event {
        Event::TcpEnd(TcpEndEvent {
            base: BaseEvent::new(
                3000,
                Address::V6([0u8; 16]),
                Address::V6([1u8; 16]),
            )
            .unwrap(),
            sport: 55555,
            dport: 80,
            creation: 100,
            transferred_client: 540,
            transferred_server: 1240,
        })
    }

    #[test_case(sample_icmp())]
    #[test_case(sample_dns())]
    #[test_case(sample_tcp_end())]
    fn roundtrip(event: Event) {
        let frame = encode(&event).unwrap();
        let (decoded, consumed) = decode(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(decoded, event);
    }

    #[test]
    fn length_prefix_equals_body_size() {
        let frame = encode(&sample_dns()).unwrap();
        let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        assert_eq!(len, frame.len() - 2);
    }

    #[test]
    fn rejects_truncated_frame() {
        let frame = encode(&sample_icmp()).unwrap();
        let err = decode(&frame[..frame.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn rejects_too_many_dns_responses() {
        let mut event = sample_dns();
        if let Event::Dns(ref mut d) = event {
            d.responses = vec![Address::V4([0, 0, 0, 0]); MAX_DNS_RESPONSES + 1];
        }
        assert!(matches!(
            encode(&event),
            Err(CodecError::TooManyResponses(_))
        ));
    }

    #[test]
    fn decode_from_reader_stops_cleanly_at_eof() {
        let mut buf = Vec::new();
        buf.extend(encode(&sample_icmp()).unwrap());
        let mut cur = io::Cursor::new(buf);
        assert!(decode_from_reader(&mut cur).unwrap().is_some());
        assert!(decode_from_reader(&mut cur).unwrap().is_none());
    }
}
