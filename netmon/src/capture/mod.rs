//! Capture abstraction (spec.md §6): "deliver one Ethernet frame plus a
//! wall-clock timestamp", whether the frame comes from a live kernel
//! interface or a replayed capture file. Workers never see `pcap`/`pcap-file`
//! types directly -- they drive a [`Source`].

pub mod file;
pub mod live;

use crate::error::{CaptureError, PacketError};
use crate::parser::{self, Hooks};

/// How a captured frame is framed at the link layer, carried alongside the
/// raw bytes so the caller knows how to hand them to the packet parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFraming {
    /// A full Ethernet header is present; dispatch through `parser::parse_frame`.
    Ethernet,
    /// No link-layer header; the IP version nibble is the first nibble of
    /// the frame (spec.md §6 "raw IPv4/IPv6").
    RawIp,
    /// Linux "cooked" capture (`DLT_LINUX_SLL`): a 16-byte pseudo-header
    /// whose last two bytes carry an Ethernet-style protocol type.
    LinuxSll,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub timestamp_us: u64,
    pub framing: LinkFraming,
}

/// One capture endpoint: a live interface or a replayed file. `recv` blocks
/// for up to the capture's configured read timeout (100ms per spec.md §5)
/// and returns `Err(CaptureError::Timeout)` on an idle poll, which the
/// worker treats as its idle hook.
pub trait Source: Send {
    fn recv(&mut self) -> Result<Frame, CaptureError>;

    /// Packets the kernel dropped before this source ever saw them (spec.md
    /// §7 "statistics counters at shutdown report packets received and
    /// packets dropped by kernel"). `None` when the underlying source has no
    /// such counter (file replay never drops anything at this layer).
    fn kernel_dropped(&mut self) -> Option<u64> {
        None
    }
}

/// Feeds one captured frame through the packet parser according to its
/// framing, normalising the three capture shapes spec.md §6 distinguishes
/// onto the parser's three entry points.
pub fn dispatch(frame: &Frame, hooks: &mut dyn Hooks) -> Result<(), PacketError> {
    match frame.framing {
        LinkFraming::Ethernet => parser::parse_frame(&frame.data, frame.timestamp_us, hooks),
        LinkFraming::RawIp => parser::parse_raw_ip(&frame.data, frame.timestamp_us, hooks),
        LinkFraming::LinuxSll => match split_sll_frame(&frame.data) {
            Some((ethertype, payload)) => parser::parse_from_ethertype(ethertype, payload, frame.timestamp_us, hooks),
            None => Err(PacketError::TooShort {
                need: SLL_HEADER_LEN,
                have: frame.data.len(),
            }),
        },
    }
}

const SLL_HEADER_LEN: usize = 16;

/// Splits a `LinuxSll`-framed capture frame into its embedded ethertype and
/// the IP packet that follows the 16-byte pseudo-header.
pub fn split_sll_frame(data: &[u8]) -> Option<(u16, &[u8])> {
    if data.len() < SLL_HEADER_LEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([data[14], data[15]]);
    Some((ethertype, &data[SLL_HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sll_frame_splits_header_from_payload() {
        let mut data = vec![0u8; SLL_HEADER_LEN];
        data[14] = 0x08;
        data[15] = 0x00;
        data.extend_from_slice(&[1, 2, 3, 4]);

        let (ethertype, payload) = split_sll_frame(&data).unwrap();
        assert_eq!(ethertype, 0x0800);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn short_sll_frame_is_rejected() {
        assert!(split_sll_frame(&[0u8; 4]).is_none());
    }

    #[derive(Default)]
    struct NullHooks;
    impl Hooks for NullHooks {}

    #[test]
    fn raw_ip_frame_dispatches_without_error() {
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&20u16.to_be_bytes());
        ip[9] = 1; // ICMP, body-less: dispatch_l4 will error on short ICMP body, which is fine here
        let frame = Frame {
            data: ip,
            timestamp_us: 1,
            framing: LinkFraming::RawIp,
        };
        let mut hooks = NullHooks;
        // a header-only IPv4/ICMP frame is parsed successfully up to dispatch;
        // the short ICMP body is the only expected failure mode.
        assert!(dispatch(&frame, &mut hooks).is_err());
    }
}
