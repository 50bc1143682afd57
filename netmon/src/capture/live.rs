//! Live capture off a kernel packet interface via `libpcap` (spec.md §6:
//! "a kernel packet-socket ring buffer or datagram socket bound to an
//! interface, optionally promiscuous"). `pcap` is the one capture backend
//! this crate ships; "ring-buffer" and "socket" configuration values map
//! onto the same underlying `pcap::Capture` with different buffer sizing.

use pcap::{Active, Capture, Linktype};

use crate::capture::{Frame, LinkFraming, Source};
use crate::error::CaptureError;

const POLL_TIMEOUT_MS: i32 = 100;

pub struct LiveCapture {
    cap: Capture<Active>,
    framing: LinkFraming,
}

impl LiveCapture {
    /// Opens `device` for capture. `snaplen` and `buffer_size` come from
    /// configuration (spec.md §6 "receive-buffer size").
    pub fn open(device: &str, promiscuous: bool, snaplen: i32, buffer_size: i32) -> Result<Self, CaptureError> {
        let cap = Capture::from_device(device)?
            .promisc(promiscuous)
            .snaplen(snaplen)
            .buffer_size(buffer_size)
            .timeout(POLL_TIMEOUT_MS)
            .open()?;

        let framing = match cap.get_datalink() {
            Linktype::ETHERNET => LinkFraming::Ethernet,
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => LinkFraming::RawIp,
            Linktype::LINUX_SLL => LinkFraming::LinuxSll,
            other => return Err(CaptureError::UnsupportedLinkType(format!("{other:?}"))),
        };

        log::info!("opened live capture on {device} (promisc={promiscuous}, datalink={framing:?})");
        Ok(Self { cap, framing })
    }
}

impl Source for LiveCapture {
    fn recv(&mut self) -> Result<Frame, CaptureError> {
        let packet = match self.cap.next_packet() {
            Ok(p) => p,
            Err(pcap::Error::TimeoutExpired) => return Err(CaptureError::Timeout),
            Err(pcap::Error::NoMorePackets) => return Err(CaptureError::Eof),
            Err(e) => return Err(e.into()),
        };

        let ts = &packet.header.ts;
        let timestamp_us = (ts.tv_sec as u64) * 1_000_000 + ts.tv_usec as u64;

        Ok(Frame {
            data: packet.data.to_vec(),
            timestamp_us,
            framing: self.framing,
        })
    }

    /// `pcap::Capture::stats` reports the kernel-side drop count for the
    /// whole capture lifetime so far; a failure to query it (interface torn
    /// down, backend doesn't support it) is logged and treated as unknown
    /// rather than failing the worker over a statistics-only query.
    fn kernel_dropped(&mut self) -> Option<u64> {
        match self.cap.stats() {
            Ok(stat) => Some(stat.dropped as u64),
            Err(e) => {
                log::warn!("failed to query kernel drop count: {e}");
                None
            }
        }
    }
}
