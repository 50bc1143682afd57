//! Capture-file replay (spec.md §6): the file may carry Ethernet, raw
//! IPv4/IPv6, or Linux SLL framing, distinguished once at open time from the
//! file's own datalink header. `pcap-file` already normalises the
//! microsecond/nanosecond timestamp-resolution flag into a `Duration`, so
//! this module only has to carry that duration through as microseconds.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use pcap_file::pcap::{PcapPacket, PcapReader};
use pcap_file::DataLink;

use crate::capture::{Frame, LinkFraming, Source};
use crate::error::CaptureError;

pub struct FileReplay {
    reader: PcapReader<BufReader<File>>,
    framing: LinkFraming,
}

impl FileReplay {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let file = File::open(path)?;
        let reader = PcapReader::new(BufReader::new(file))?;

        let framing = match reader.header.datalink {
            DataLink::ETHERNET => LinkFraming::Ethernet,
            DataLink::RAW => LinkFraming::RawIp,
            DataLink::LINUX_SLL => LinkFraming::LinuxSll,
            other => return Err(CaptureError::UnsupportedLinkType(format!("{other:?}"))),
        };

        Ok(Self { reader, framing })
    }
}

impl Source for FileReplay {
    fn recv(&mut self) -> Result<Frame, CaptureError> {
        let packet: PcapPacket = match self.reader.next_packet() {
            Some(result) => result?,
            None => return Err(CaptureError::Eof),
        };

        let timestamp_us = packet.timestamp.as_micros() as u64;
        Ok(Frame {
            data: packet.data.into_owned(),
            timestamp_us,
            framing: self.framing,
        })
    }
}
