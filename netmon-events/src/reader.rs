//! Mmap-backed forward iterator over an event file (spec.md §4.4 component
//! H). Bounds-checked at every step; the reader never trusts the mapped
//! bytes past what it has already validated.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::base::Event;
use crate::codec;
use crate::error::FileError;
use crate::file::{Header, HEADER_LEN};

pub struct EventReader {
    map: Mmap,
    header: Header,
}

impl EventReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        let header = Header::parse_bytes(&map)?;
        Ok(Self { map, header })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// Forward iterator over the raw `(event, record_len, timestamp)`
    /// triples, as consumed by the merger; also used by CLI printers after
    /// discarding the length.
    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            data: &self.map[HEADER_LEN as usize..],
            offset: 0,
            errored: false,
        }
    }

    /// Forward iterator yielding `(timestamp, raw frame bytes)`, used by the
    /// merger so it can copy records without re-encoding them.
    pub fn iter_raw(&self) -> RawRecordIter<'_> {
        RawRecordIter {
            data: &self.map[HEADER_LEN as usize..],
            offset: 0,
            errored: false,
        }
    }
}

pub struct RawRecordIter<'a> {
    data: &'a [u8],
    offset: usize,
    errored: bool,
}

impl<'a> Iterator for RawRecordIter<'a> {
    type Item = Result<(u64, &'a [u8]), FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.offset >= self.data.len() {
            return None;
        }
        match codec::decode(&self.data[self.offset..]) {
            Ok((event, consumed)) => {
                let frame = &self.data[self.offset..self.offset + consumed];
                let ts = event.timestamp();
                self.offset += consumed;
                Some(Ok((ts, frame)))
            }
            Err(e) => {
                self.errored = true;
                Some(Err(e.into()))
            }
        }
    }
}

pub struct EventIter<'a> {
    data: &'a [u8],
    offset: usize,
    errored: bool,
}

impl<'a> Iterator for EventIter<'a> {
    /// `(event, total record bytes including the length prefix)`.
    type Item = Result<(Event, usize), FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.offset >= self.data.len() {
            return None;
        }
        match codec::decode(&self.data[self.offset..]) {
            Ok((event, consumed)) => {
                self.offset += consumed;
                Some(Ok((event, consumed)))
            }
            Err(e) => {
                self.errored = true;
                Some(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::base::{BaseEvent, IcmpEvent};
    use crate::writer::EventWriter;
    use tempfile::tempdir;

    fn icmp(ts: u64) -> Event {
        Event::Icmp(IcmpEvent {
            base: BaseEvent::new(ts, Address::V4([10, 0, 0, 1]), Address::V4([10, 0, 0, 2]))
                .unwrap(),
            icmp_type: 8,
            icmp_code: 0,
            transferred: 84,
        })
    }

    #[test]
    fn iterates_in_stored_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let mut w = EventWriter::open(&path, 1024, 4096).unwrap();
        for ts in [10, 30, 20] {
            w.write(&icmp(ts)).unwrap();
        }
        w.close().unwrap();

        let reader = EventReader::open(&path).unwrap();
        let timestamps: Vec<u64> = reader
            .iter()
            .map(|r| r.unwrap().0.timestamp())
            .collect();
        assert_eq!(timestamps, vec![10, 30, 20]);
    }

    #[test]
    fn stops_at_first_malformed_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");
        let mut w = EventWriter::open(&path, 1024, 4096).unwrap();
        w.write(&icmp(10)).unwrap();
        w.close().unwrap();

        // Corrupt the record length prefix to something absurd.
        let mut bytes = std::fs::read(&path).unwrap();
        let body_off = HEADER_LEN as usize;
        bytes[body_off] = 0xff;
        bytes[body_off + 1] = 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let reader = EventReader::open(&path).unwrap();
        let results: Vec<_> = reader.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
