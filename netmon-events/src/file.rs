//! Event-file header (spec.md §4.4): 24 bytes at offset 0, magic + first/last
//! timestamp extrema. Every event in a cleanly closed file satisfies
//! `header.first_ts <= event.timestamp <= header.last_ts` (spec.md §3, §8
//! property 1).

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::FileError;

pub const MAGIC: u64 = 0x6e65746d6f6e0001;
pub const HEADER_LEN: u64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub first_ts: u64,
    pub last_ts: u64,
}

impl Header {
    pub fn new_empty() -> Self {
        Self {
            first_ts: 0,
            last_ts: 0,
        }
    }

    /// Records `ts` as an observed event timestamp, widening the extrema.
    /// `first_ts` only moves off its `0` sentinel on the very first call
    /// (spec.md §3: "Zero is unset only in the writer's first-event slot").
    pub fn observe(&mut self, ts: u64, is_first: bool) {
        if is_first {
            self.first_ts = ts;
        }
        self.last_ts = ts;
    }

    pub fn write_at_start<W: Write + Seek>(&self, w: &mut W) -> Result<(), FileError> {
        w.seek(SeekFrom::Start(0))?;
        w.write_u64::<BigEndian>(MAGIC)?;
        w.write_u64::<BigEndian>(self.first_ts)?;
        w.write_u64::<BigEndian>(self.last_ts)?;
        Ok(())
    }

    pub fn read_from_start<R: Read + Seek>(r: &mut R) -> Result<Self, FileError> {
        r.seek(SeekFrom::Start(0))?;
        let magic = r.read_u64::<BigEndian>()?;
        if magic != MAGIC {
            return Err(FileError::BadMagic {
                expected: MAGIC,
                found: magic,
            });
        }
        let first_ts = r.read_u64::<BigEndian>()?;
        let last_ts = r.read_u64::<BigEndian>()?;
        Ok(Self { first_ts, last_ts })
    }

    pub fn parse_bytes(buf: &[u8]) -> Result<Self, FileError> {
        if (buf.len() as u64) < HEADER_LEN {
            return Err(FileError::TooShortForHeader(buf.len()));
        }
        let mut cur = std::io::Cursor::new(buf);
        Self::read_from_start(&mut cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() {
        let mut buf = vec![0u8; HEADER_LEN as usize];
        let mut cur = Cursor::new(&mut buf);
        let h = Header {
            first_ts: 10,
            last_ts: 60,
        };
        h.write_at_start(&mut cur).unwrap();

        let mut cur = Cursor::new(&buf);
        let read_back = Header::read_from_start(&mut cur).unwrap();
        assert_eq!(h, read_back);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; HEADER_LEN as usize];
        assert!(matches!(
            Header::parse_bytes(&buf),
            Err(FileError::BadMagic { .. })
        ));
    }

    #[test]
    fn first_ts_only_set_once() {
        let mut h = Header::new_empty();
        h.observe(100, true);
        h.observe(50, false);
        assert_eq!(h.first_ts, 100);
        assert_eq!(h.last_ts, 50);
    }
}
