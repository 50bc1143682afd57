//! Buffered, append-only event writer over a preallocated file (spec.md
//! §4.4 component D).

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use crate::base::Event;
use crate::codec;
use crate::error::FileError;
use crate::file::Header;

pub const MIN_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Default file allocation size for callers that don't have a configured
/// one (the sorter and merger binaries, and tests): matches the monitor's
/// own default (`netmon::config`), grounded on
/// `examples/original_source/fs/file.h`'s `default_allocation_size`.
pub const DEFAULT_ALLOC_SIZE: u64 = 64 * 1024 * 1024;

/// Owns one event file's write side: an in-memory buffer that is flushed via
/// a positional write once it reaches `buffer_size`, plus the file header,
/// which is patched in place on every flush so a crash between flushes still
/// leaves a file whose header is no more stale than the last flush.
///
/// The file itself is kept preallocated `alloc_size` bytes ahead of the
/// written tail (`examples/original_source/fs/file.h`'s `reserve`/`pwrite`),
/// growing in further `alloc_size` chunks if a flush would overrun it, and
/// truncated back down to the used length on `close`.
pub struct EventWriter {
    file: File,
    header: Header,
    has_events: bool,
    buf: Vec<u8>,
    buffer_size: usize,
    tail: u64,
    capacity: u64,
    alloc_size: u64,
}

impl EventWriter {
    /// Opens `path` for writing. An existing file has its header read and
    /// appending resumes at its current end; a new file gets a zeroed
    /// header and writing begins right after it. Either way the file is
    /// immediately grown by `alloc_size` bytes beyond its current length.
    pub fn open<P: AsRef<Path>>(path: P, buffer_size: usize, alloc_size: u64) -> Result<Self, FileError> {
        let buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        let path = path.as_ref();
        let existed = path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let (header, tail, has_events) = if existed && file.metadata()?.len() >= crate::file::HEADER_LEN {
            let header = Header::read_from_start(&mut file)?;
            let tail = file.metadata()?.len();
            (header, tail, header.first_ts != 0 || header.last_ts != 0)
        } else {
            let header = Header::new_empty();
            header.write_at_start(&mut file)?;
            (header, crate::file::HEADER_LEN, false)
        };

        let capacity = reserve_initial(&mut file, tail, alloc_size)?;

        Ok(Self {
            file,
            header,
            has_events,
            buf: Vec::with_capacity(buffer_size),
            buffer_size,
            tail,
            capacity,
            alloc_size,
        })
    }

    /// Serialises `event` into the in-memory buffer, flushing it to disk if
    /// the configured threshold is reached.
    pub fn write(&mut self, event: &Event) -> Result<(), FileError> {
        let frame = codec::encode(event)?;

        self.header.observe(event.timestamp(), !self.has_events);
        self.has_events = true;

        self.buf.extend_from_slice(&frame);
        if self.buf.len() >= self.buffer_size {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<(), FileError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let end = self.tail + self.buf.len() as u64;
        if end > self.capacity {
            self.capacity = grow_file(&mut self.file, self.capacity, end, self.alloc_size)?;
        }
        self.file.seek(SeekFrom::Start(self.tail))?;
        self.file.write_all(&self.buf)?;
        self.tail += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Called from the worker's idle hook: flush any buffered bytes so a
    /// quiet capture interface doesn't leave data only in memory.
    pub fn flush_idle(&mut self) -> Result<(), FileError> {
        self.flush_buffer()
    }

    /// Flushes remaining data, truncates off the unused preallocated tail,
    /// and rewrites the header with observed extrema. Must be called on
    /// clean shutdown; a missing call leaves a file the reader can still
    /// recover from (spec.md §5 Cancellation), just with unused space left
    /// allocated at the end.
    pub fn close(mut self) -> Result<(), FileError> {
        self.flush_buffer()?;
        self.file.set_len(self.tail)?;
        self.header.write_at_start(&mut self.file)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn header(&self) -> Header {
        self.header
    }
}

/// Reserves `alloc_size` bytes beyond `tail` unconditionally on open,
/// mirroring `fs::file::open`'s single `reserve(allocation_size)` call.
fn reserve_initial(file: &mut File, tail: u64, alloc_size: u64) -> Result<u64, FileError> {
    let capacity = tail.checked_add(alloc_size).ok_or_else(|| {
        FileError::Io(io::Error::new(io::ErrorKind::Other, "file allocation size overflowed u64"))
    })?;
    file.set_len(capacity)?;
    Ok(capacity)
}

/// Grows `file` from `current_len` in further `alloc_size` chunks until it
/// reaches at least `need`, and returns the new length. Mirrors
/// `fs::file::pwrite`'s grow-in-chunks policy for writes that overrun the
/// current preallocation.
fn grow_file(file: &mut File, current_len: u64, need: u64, alloc_size: u64) -> Result<u64, FileError> {
    let mut new_len = current_len;
    while new_len < need {
        new_len = new_len.checked_add(alloc_size).ok_or_else(|| {
            FileError::Io(io::Error::new(io::ErrorKind::Other, "file allocation size overflowed u64"))
        })?;
    }
    file.set_len(new_len)?;
    Ok(new_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::base::{BaseEvent, IcmpEvent};
    use crate::reader::EventReader;
    use tempfile::tempdir;

    const TEST_ALLOC_SIZE: u64 = 4096;

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
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let mut w = EventWriter::open(&path, MIN_BUFFER_SIZE, TEST_ALLOC_SIZE).unwrap();
        w.write(&icmp(10)).unwrap();
        w.write(&icmp(30)).unwrap();
        w.write(&icmp(20)).unwrap();
        w.close().unwrap();

        let reader = EventReader::open(&path).unwrap();
        assert_eq!(reader.header().first_ts, 10);
        assert_eq!(reader.header().last_ts, 20);

        let events: Vec<_> = reader.iter().map(|r| r.unwrap().0).collect();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn flush_below_threshold_still_durable_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let mut w = EventWriter::open(&path, DEFAULT_BUFFER_SIZE, TEST_ALLOC_SIZE).unwrap();
        w.write(&icmp(5)).unwrap();
        w.close().unwrap();

        let reader = EventReader::open(&path).unwrap();
        assert_eq!(reader.iter().count(), 1);
    }

    #[test]
    fn reopening_existing_file_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let mut w = EventWriter::open(&path, MIN_BUFFER_SIZE, TEST_ALLOC_SIZE).unwrap();
        w.write(&icmp(10)).unwrap();
        w.close().unwrap();

        let mut w = EventWriter::open(&path, MIN_BUFFER_SIZE, TEST_ALLOC_SIZE).unwrap();
        w.write(&icmp(20)).unwrap();
        w.close().unwrap();

        let reader = EventReader::open(&path).unwrap();
        assert_eq!(reader.iter().count(), 2);
        assert_eq!(reader.header().first_ts, 10);
        assert_eq!(reader.header().last_ts, 20);
    }

    #[test]
    fn file_is_preallocated_on_open_and_truncated_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let mut w = EventWriter::open(&path, MIN_BUFFER_SIZE, TEST_ALLOC_SIZE).unwrap();
        w.write(&icmp(10)).unwrap();
        // Still below the flush threshold, but the file should already be
        // grown well past the header plus the one buffered record.
        let grown_len = std::fs::metadata(&path).unwrap().len();
        assert!(grown_len >= crate::file::HEADER_LEN + TEST_ALLOC_SIZE);

        w.close().unwrap();
        let final_len = std::fs::metadata(&path).unwrap().len();
        assert!(final_len < grown_len);
        assert_eq!(final_len, crate::file::HEADER_LEN + codec::encode(&icmp(10)).unwrap().len() as u64);
    }

    #[test]
    fn a_flush_overrunning_one_allocation_chunk_grows_in_further_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.bin");

        let small_alloc = 64u64;
        let mut w = EventWriter::open(&path, small_alloc as usize, small_alloc).unwrap();
        for ts in 0..50u64 {
            w.write(&icmp(ts)).unwrap();
        }
        w.close().unwrap();

        let reader = EventReader::open(&path).unwrap();
        assert_eq!(reader.iter().count(), 50);
        let final_len = std::fs::metadata(&path).unwrap().len();
        // close() truncates back to exactly the used length, regardless of
        // how many allocation chunks were grown through along the way.
        let expected: u64 = crate::file::HEADER_LEN
            + (0..50u64).map(|ts| codec::encode(&icmp(ts)).unwrap().len() as u64).sum::<u64>();
        assert_eq!(final_len, expected);
    }
}
