//! K-way, timestamp-ordered merge of event files (spec.md §4.4, §8 property
//! 3). The output file must not already exist; a malformed input aborts the
//! merge and removes whatever partial output was written.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::FileError;
use crate::file::{Header, HEADER_LEN};
use crate::reader::{EventReader, RawRecordIter};

/// 64 KiB output buffer, matching the original merger's write buffer size.
const OUTPUT_BUFFER: usize = 64 * 1024;

pub fn merge(inputs: &[PathBuf], output: &Path) -> Result<Header, FileError> {
    if output.exists() {
        return Err(FileError::OutputExists);
    }
    if inputs.len() < 2 {
        return Err(FileError::NotEnoughInputs(inputs.len()));
    }

    match merge_inner(inputs, output) {
        Ok(header) => Ok(header),
        Err(e) => {
            let _ = std::fs::remove_file(output);
            Err(e)
        }
    }
}

fn pull_next<'a>(
    it: &mut RawRecordIter<'a>,
) -> Result<Option<(u64, &'a [u8])>, FileError> {
    match it.next() {
        None => Ok(None),
        Some(Ok(v)) => Ok(Some(v)),
        Some(Err(e)) => Err(e),
    }
}

fn merge_inner(inputs: &[PathBuf], output: &Path) -> Result<Header, FileError> {
    let readers: Vec<EventReader> = inputs
        .iter()
        .map(EventReader::open)
        .collect::<Result<_, _>>()?;

    let mut iters: Vec<RawRecordIter> = readers.iter().map(|r| r.iter_raw()).collect();
    let mut slots: Vec<Option<(u64, &[u8])>> = Vec::with_capacity(iters.len());
    for it in iters.iter_mut() {
        slots.push(pull_next(it)?);
    }

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)?;
    let mut writer = BufWriter::with_capacity(OUTPUT_BUFFER, file);
    writer.write_all(&[0u8; HEADER_LEN as usize])?;

    let mut header = Header::new_empty();
    let mut has_events = false;

    loop {
        let mut best: Option<usize> = None;
        for (i, slot) in slots.iter().enumerate() {
            if let Some((ts, _)) = slot {
                let better = match best {
                    None => true,
                    Some(b) => *ts < slots[b].as_ref().unwrap().0,
                };
                if better {
                    best = Some(i);
                }
            }
        }

        let idx = match best {
            Some(i) => i,
            None => break,
        };

        let (ts, bytes) = slots[idx].take().expect("slot checked Some above");
        writer.write_all(bytes)?;
        header.observe(ts, !has_events);
        has_events = true;

        slots[idx] = pull_next(&mut iters[idx])?;
    }

    writer.flush()?;
    let mut file = writer
        .into_inner()
        .map_err(|e| FileError::from(e.into_error()))?;
    header.write_at_start(&mut file)?;
    file.flush()?;

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::base::{BaseEvent, Event, IcmpEvent};
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

    fn write_file(path: &Path, timestamps: &[u64]) {
        let mut w = EventWriter::open(path, 1024, 4096).unwrap();
        for ts in timestamps {
            w.write(&icmp(*ts)).unwrap();
        }
        w.close().unwrap();
    }

    #[test]
    fn merges_two_files_in_timestamp_order() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let out = dir.path().join("out.bin");

        write_file(&a, &[10, 30, 50]);
        write_file(&b, &[20, 40, 60]);

        let header = merge(&[a, b], &out).unwrap();
        assert_eq!(header.first_ts, 10);
        assert_eq!(header.last_ts, 60);

        let reader = EventReader::open(&out).unwrap();
        let timestamps: Vec<u64> = reader.iter().map(|r| r.unwrap().0.timestamp()).collect();
        assert_eq!(timestamps, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn refuses_to_overwrite_existing_output() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let out = dir.path().join("out.bin");
        write_file(&a, &[1]);
        write_file(&b, &[2]);
        std::fs::write(&out, b"existing").unwrap();

        assert!(matches!(
            merge(&[a, b], &out),
            Err(FileError::OutputExists)
        ));
    }

    #[test]
    fn requires_at_least_two_inputs() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let out = dir.path().join("out.bin");
        write_file(&a, &[1]);

        assert!(matches!(
            merge(&[a], &out),
            Err(FileError::NotEnoughInputs(1))
        ));
    }

    #[test]
    fn deletes_partial_output_on_malformed_input() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let out = dir.path().join("out.bin");
        write_file(&a, &[1, 2]);

        // `b` has a valid header but a corrupt record right after it.
        let mut bytes = vec![0u8; HEADER_LEN as usize];
        crate::file::Header {
            first_ts: 1,
            last_ts: 1,
        }
        .write_at_start(&mut std::io::Cursor::new(&mut bytes))
        .unwrap();
        bytes.extend_from_slice(&[0xff, 0xff]); // bogus huge length prefix
        std::fs::write(&b, &bytes).unwrap();

        assert!(merge(&[a, b], &out).is_err());
        assert!(!out.exists());
    }
}
