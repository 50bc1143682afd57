//! Standalone TCP segment reassembler (spec.md §4.5). Not on the capture hot
//! path; used offline to recover a contiguous byte stream from a captured
//! sequence of segments. Sequence arithmetic is modulo 2^32, comparisons use
//! wrap-around distance under 2^31 exactly as TCP itself does.

const MAX_BUFFERED_SEGMENTS: usize = 32;
const MAX_SEGMENT_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    TooLarge(usize),
    Inconsistent,
}

struct Buffered {
    seqno: u32,
    payload: Vec<u8>,
}

pub struct Reassembler {
    next_seqno: u32,
    initialized: bool,
    buffered: Vec<Buffered>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self {
            next_seqno: 0,
            initialized: false,
            buffered: Vec::new(),
        }
    }
}

/// Signed distance `a - b` under modulo-2^32 sequence arithmetic: negative
/// means `a` is before `b`, zero means equal, positive means `a` is after.
fn seq_diff(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

fn ranges_conflict(a_seq: u32, a: &[u8], b_seq: u32, b: &[u8]) -> bool {
    let a_end = a_seq.wrapping_add(a.len() as u32);
    let b_end = b_seq.wrapping_add(b.len() as u32);

    let start = if seq_diff(a_seq, b_seq) >= 0 { a_seq } else { b_seq };
    let end = if seq_diff(a_end, b_end) <= 0 { a_end } else { b_end };
    if seq_diff(end, start) <= 0 {
        return false;
    }
    let len = seq_diff(end, start) as usize;
    let a_off = seq_diff(start, a_seq) as usize;
    let b_off = seq_diff(start, b_seq) as usize;
    a[a_off..a_off + len] != b[b_off..b_off + len]
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits one captured segment. `on_payload` fires once per contiguous
    /// prefix now available at `next_seqno`; `on_gap` fires once when the
    /// buffer is full and `next_seqno` must jump past bytes that will never
    /// arrive.
    pub fn submit(
        &mut self,
        seqno: u32,
        payload: &[u8],
        mut on_payload: impl FnMut(&[u8]),
        mut on_gap: impl FnMut(u32, u32),
    ) -> Result<(), SegmentError> {
        if payload.len() > MAX_SEGMENT_LEN {
            return Err(SegmentError::TooLarge(payload.len()));
        }
        if !self.initialized {
            self.next_seqno = seqno;
            self.initialized = true;
        }

        let diff = seq_diff(seqno, self.next_seqno);

        if diff < 0 {
            let end = seqno.wrapping_add(payload.len() as u32);
            if seq_diff(end, self.next_seqno) <= 0 {
                return Ok(()); // fully old data, already delivered: duplicate
            }
            // Overlaps what's already delivered but extends past it: accept
            // the new suffix.
            let skip = self.next_seqno.wrapping_sub(seqno) as usize;
            on_payload(&payload[skip..]);
            self.next_seqno = end;
            self.flush_contiguous(&mut on_payload);
            return Ok(());
        }

        if diff == 0 {
            on_payload(payload);
            self.next_seqno = seqno.wrapping_add(payload.len() as u32);
            self.flush_contiguous(&mut on_payload);
            return Ok(());
        }

        // Out of order: check for an exact duplicate or a conflicting overlap
        // against what is already buffered.
        if let Some(existing) = self.buffered.iter().find(|b| b.seqno == seqno) {
            return if existing.payload == payload {
                Ok(())
            } else {
                Err(SegmentError::Inconsistent)
            };
        }
        for existing in &self.buffered {
            if ranges_conflict(existing.seqno, &existing.payload, seqno, payload) {
                return Err(SegmentError::Inconsistent);
            }
        }

        self.buffered.push(Buffered {
            seqno,
            payload: payload.to_vec(),
        });

        if self.buffered.len() > MAX_BUFFERED_SEGMENTS {
            self.force_advance(&mut on_payload, &mut on_gap);
        }

        Ok(())
    }

    /// Delivers any buffered segments that have become contiguous.
    fn flush_contiguous(&mut self, on_payload: &mut impl FnMut(&[u8])) {
        loop {
            match self.buffered.iter().position(|b| b.seqno == self.next_seqno) {
                Some(idx) => {
                    let seg = self.buffered.remove(idx);
                    self.next_seqno = self.next_seqno.wrapping_add(seg.payload.len() as u32);
                    on_payload(&seg.payload);
                }
                None => break,
            }
        }
    }

    /// Buffer is full: jump `next_seqno` to the earliest buffered segment,
    /// reporting the skipped range as a gap, then deliver whatever is now
    /// contiguous.
    fn force_advance(&mut self, on_payload: &mut impl FnMut(&[u8]), on_gap: &mut impl FnMut(u32, u32)) {
        let Some(earliest) = self
            .buffered
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| seq_diff(b.seqno, self.next_seqno))
            .map(|(i, _)| i)
        else {
            return;
        };

        let seg = self.buffered.remove(earliest);
        if seg.seqno != self.next_seqno {
            on_gap(self.next_seqno, seg.seqno);
        }
        self.next_seqno = seg.seqno.wrapping_add(seg.payload.len() as u32);
        on_payload(&seg.payload);
        self.flush_contiguous(on_payload);
    }

    /// Stream end: drains whatever is still buffered and contiguous.
    /// Anything left over (a real gap at EOF) is discarded without firing a
    /// gap callback, since there is no "next" data to resume from.
    pub fn fin(&mut self, mut on_payload: impl FnMut(&[u8])) {
        self.flush_contiguous(&mut on_payload);
        self.buffered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_segments_deliver_immediately() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(100, b"hello", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        r.submit(105, b"world", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        assert_eq!(out, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn out_of_order_segment_buffers_then_flushes_on_fill() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(105, b"world", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        assert!(out.is_empty());
        r.submit(100, b"hello", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        assert_eq!(out, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn duplicate_exact_segment_is_silently_accepted() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(200, b"abc", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        r.submit(100, b"xyz", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        // duplicate of the still-buffered segment at 200
        assert!(r.submit(200, b"abc", |p| out.push(p.to_vec()), |_, _| {}).is_ok());
    }

    #[test]
    fn conflicting_overlap_is_rejected() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(200, b"abc", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        let err = r.submit(200, b"xyz", |p| out.push(p.to_vec()), |_, _| {});
        assert_eq!(err, Err(SegmentError::Inconsistent));
    }

    #[test]
    fn overlapping_retransmit_delivers_only_the_new_suffix() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(100, b"hello", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        // retransmits "lo" (bytes 103-104) plus new "world" (105-109)
        r.submit(103, b"loworld", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        assert_eq!(out, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn buffer_overflow_forces_a_gap() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        let mut gaps = Vec::new();
        r.submit(0, b"first", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        for i in 0..33u32 {
            let seqno = 1000 + i * 10;
            r.submit(seqno, b"xx", |p| out.push(p.to_vec()), |from, to| gaps.push((from, to)))
                .unwrap();
        }
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].0, 5); // next_seqno was 5 after "first"
    }

    #[test]
    fn fin_drains_only_the_contiguous_prefix() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(100, b"hello", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        // a segment at 200 will never become contiguous before fin
        r.submit(200, b"late", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        r.fin(|p| out.push(p.to_vec()));
        assert_eq!(out, vec![b"hello".to_vec()]);
    }

    #[test]
    fn sequence_number_wraps_at_the_2_32_boundary() {
        let mut r = Reassembler::new();
        let mut out = Vec::new();
        r.submit(u32::MAX - 2, b"abc", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        // next_seqno wrapped to 1 after consuming 3 bytes starting at MAX-2
        r.submit(1, b"def", |p| out.push(p.to_vec()), |_, _| {}).unwrap();
        assert_eq!(out, vec![b"abc".to_vec(), b"def".to_vec()]);
    }
}
