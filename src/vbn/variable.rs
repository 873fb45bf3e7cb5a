//! Variable-length record reassembly (`VAR` and `VFC`).
//!
//! On disk each record is a little-endian length word, an optional control
//! area (`VFC` only), the record bytes and, when the record ends on an odd
//! offset, one pad byte.  Offsets are counted over the whole VBN stream of
//! the file, so the pad, a split length word or spilled control bytes may
//! all land at the head of the next payload.  Whatever is left over is kept
//! in the target's [`Continuation`](crate::registry::Continuation).
//!
//! Output per record: the record bytes, then one host terminator in ASCII
//! mode unless the record already ended with CR or LF.

use std::io;

use byteorder::{ByteOrder, LittleEndian};

use super::{emit, end_record, VFC_CONTROL_LEN};
use crate::header::RecordFormat;
use crate::registry::ExtractionTarget;
use crate::sink::OutputSink;

/// Length word with no record behind it.  Directory files are padded with it.
const LENGTH_SENTINEL: u16 = 0xFFFF;

enum Flow {
    /// Record finished; parse the next length word.
    Next,
    /// Payload exhausted, or the file was classified as binary.
    Stop,
}

pub(super) fn process<S: OutputSink>(
    target:  &mut ExtractionTarget<S::Handle>,
    sink:    &mut S,
    payload: &[u8],
) -> io::Result<()> {
    let control = if target.format == RecordFormat::Vfc { VFC_CONTROL_LEN } else { 0 };
    let result = walk(target, sink, payload, control);
    target.stream_offset += payload.len() as u64;
    result
}

fn walk<S: OutputSink>(
    target:  &mut ExtractionTarget<S::Handle>,
    sink:    &mut S,
    payload: &[u8],
    control: usize,
) -> io::Result<()> {
    let mut pos = 0;

    if target.continuation.pending_start > 0 {
        let skip = target.continuation.pending_start.min(payload.len());
        pos += skip;
        target.continuation.pending_start -= skip;
        target.file_pointer += skip as u64;
        if target.continuation.pending_start > 0 {
            return Ok(());
        }
    }

    if let Some(low) = target.continuation.split_prefix {
        let Some(&high) = payload.get(pos) else {
            return Ok(());
        };
        target.continuation.split_prefix = None;
        pos += 1;
        target.file_pointer += 1;
        let raw = u16::from_le_bytes([low, high]);
        if let Flow::Stop = begin_record(target, sink, payload, &mut pos, raw, control)? {
            return Ok(());
        }
    } else if target.continuation.in_record {
        if let Flow::Stop = resume_record(target, sink, payload, &mut pos)? {
            return Ok(());
        }
    }

    while pos < payload.len() && target.file_pointer < target.file_size {
        if payload.len() - pos < 2 {
            target.continuation.split_prefix = Some(payload[pos]);
            target.file_pointer += 1;
            return Ok(());
        }
        let raw = LittleEndian::read_u16(&payload[pos..pos + 2]);
        pos += 2;
        target.file_pointer += 2;
        if let Flow::Stop = begin_record(target, sink, payload, &mut pos, raw, control)? {
            return Ok(());
        }
    }
    Ok(())
}

/// Start the record whose length word has just been consumed.
fn begin_record<S: OutputSink>(
    target:  &mut ExtractionTarget<S::Handle>,
    sink:    &mut S,
    payload: &[u8],
    pos:     &mut usize,
    raw:     u16,
    control: usize,
) -> io::Result<Flow> {
    if raw == LENGTH_SENTINEL {
        tracing::trace!(name = %target.name, file_pointer = target.file_pointer, "length sentinel");
        return Ok(Flow::Next);
    }

    let declared = u64::from(raw).saturating_sub(control as u64);
    let available = target.file_size.saturating_sub(target.file_pointer + control as u64);
    let length = declared.min(available);
    if length < declared {
        tracing::trace!(name = %target.name, declared, available, "record length clamped to file size");
    }
    target.continuation.in_record = true;
    target.continuation.pending_length = length;

    let room = payload.len() - *pos;
    if control > room {
        *pos = payload.len();
        target.file_pointer += room as u64;
        target.continuation.pending_start = control - room;
        return Ok(Flow::Stop);
    }
    *pos += control;
    target.file_pointer += control as u64;
    resume_record(target, sink, payload, pos)
}

/// Consume as much of the record in flight as the payload holds.
fn resume_record<S: OutputSink>(
    target:  &mut ExtractionTarget<S::Handle>,
    sink:    &mut S,
    payload: &[u8],
    pos:     &mut usize,
) -> io::Result<Flow> {
    let room = payload.len() - *pos;
    let owed = target.continuation.pending_length;
    let n = usize::try_from(owed).map_or(room, |o| o.min(room));
    let finishes = n as u64 == owed;

    // An empty record still passes through `emit`, which clears the
    // terminator state, so it always yields exactly one blank line.
    if (n > 0 || finishes) && !emit(target, sink, &payload[*pos..*pos + n])? {
        return Ok(Flow::Stop);
    }
    *pos += n;
    target.file_pointer += n as u64;
    target.continuation.pending_length -= n as u64;
    if !finishes {
        return Ok(Flow::Stop);
    }

    target.continuation.in_record = false;
    end_record(target, sink)?;

    // Records are word aligned within the file; no pad follows the last one.
    let odd = (target.stream_offset + *pos as u64) % 2 == 1;
    if odd && target.file_pointer < target.file_size {
        if *pos < payload.len() {
            *pos += 1;
            target.file_pointer += 1;
        } else {
            target.continuation.pending_start = 1;
        }
    }
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{extract, target};
    use super::super::HOST_LINE_TERMINATOR;
    use crate::options::ExtractMode;
    use proptest::prelude::*;

    const VAR: u8 = 2;
    const VFC: u8 = 3;

    /// Encode records as a VAR (or VFC) stream, word aligned.
    fn stream(records: &[&[u8]], control: Option<[u8; 2]>) -> Vec<u8> {
        let mut out = Vec::new();
        for r in records {
            let ctl_len = if control.is_some() { 2 } else { 0 };
            out.extend_from_slice(&((r.len() + ctl_len) as u16).to_le_bytes());
            if let Some(c) = control {
                out.extend_from_slice(&c);
            }
            out.extend_from_slice(r);
            if out.len() % 2 == 1 {
                out.push(0);
            }
        }
        out
    }

    fn lines(records: &[&[u8]]) -> Vec<u8> {
        records.iter().flat_map(|r| [*r, HOST_LINE_TERMINATOR].concat()).collect()
    }

    #[test]
    fn records_become_lines() {
        let recs: [&[u8]; 3] = [b"first", b"", b"odd"];
        let s = stream(&recs, None);
        let (out, fp) = extract(target(VAR, s.len() as u64, ExtractMode::Ascii), &[&s[..]]);
        assert_eq!(out, lines(&recs));
        assert_eq!(fp, s.len() as u64);
    }

    #[test]
    fn binary_mode_drops_framing_only() {
        let recs: [&[u8]; 2] = [b"ab", b"cde"];
        let s = stream(&recs, None);
        let (out, _) = extract(target(VAR, s.len() as u64, ExtractMode::Binary), &[&s[..]]);
        assert_eq!(out, b"abcde");
    }

    #[test]
    fn record_ending_in_crlf_gets_no_extra_terminator() {
        let recs: [&[u8]; 1] = [b"ab\r\n"];
        let s = stream(&recs, None);
        let (out, _) = extract(target(VAR, s.len() as u64, ExtractMode::Ascii), &[&s[..]]);
        assert_eq!(out, [b"ab".as_slice(), HOST_LINE_TERMINATOR].concat());
    }

    #[test]
    fn sentinel_consumes_two_bytes_and_emits_nothing() {
        let mut s = vec![0xFF, 0xFF];
        s.extend(stream(&[&b"AB"[..]], None));
        let t = target(VAR, 2, ExtractMode::Binary);
        let (out, fp) = extract(t, &[&s[..2]]);
        assert!(out.is_empty());
        assert_eq!(fp, 2);

        let (out, fp) = extract(target(VAR, s.len() as u64, ExtractMode::Binary), &[&s[..]]);
        assert_eq!(out, b"AB");
        assert_eq!(fp, 6);
    }

    #[test]
    fn vfc_control_area_is_skipped_even_when_split() {
        let recs: [&[u8]; 2] = [b"hello", b"vfc"];
        let s = stream(&recs, Some([0x01, 0x8D]));
        for cut in 1..s.len() {
            let (a, b) = s.split_at(cut);
            let (out, fp) = extract(target(VFC, s.len() as u64, ExtractMode::Ascii), &[a, b]);
            assert_eq!(out, lines(&recs), "cut at {cut}");
            assert_eq!(fp, s.len() as u64);
        }
    }

    #[test]
    fn oversized_length_is_clamped() {
        let s = [0x00u8, 0x10, b'x', b'y'];
        let (out, fp) = extract(target(VAR, 4, ExtractMode::Binary), &[&s[..]]);
        assert_eq!(out, b"xy");
        assert_eq!(fp, 4);
    }

    #[test]
    fn smart_sniff_inside_record_stops_processing() {
        let s = stream(&[&b"ok"[..], &[b'a', 0xC3][..]], None);
        let mut t = target(VAR, s.len() as u64, ExtractMode::Smart);
        let mut sink = crate::sink::MemorySink::new();
        super::super::process_vbn(&mut t, &mut sink, &s).unwrap();
        assert_eq!(t.mode, ExtractMode::Binary);
        assert!(t.ignore_vbn);
    }

    proptest! {
        #[test]
        fn split_record_reassembles_exactly(
            record in proptest::collection::vec(0x20u8..0x7F, 0..300),
            tail in proptest::collection::vec(0x20u8..0x7F, 0..20),
            cut in any::<prop::sample::Index>(),
        ) {
            let recs: [&[u8]; 2] = [&record, &tail];
            let s = stream(&recs, None);
            let at = 1 + cut.index(s.len() - 1);
            let (a, b) = s.split_at(at);
            let (out, fp) = extract(target(VAR, s.len() as u64, ExtractMode::Ascii), &[a, b]);
            prop_assert_eq!(out, lines(&recs));
            prop_assert_eq!(fp, s.len() as u64);
        }
    }
}
