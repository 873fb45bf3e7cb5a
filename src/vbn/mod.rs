//! VBN reconstruction engine.
//!
//! Turns the VBN record payloads of the active file back into file content.
//! How a payload is read depends on the file's record format:
//!
//! * `FIX`, `STM`, `STMLF`, `STMCR` — content is stored as-is; only the
//!   declared file size bounds it.
//! * `VAR`, `VFC` — content is a stream of length-prefixed, word-aligned
//!   records (`VFC` adds a 2-byte control area per record).  Records run
//!   freely across payload boundaries; [`variable`] keeps the state needed
//!   to resume.
//! * `UDF`, or extraction mode `raw` — bytes are copied verbatim.
//!
//! With no output handle open the engine only sniffs: in smart mode, the
//! first byte above 0x7F classifies the file as binary and stops further
//! VBN processing for the pass.  With a handle open, ASCII-mode output goes
//! through the line-terminator normaliser in [`text`].

pub mod text;
mod variable;

use std::io;

use crate::header::RecordFormat;
use crate::options::ExtractMode;
use crate::registry::ExtractionTarget;
use crate::sink::OutputSink;

pub use text::{TextState, HOST_LINE_TERMINATOR};

/// Width of the fixed control area preceding every `VFC` record.
pub const VFC_CONTROL_LEN: usize = 2;

/// Feed one VBN payload of `target`.
pub fn process_vbn<S: OutputSink>(
    target:  &mut ExtractionTarget<S::Handle>,
    sink:    &mut S,
    payload: &[u8],
) -> io::Result<()> {
    tracing::trace!(
        name = %target.name,
        file_pointer = format_args!("{:#010x}", target.file_pointer),
        file_size = format_args!("{:#010x}", target.file_size),
        len = payload.len(),
        "vbn payload"
    );

    if target.mode == ExtractMode::Raw || target.format == RecordFormat::Udf {
        copy_raw(target, sink, payload)
    } else if target.format.is_stream_like() {
        copy_stream(target, sink, payload)
    } else if target.format.is_variable() {
        variable::process(target, sink, payload)
    } else {
        tracing::trace!(name = %target.name, format = ?target.format, "record format not reconstructed");
        Ok(())
    }
}

/// Emit a CR still withheld by the normaliser.  Called when the file's
/// handle is about to close.
pub fn finish_file<S: OutputSink>(target: &mut ExtractionTarget<S::Handle>, sink: &mut S) -> io::Result<()> {
    let Some(handle) = target.handle.as_mut() else {
        return Ok(());
    };
    let mut out = Vec::new();
    target.text.finish(&mut out);
    if !out.is_empty() {
        sink.write(handle, &out)?;
    }
    Ok(())
}

// ── Format paths ─────────────────────────────────────────────────────────────

fn remaining<H>(target: &ExtractionTarget<H>) -> u64 {
    target.file_size.saturating_sub(target.file_pointer)
}

fn bounded(payload: &[u8], limit: u64) -> &[u8] {
    let n = usize::try_from(limit).map_or(payload.len(), |l| l.min(payload.len()));
    &payload[..n]
}

fn copy_raw<S: OutputSink>(target: &mut ExtractionTarget<S::Handle>, sink: &mut S, payload: &[u8]) -> io::Result<()> {
    let chunk = bounded(payload, remaining(target));
    if let Some(handle) = target.handle.as_mut() {
        if !chunk.is_empty() {
            sink.write(handle, chunk)?;
        }
    }
    target.file_pointer += chunk.len() as u64;
    Ok(())
}

fn copy_stream<S: OutputSink>(target: &mut ExtractionTarget<S::Handle>, sink: &mut S, payload: &[u8]) -> io::Result<()> {
    let chunk = bounded(payload, remaining(target));
    emit(target, sink, chunk)?;
    target.file_pointer += chunk.len() as u64;
    Ok(())
}

// ── Shared emission ──────────────────────────────────────────────────────────

/// Write `data` if a handle is open, sniff it otherwise.  Returns `false`
/// once sniffing has classified the file as binary.
fn emit<S: OutputSink>(target: &mut ExtractionTarget<S::Handle>, sink: &mut S, data: &[u8]) -> io::Result<bool> {
    if target.handle.is_some() {
        write_data(target, sink, data)?;
        Ok(true)
    } else {
        Ok(!sniff(target, data))
    }
}

fn sniff<H>(target: &mut ExtractionTarget<H>, data: &[u8]) -> bool {
    if target.mode != ExtractMode::Smart {
        return false;
    }
    match data.iter().position(|&b| b > 0x7F) {
        Some(at) => {
            target.mode = ExtractMode::Binary;
            target.ignore_vbn = true;
            tracing::debug!(
                name = %target.name,
                offset = target.file_pointer + at as u64,
                "non-ASCII byte, extracting as binary"
            );
            true
        }
        None => false,
    }
}

fn write_data<S: OutputSink>(target: &mut ExtractionTarget<S::Handle>, sink: &mut S, data: &[u8]) -> io::Result<()> {
    let Some(handle) = target.handle.as_mut() else {
        return Ok(());
    };
    if target.mode == ExtractMode::Ascii {
        let mut out = Vec::with_capacity(data.len() + HOST_LINE_TERMINATOR.len());
        target.text.normalize(data, &mut out);
        if !out.is_empty() {
            sink.write(handle, &out)?;
        }
    } else {
        target.text.clear();
        if !data.is_empty() {
            sink.write(handle, data)?;
        }
    }
    Ok(())
}

/// Implicit terminator after a variable-length record.  ASCII output only,
/// and skipped when the record's own bytes already ended a line.
fn end_record<S: OutputSink>(target: &mut ExtractionTarget<S::Handle>, sink: &mut S) -> io::Result<()> {
    if target.mode != ExtractMode::Ascii || target.text.last_was_terminator {
        return Ok(());
    }
    match target.handle.as_mut() {
        Some(handle) => sink.write(handle, HOST_LINE_TERMINATOR),
        None => Ok(()),
    }
}
