//! Block and record traversal.
//!
//! # Block layout
//!
//! ```text
//! ┌──────────────────────┬────────┬─────────┬────────┬─────────┬─────┐
//! │ block header (BBH)   │ BRH    │ payload │ BRH    │ payload │ ... │
//! │ header_size bytes    │ 16 B   │ rsize B │ 16 B   │ rsize B │     │
//! └──────────────────────┴────────┴─────────┴────────┴─────────┴─────┘
//! ```
//!
//! A File record names the file that the following VBN records belong to;
//! any record other than VBN, Volume or Null ends that file.  The walker
//! keeps the single active target, hands File records to the
//! [`ExtractionRegistry`] and VBN payloads to the reconstruction engine.
//!
//! Damage is contained: a bad record ends its block, a bad block is skipped,
//! and the traversal carries on with the next block.

use crate::controller::Pass;
use crate::error::BackupError;
use crate::header::{BlockHeader, FileAttributes, RecordFlags, RecordHeader, RecordType, RECORD_HEADER_LEN};
use crate::listing::FileEntry;
use crate::options::{DebugLevel, ExtractMode, ExtractOptions};
use crate::registry::ExtractionRegistry;
use crate::sink::{OpenRequest, OutputSink};
use crate::vbn;

/// Block framing established by the first block of the save set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size:  u32,
    /// Offset of the first record in every block.
    pub header_size: u16,
}

/// What one traversal produced.
#[derive(Debug, Default)]
pub struct PassReport {
    pub files:     Vec<FileEntry>,
    pub extracted: usize,
    pub warnings:  Vec<BackupError>,
}

pub struct SaveSetWalker<'a, S: OutputSink> {
    registry:  &'a mut ExtractionRegistry<S::Handle>,
    sink:      &'a mut S,
    options:   &'a ExtractOptions,
    geometry:  Geometry,
    pass:      Pass,
    /// Key of the file whose VBN records are being consumed.
    active:    Option<String>,
    report:    PassReport,
}

impl<'a, S: OutputSink> SaveSetWalker<'a, S> {
    pub fn new(
        registry: &'a mut ExtractionRegistry<S::Handle>,
        sink:     &'a mut S,
        options:  &'a ExtractOptions,
        geometry: Geometry,
        pass:     Pass,
    ) -> Self {
        Self { registry, sink, options, geometry, pass, active: None, report: PassReport::default() }
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    /// Walk the records of one block.  Returns whether the block was valid
    /// to its end.  `offset` is the block's position in the save set.
    ///
    /// Only sink and source I/O failures are returned as errors.
    pub fn process_block(&mut self, block: &[u8], is_last: bool, offset: u64) -> Result<bool, BackupError> {
        let header = match BlockHeader::parse(block) {
            Ok(h) => h,
            Err(e) => {
                self.close_active()?;
                self.report_block(e.into(), is_last, offset);
                return Ok(false);
            }
        };
        if !header.is_compatible_with(self.geometry.block_size) {
            self.close_active()?;
            let err = BackupError::BlockSizeMismatch {
                expected: self.geometry.block_size,
                found:    header.block_size(),
            };
            self.report_block(err, is_last, offset);
            return Ok(false);
        }

        let end = usize::try_from(self.geometry.block_size).map_or(block.len(), |b| b.min(block.len()));
        let block = &block[..end];
        let mut cursor = usize::from(self.geometry.header_size);
        while cursor < end {
            let (valid, next) = self.process_record(block, cursor, is_last)?;
            if !valid {
                return Ok(false);
            }
            cursor = next;
        }
        Ok(true)
    }

    fn report_block(&mut self, err: BackupError, is_last: bool, offset: u64) {
        if !self.pass.commits() {
            return;
        }
        if is_last {
            tracing::debug!(offset, "final block skipped: {err}");
        } else {
            tracing::warn!(offset, "block skipped: {err}");
            self.report.warnings.push(err);
        }
    }

    // ── Records ──────────────────────────────────────────────────────────────

    /// Handle the record at `cursor`.  Returns whether it was valid and where
    /// the next record starts.
    pub fn process_record(
        &mut self,
        block:   &[u8],
        cursor:  usize,
        is_last: bool,
    ) -> Result<(bool, usize), BackupError> {
        let rest = block.get(cursor..).unwrap_or_default();
        let header = match RecordHeader::parse(rest) {
            Ok(h) => h,
            Err(e) => {
                self.invalid_record(e.into(), rest, cursor, is_last)?;
                return Ok((false, cursor));
            }
        };

        let size = header.size();
        if size == 0 {
            return Ok((true, block.len()));
        }
        let rtype = header.record_type();
        tracing::trace!(
            offset = cursor,
            rtype = ?rtype,
            size,
            address = header.address(),
            "record"
        );
        if !rtype.continues_file() {
            self.close_active()?;
        }

        let start = cursor + RECORD_HEADER_LEN;
        let Some(payload) = block.get(start..start + usize::from(size)) else {
            let err = BackupError::TruncatedHeader {
                what:      "record payload",
                needed:    usize::from(size),
                available: block.len() - start,
            };
            self.invalid_record(err, header.as_bytes(), cursor, is_last)?;
            return Ok((false, cursor));
        };

        match rtype {
            RecordType::Null | RecordType::Summary => {}
            RecordType::Volume => return Ok((true, block.len())),
            RecordType::File => match FileAttributes::decode(payload, usize::from(size)) {
                Ok(attrs) => self.on_file(attrs, header.flags())?,
                Err(e) => {
                    self.invalid_record(e.into(), header.as_bytes(), cursor, is_last)?;
                    return Ok((false, cursor));
                }
            },
            RecordType::Vbn => self.on_vbn(payload)?,
            RecordType::PhysVol
            | RecordType::Lbn
            | RecordType::Fid
            | RecordType::FileExt
            | RecordType::Lbn576
            | RecordType::RsDirAttr
            | RecordType::Alias => {
                tracing::trace!(rtype = ?rtype, size, "record type not used for extraction");
            }
            RecordType::Unknown(raw) => {
                let err = BackupError::UnknownRecordType { rtype: raw, size };
                self.invalid_record(err, header.as_bytes(), cursor, is_last)?;
                return Ok((false, cursor));
            }
        }
        Ok((true, start + usize::from(size)))
    }

    /// Close the active file and report a record that ends its block.
    /// Garbage after the last record of the save set is expected, so the
    /// final block only reports it when debugging.
    fn invalid_record(&mut self, err: BackupError, raw: &[u8], offset: usize, is_last: bool) -> Result<(), BackupError> {
        self.close_active()?;
        if !self.pass.commits() {
            return Ok(());
        }
        let dump = hex::encode(&raw[..raw.len().min(RECORD_HEADER_LEN)]);
        if is_last && self.options.debug == DebugLevel::None {
            tracing::debug!(offset, header = %dump, "{err}");
        } else {
            tracing::warn!(offset, header = %dump, "{err}");
            self.report.warnings.push(err);
        }
        Ok(())
    }

    fn on_file(&mut self, attrs: FileAttributes, flags: RecordFlags) -> Result<(), BackupError> {
        let decision = self.registry.register_file(&attrs);
        tracing::trace!(
            name = %decision.key,
            version = decision.version,
            matched = decision.matched,
            target = decision.is_target,
            "file record"
        );
        if !decision.is_target {
            return Ok(());
        }
        let Some(target) = self.registry.target_mut(&decision.key) else {
            return Ok(());
        };

        target.reset_stream();
        match self.pass {
            Pass::Scan => {
                // Only an unresolved smart file has anything to learn from its data.
                target.ignore_vbn = !(self.options.extract && target.mode == ExtractMode::Smart);
            }
            Pass::Extract if self.options.extract => {
                if target.mode == ExtractMode::Smart {
                    target.mode = ExtractMode::Ascii;
                }
                tracing::debug!(name = %decision.key, mode = ?target.mode, "extracting");
                let request = OpenRequest {
                    name:     &decision.key,
                    created:  attrs.created(),
                    modified: attrs.revised(),
                };
                target.handle = Some(self.sink.open(&request)?);
                self.report.extracted += 1;
            }
            Pass::Extract => {
                target.ignore_vbn = true;
            }
        }
        if self.pass.commits() {
            self.report.files.push(FileEntry { attributes: attrs, record_flags: flags });
        }
        self.active = Some(decision.key);
        Ok(())
    }

    fn on_vbn(&mut self, payload: &[u8]) -> Result<(), BackupError> {
        let Some(key) = self.active.as_deref() else {
            return Ok(());
        };
        let Some(target) = self.registry.target_mut(key) else {
            return Ok(());
        };
        if target.ignore_vbn {
            return Ok(());
        }
        vbn::process_vbn(target, &mut *self.sink, payload)?;
        Ok(())
    }

    // ── File boundaries ──────────────────────────────────────────────────────

    /// End the active file: flush, check its size, release its handle.  The
    /// handle is closed even when flushing fails.
    pub fn close_active(&mut self) -> Result<(), BackupError> {
        let Some(key) = self.active.take() else {
            return Ok(());
        };
        let Some(target) = self.registry.target_mut(&key) else {
            return Ok(());
        };
        if target.handle.is_none() {
            return Ok(());
        }

        let flushed = vbn::finish_file(target, &mut *self.sink);
        let closed = match target.handle.take() {
            Some(handle) => self.sink.close(handle),
            None => Ok(()),
        };

        let incomplete = (!target.is_complete()).then(|| BackupError::IncompleteExtraction {
            name:     key,
            written:  target.file_pointer,
            expected: target.file_size,
        });
        if let Some(err) = incomplete {
            tracing::warn!("{err}");
            self.report.warnings.push(err);
        }
        flushed?;
        closed?;
        Ok(())
    }

    pub fn finish(self) -> PassReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::BLOCK_HEADER_LEN;
    use crate::sink::MemorySink;

    const BLOCK: usize = 1024;

    fn block_header() -> Vec<u8> {
        let mut b = vec![0u8; BLOCK];
        b[0..2].copy_from_slice(&(BLOCK_HEADER_LEN as u16).to_le_bytes());
        b[40..44].copy_from_slice(&(BLOCK as u32).to_le_bytes());
        b
    }

    fn put_record(block: &mut [u8], at: usize, rtype: u16, payload: &[u8]) -> usize {
        block[at..at + 2].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        block[at + 2..at + 4].copy_from_slice(&rtype.to_le_bytes());
        let start = at + RECORD_HEADER_LEN;
        block[start..start + payload.len()].copy_from_slice(payload);
        start + payload.len()
    }

    fn geometry() -> Geometry {
        Geometry { block_size: BLOCK as u32, header_size: BLOCK_HEADER_LEN as u16 }
    }

    #[test]
    fn zero_size_record_ends_block() {
        let opts = ExtractOptions::default();
        let mut registry = ExtractionRegistry::new(&opts).unwrap();
        let mut sink = MemorySink::new();
        let mut w = SaveSetWalker::new(&mut registry, &mut sink, &opts, geometry(), Pass::Extract);

        let mut block = block_header();
        let next = put_record(&mut block, BLOCK_HEADER_LEN, 1, b"summary!");
        assert_eq!(w.process_record(&block, BLOCK_HEADER_LEN, false).unwrap(), (true, next));
        assert_eq!(w.process_record(&block, next, false).unwrap(), (true, BLOCK));
        assert!(w.process_block(&block, false, 0).unwrap());
    }

    #[test]
    fn unknown_type_invalidates_rest_of_block() {
        let opts = ExtractOptions::default();
        let mut registry = ExtractionRegistry::new(&opts).unwrap();
        let mut sink = MemorySink::new();
        let mut w = SaveSetWalker::new(&mut registry, &mut sink, &opts, geometry(), Pass::Extract);

        let mut block = block_header();
        put_record(&mut block, BLOCK_HEADER_LEN, 77, b"??");
        assert!(!w.process_block(&block, false, 0).unwrap());
        // Tail garbage on the last block is expected.
        assert!(!w.process_block(&block, true, BLOCK as u64).unwrap());

        let report = w.finish();
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(report.warnings[0], BackupError::UnknownRecordType { rtype: 77, size: 2 }));
    }

    #[test]
    fn mismatched_block_size_is_skipped() {
        let opts = ExtractOptions::default();
        let mut registry = ExtractionRegistry::new(&opts).unwrap();
        let mut sink = MemorySink::new();
        let mut w = SaveSetWalker::new(&mut registry, &mut sink, &opts, geometry(), Pass::Scan);

        let mut block = block_header();
        block[40..44].copy_from_slice(&2048u32.to_le_bytes());
        assert!(!w.process_block(&block, false, 0).unwrap());
        // The scan pass never reports.
        assert!(w.finish().warnings.is_empty());
    }

    #[test]
    fn mismatch_on_final_block_is_not_reported() {
        let opts = ExtractOptions::default();
        let mut registry = ExtractionRegistry::new(&opts).unwrap();
        let mut sink = MemorySink::new();
        let mut w = SaveSetWalker::new(&mut registry, &mut sink, &opts, geometry(), Pass::Extract);

        let mut block = block_header();
        block[40..44].copy_from_slice(&2048u32.to_le_bytes());
        assert!(!w.process_block(&block, true, BLOCK as u64).unwrap());
        assert!(w.finish().warnings.is_empty());
    }

    #[test]
    fn overrunning_payload_is_truncated() {
        let opts = ExtractOptions::default();
        let mut registry = ExtractionRegistry::new(&opts).unwrap();
        let mut sink = MemorySink::new();
        let mut w = SaveSetWalker::new(&mut registry, &mut sink, &opts, geometry(), Pass::Extract);

        let mut block = block_header();
        let at = BLOCK - RECORD_HEADER_LEN - 4;
        block[at..at + 2].copy_from_slice(&100u16.to_le_bytes());
        block[at + 2..at + 4].copy_from_slice(&4u16.to_le_bytes());
        assert_eq!(w.process_record(&block, at, false).unwrap(), (false, at));
        assert!(matches!(
            w.finish().warnings[0],
            BackupError::TruncatedHeader { what: "record payload", needed: 100, available: 4 }
        ));
    }
}
