//! Pass control.
//!
//! A run is one or two traversals of the same save set.  When content has
//! to be sniffed before anything is written, or the latest version of a
//! file is only known after reading everything, a scan pass runs first and
//! commits nothing; the extract pass then rewinds and does the real work.
//! The [`ExtractionRegistry`] lives for the whole run so the scan pass's
//! findings carry over.
//!
//! ```text
//!  probe first block ─► geometry
//!        │
//!        ├─ [Scan]    rewind ─► walk every block (sniff, learn versions)
//!        └─ [Extract] rewind ─► walk every block (open, write, list)
//! ```

use std::io::SeekFrom;

use crate::error::BackupError;
use crate::header::{BlockHeader, BLOCK_HEADER_LEN};
use crate::listing::FileEntry;
use crate::options::ExtractOptions;
use crate::registry::ExtractionRegistry;
use crate::sink::OutputSink;
use crate::source::ByteSource;
use crate::walker::{Geometry, PassReport, SaveSetWalker};

/// Largest block size accepted.  BACKUP itself writes at most 65 535 bytes
/// per block.
pub const MAX_BLOCK_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Learn versions and content modes; open nothing.
    Scan,
    /// Open handles, write content and collect the listing.
    Extract,
}

impl Pass {
    /// Whether this pass produces output and reports warnings.
    pub fn commits(self) -> bool {
        self == Pass::Extract
    }
}

/// Result of a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Traversals of the save set performed.
    pub passes:        usize,
    pub save_set_name: String,
    pub block_size:    u32,
    /// Target files, in save-set order.
    pub files:         Vec<FileEntry>,
    /// Files opened for extraction.
    pub extracted:     usize,
    /// Non-fatal problems met during the committing pass.
    pub warnings:      Vec<BackupError>,
}

/// Decodes one save set from `source` into `sink`.
pub struct SaveSetReader<B: ByteSource, S: OutputSink> {
    source:  B,
    sink:    S,
    options: ExtractOptions,
}

impl<B: ByteSource, S: OutputSink> SaveSetReader<B, S> {
    pub fn new(source: B, sink: S, options: ExtractOptions) -> Self {
        Self { source, sink, options }
    }

    pub fn into_parts(self) -> (B, S) {
        (self.source, self.sink)
    }

    /// Decode the save set starting at the source's current position.
    pub fn run(&mut self) -> Result<RunSummary, BackupError> {
        let mut registry = ExtractionRegistry::new(&self.options)?;
        let origin = self.source.tell()?;
        let total = self.source.len()?;

        let mut probe = vec![0u8; BLOCK_HEADER_LEN];
        let n = self.source.read_chunk(&mut probe)?;
        let first = BlockHeader::parse(&probe[..n])?;
        let geometry = Geometry { block_size: first.block_size(), header_size: first.header_size() };
        validate(geometry)?;

        let mut summary = RunSummary {
            save_set_name: first.save_set_name(),
            block_size: geometry.block_size,
            ..RunSummary::default()
        };
        tracing::debug!(
            save_set = %summary.save_set_name,
            block_size = geometry.block_size,
            header_size = geometry.header_size,
            "save set opened"
        );

        let passes: &[Pass] = if self.options.needs_two_passes() {
            &[Pass::Scan, Pass::Extract]
        } else {
            &[Pass::Extract]
        };
        for &pass in passes {
            registry.reset_for_pass();
            self.source.seek(SeekFrom::Start(origin))?;
            tracing::debug!(?pass, "starting pass");

            let report = self.traverse(&mut registry, geometry, pass, origin, total)?;
            summary.passes += 1;
            if pass.commits() {
                summary.files = report.files;
                summary.extracted = report.extracted;
                summary.warnings = report.warnings;
            }
        }
        Ok(summary)
    }

    /// One traversal.  The active file is closed on every exit path.
    fn traverse(
        &mut self,
        registry: &mut ExtractionRegistry<S::Handle>,
        geometry: Geometry,
        pass:     Pass,
        origin:   u64,
        total:    u64,
    ) -> Result<PassReport, BackupError> {
        let mut walker = SaveSetWalker::new(registry, &mut self.sink, &self.options, geometry, pass);
        let walked = walk_blocks(&mut self.source, &mut walker, geometry, origin, total);
        let closed = walker.close_active();
        let report = walker.finish();
        walked?;
        closed?;
        Ok(report)
    }
}

fn validate(geometry: Geometry) -> Result<(), BackupError> {
    let Geometry { block_size, header_size } = geometry;
    if block_size == 0 || block_size < u32::from(header_size) || block_size > MAX_BLOCK_SIZE {
        return Err(BackupError::InvalidBlockSize { block_size, header_size });
    }
    Ok(())
}

/// Feed blocks to `walker` until the source runs dry.  A short final read
/// is still walked.
fn walk_blocks<B: ByteSource, S: OutputSink>(
    source:   &mut B,
    walker:   &mut SaveSetWalker<'_, S>,
    geometry: Geometry,
    origin:   u64,
    total:    u64,
) -> Result<(), BackupError> {
    let block_size = geometry.block_size as usize;
    let mut block = vec![0u8; block_size];
    let mut offset = origin;
    while !source.at_end()? {
        let n = source.read_chunk(&mut block)?;
        if n == 0 {
            break;
        }
        let is_last = total.saturating_sub(offset) <= block_size as u64;
        let valid = walker.process_block(&block[..n], is_last, offset)?;
        if !valid {
            tracing::trace!(offset, "block ended early");
        }
        offset += n as u64;
        if n < block_size {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::sink::MemorySink;
    use crate::source::StreamSource;

    fn first_block(block_size: u32, header_size: u16) -> Vec<u8> {
        let mut b = vec![0u8; BLOCK_HEADER_LEN];
        b[0..2].copy_from_slice(&header_size.to_le_bytes());
        b[40..44].copy_from_slice(&block_size.to_le_bytes());
        b
    }

    fn run(bytes: Vec<u8>) -> Result<RunSummary, BackupError> {
        let source = StreamSource::new(Cursor::new(bytes)).unwrap();
        SaveSetReader::new(source, MemorySink::new(), ExtractOptions::default()).run()
    }

    #[test]
    fn rejects_unframeable_block_size() {
        assert!(matches!(
            run(first_block(0, 256)),
            Err(BackupError::InvalidBlockSize { block_size: 0, header_size: 256 })
        ));
        assert!(matches!(run(first_block(100, 256)), Err(BackupError::InvalidBlockSize { .. })));
    }

    #[test]
    fn short_first_block_is_fatal() {
        assert!(matches!(run(vec![0u8; 40]), Err(BackupError::TruncatedHeader { needed: 256, available: 40, .. })));
    }

    #[test]
    fn empty_save_set_runs_both_passes() {
        let mut bytes = first_block(512, 256);
        bytes.resize(512, 0);
        let summary = run(bytes).unwrap();
        assert_eq!(summary.passes, 2);
        assert_eq!(summary.block_size, 512);
        assert!(summary.files.is_empty() && summary.warnings.is_empty());
    }
}
