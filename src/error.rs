use std::io;

use thiserror::Error;

use crate::header::DecodeError;
use crate::options::OptionsError;

/// Everything that can go wrong while decoding a save set.
///
/// `Io`, `InvalidBlockSize` and `InvalidOptions` end a run, as does a
/// `TruncatedHeader` on the very first block.  Everything else is recovered
/// locally (block, record or file skipped) and reported through
/// [`crate::controller::RunSummary::warnings`].
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("truncated {what}: {needed} bytes declared, {available} available")]
    TruncatedHeader {
        what:      &'static str,
        needed:    usize,
        available: usize,
    },
    #[error("invalid block size {found} read, {expected} expected")]
    BlockSizeMismatch { expected: u32, found: u32 },
    #[error("invalid record type {rtype} (size {size})")]
    UnknownRecordType { rtype: u16, size: u16 },
    #[error("{name} extracted {written}/{expected} bytes")]
    IncompleteExtraction { name: String, written: u64, expected: u64 },
    #[error("block size {block_size} cannot frame a {header_size}-byte block header")]
    InvalidBlockSize { block_size: u32, header_size: u16 },
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<DecodeError> for BackupError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::TruncatedHeader { what, needed, available } => {
                BackupError::TruncatedHeader { what, needed, available }
            }
        }
    }
}
