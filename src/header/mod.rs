//! Binary header codec for save-set structures.
//!
//! # Layout tables
//! Every fixed header kind owns one static [`Layout`], resolved at compile
//! time from a list of [`FieldSpec`]s.  A field is anchored either at the
//! start of the header, directly after an earlier field, or on top of an
//! earlier field (sub-fields and flag bytes overlay their parent).  The
//! resolved table is an array of `(offset, size)` pairs indexed by the
//! header's field enumeration, so no per-instance table is ever built.
//!
//! # Views
//! Header types are thin views over a borrowed byte slice.  `parse` checks
//! the slice against the layout length once; every accessor afterwards is a
//! bounds-safe little-endian read at a precomputed offset.
//!
//! The attribute sub-record is the one dynamic kind: its payload length is
//! carried in its own first field and is bound only after that field has
//! been read (see [`attribute::AttributeRecord`]).
//!
//! # Endianness
//! Everything on the medium is little-endian (VAX byte order).

pub mod attribute;
pub mod block;
pub mod record;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

pub use attribute::{AttributeRecord, AttributeTag, FileAttributes, RecordAttributes, RecordFormat};
pub use block::{BlockHeader, BLOCK_HEADER_LEN};
pub use record::{RecordFlags, RecordHeader, RecordType, RECORD_HEADER_LEN};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated {what}: {needed} bytes declared, {available} available")]
    TruncatedHeader {
        what:      &'static str,
        needed:    usize,
        available: usize,
    },
}

// ── Layout descriptors ───────────────────────────────────────────────────────

/// Where a field starts, relative to fields declared before it.
#[derive(Debug, Clone, Copy)]
pub enum Anchor {
    Start,
    /// Immediately after field `n`.
    After(usize),
    /// Same offset as field `n`.
    Over(usize),
}

/// One declared field: anchor plus `width × count` bytes.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub anchor: Anchor,
    pub width:  usize,
    pub count:  usize,
}

impl FieldSpec {
    pub const fn new(anchor: Anchor, width: usize) -> Self {
        Self { anchor, width, count: 1 }
    }

    pub const fn array(anchor: Anchor, width: usize, count: usize) -> Self {
        Self { anchor, width, count }
    }
}

/// A resolved field: absolute offset and total size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub size:   usize,
}

impl Field {
    #[inline]
    pub const fn end(self) -> usize {
        self.offset + self.size
    }
}

/// Static field table for one header kind.
#[derive(Debug, Clone, Copy)]
pub struct Layout<const N: usize> {
    fields: [Field; N],
    len:    usize,
}

impl<const N: usize> Layout<N> {
    /// Resolve anchors into absolute offsets.  Anchors may only reference
    /// earlier fields; a forward reference fails const evaluation.
    pub const fn resolve(specs: [FieldSpec; N]) -> Self {
        let mut fields = [Field { offset: 0, size: 0 }; N];
        let mut len = 0;
        let mut i = 0;
        while i < N {
            let spec = specs[i];
            let offset = match spec.anchor {
                Anchor::Start     => 0,
                Anchor::After(j)  => fields[j].offset + fields[j].size,
                Anchor::Over(j)   => fields[j].offset,
            };
            let size = spec.width * spec.count;
            fields[i] = Field { offset, size };
            if offset + size > len {
                len = offset + size;
            }
            i += 1;
        }
        Self { fields, len }
    }

    #[inline]
    pub const fn field(&self, index: usize) -> Field {
        self.fields[index]
    }

    /// Bytes covered by the furthest field.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Fail unless `buf` covers the whole layout.
    pub fn check(&self, buf: &[u8], what: &'static str) -> Result<(), DecodeError> {
        if buf.len() < self.len {
            return Err(DecodeError::TruncatedHeader {
                what,
                needed:    self.len,
                available: buf.len(),
            });
        }
        Ok(())
    }
}

// ── Field readers ────────────────────────────────────────────────────────────
//
// Callers must have run `Layout::check` on `buf`; the slices below are then
// always in range.

#[inline]
pub(crate) fn read_u8(buf: &[u8], f: Field) -> u8 {
    buf[f.offset]
}

#[inline]
pub(crate) fn read_u16(buf: &[u8], f: Field) -> u16 {
    LittleEndian::read_u16(&buf[f.offset..f.offset + 2])
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], f: Field) -> u32 {
    LittleEndian::read_u32(&buf[f.offset..f.offset + 4])
}

#[inline]
pub(crate) fn read_bytes(buf: &[u8], f: Field) -> &[u8] {
    &buf[f.offset..f.end()]
}

/// Little-endian 16-bit words of `bytes`; a trailing odd byte is dropped.
pub(crate) fn words(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(LittleEndian::read_u16).collect()
}
