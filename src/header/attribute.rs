//! File-attribute sub-records (BSA) carried by File records.
//!
//! A File record payload starts with a 2-byte structure level, followed by
//! tagged sub-records:
//!
//! | Offset | Size   | Field                         |
//! |--------|--------|-------------------------------|
//! | 0      | 2      | payload size `n`              |
//! | 2      | 2      | attribute tag                 |
//! | 4      | `n`    | tag-specific payload          |
//!
//! Unlike the fixed headers, the layout of a sub-record is only known once
//! its size field has been read.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

use super::{read_u16, words, Anchor, DecodeError, FieldSpec, Layout};
use crate::timestamp::VmsTime;

/// Bytes of structure level preceding the first sub-record.
const FILE_RECORD_PREAMBLE: usize = 2;

/// Disk block size used by the RECATTR end-of-file arithmetic.
pub const DISK_BLOCK_SIZE: u64 = 512;

static ATTRIBUTE_FIXED: Layout<2> = Layout::resolve([
    FieldSpec::new(Anchor::Start, 2),
    FieldSpec::new(Anchor::After(0), 2),
]);

// ── Tags ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeTag {
    Filename,
    StrucLev,
    Fid,
    Backlink,
    FileSize,
    Uic,
    FPro,
    RPro,
    AcLevel,
    UChar,
    RecAttr,
    Revision,
    CreDate,
    RevDate,
    ExpDate,
    BakDate,
    VerLimit,
    Highwater,
    Unknown(u16),
}

impl From<u16> for AttributeTag {
    fn from(v: u16) -> Self {
        match v {
            42 => AttributeTag::Filename,
            43 => AttributeTag::StrucLev,
            44 => AttributeTag::Fid,
            45 => AttributeTag::Backlink,
            46 => AttributeTag::FileSize,
            47 => AttributeTag::Uic,
            48 => AttributeTag::FPro,
            49 => AttributeTag::RPro,
            50 => AttributeTag::AcLevel,
            51 => AttributeTag::UChar,
            52 => AttributeTag::RecAttr,
            53 => AttributeTag::Revision,
            54 => AttributeTag::CreDate,
            55 => AttributeTag::RevDate,
            56 => AttributeTag::ExpDate,
            57 => AttributeTag::BakDate,
            75 => AttributeTag::VerLimit,
            79 => AttributeTag::Highwater,
            n  => AttributeTag::Unknown(n),
        }
    }
}

impl From<AttributeTag> for u16 {
    fn from(tag: AttributeTag) -> u16 {
        match tag {
            AttributeTag::Filename   => 42,
            AttributeTag::StrucLev   => 43,
            AttributeTag::Fid        => 44,
            AttributeTag::Backlink   => 45,
            AttributeTag::FileSize   => 46,
            AttributeTag::Uic        => 47,
            AttributeTag::FPro       => 48,
            AttributeTag::RPro       => 49,
            AttributeTag::AcLevel    => 50,
            AttributeTag::UChar      => 51,
            AttributeTag::RecAttr    => 52,
            AttributeTag::Revision   => 53,
            AttributeTag::CreDate    => 54,
            AttributeTag::RevDate    => 55,
            AttributeTag::ExpDate    => 56,
            AttributeTag::BakDate    => 57,
            AttributeTag::VerLimit   => 75,
            AttributeTag::Highwater  => 79,
            AttributeTag::Unknown(n) => n,
        }
    }
}

/// The decoded shape of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Bytes(Vec<u8>),
    Words(Vec<u16>),
    Word(u16),
    Count(u32),
    Time(VmsTime),
}

impl AttributeTag {
    /// Decode a payload into the shape this tag carries.  Scalars whose
    /// payload is too short decode as zero.
    pub fn decode(self, payload: &[u8]) -> AttributeValue {
        match self {
            AttributeTag::Filename => AttributeValue::Text(latin1(payload)),
            AttributeTag::Fid
            | AttributeTag::Backlink
            | AttributeTag::Uic
            | AttributeTag::UChar
            | AttributeTag::RecAttr => AttributeValue::Words(words(payload)),
            AttributeTag::StrucLev
            | AttributeTag::FPro
            | AttributeTag::RPro
            | AttributeTag::AcLevel => AttributeValue::Bytes(payload.to_vec()),
            AttributeTag::Revision | AttributeTag::VerLimit => AttributeValue::Word(le_u16(payload)),
            AttributeTag::FileSize | AttributeTag::Highwater => AttributeValue::Count(le_u32(payload)),
            AttributeTag::CreDate
            | AttributeTag::RevDate
            | AttributeTag::ExpDate
            | AttributeTag::BakDate => AttributeValue::Time(VmsTime(le_i64(payload))),
            AttributeTag::Unknown(_) => AttributeValue::Bytes(payload.to_vec()),
        }
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn le_u16(b: &[u8]) -> u16 {
    if b.len() >= 2 { LittleEndian::read_u16(b) } else { 0 }
}

fn le_u32(b: &[u8]) -> u32 {
    if b.len() >= 4 { LittleEndian::read_u32(b) } else { 0 }
}

fn le_i64(b: &[u8]) -> i64 {
    if b.len() >= 8 { LittleEndian::read_i64(b) } else { 0 }
}

// ── AttributeRecord ──────────────────────────────────────────────────────────

/// Borrowed view over one tagged sub-record.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRecord<'a> {
    buf:  &'a [u8],
    size: usize,
}

impl<'a> AttributeRecord<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        ATTRIBUTE_FIXED.check(buf, "attribute header")?;
        // Payload length is bound only now that the size field is readable.
        let size = usize::from(read_u16(buf, ATTRIBUTE_FIXED.field(0)));
        let needed = ATTRIBUTE_FIXED.len() + size;
        if buf.len() < needed {
            return Err(DecodeError::TruncatedHeader {
                what:      "attribute payload",
                needed,
                available: buf.len(),
            });
        }
        Ok(Self { buf, size })
    }

    pub fn tag(&self) -> AttributeTag {
        AttributeTag::from(read_u16(self.buf, ATTRIBUTE_FIXED.field(1)))
    }

    pub fn payload(&self) -> &'a [u8] {
        let start = ATTRIBUTE_FIXED.len();
        &self.buf[start..start + self.size]
    }

    pub fn decoded_len(&self) -> usize {
        ATTRIBUTE_FIXED.len() + self.size
    }
}

// ── RecordFormat / RecordAttributes ─────────────────────────────────────────

/// RMS record format (low nibble of the RECATTR type byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    #[default]
    Udf,
    Fix,
    Var,
    Vfc,
    Stm,
    StmLf,
    StmCr,
    Unknown(u8),
}

impl From<u8> for RecordFormat {
    fn from(v: u8) -> Self {
        // The high nibble is occasionally set on real media; only the low
        // nibble carries the format.
        match v & 0x0F {
            0 => RecordFormat::Udf,
            1 => RecordFormat::Fix,
            2 => RecordFormat::Var,
            3 => RecordFormat::Vfc,
            4 => RecordFormat::Stm,
            5 => RecordFormat::StmLf,
            6 => RecordFormat::StmCr,
            n => RecordFormat::Unknown(n),
        }
    }
}

impl RecordFormat {
    pub fn is_variable(self) -> bool {
        matches!(self, RecordFormat::Var | RecordFormat::Vfc)
    }

    pub fn is_stream_like(self) -> bool {
        matches!(self, RecordFormat::Fix | RecordFormat::Stm | RecordFormat::StmLf | RecordFormat::StmCr)
    }
}

/// Record attribute byte values.
pub mod rattrib {
    pub const FTN: u8 = 0;
    pub const CR:  u8 = 1;
    pub const CRN: u8 = 2;
    pub const BLK: u8 = 3;
    pub const PRN: u8 = 4;
}

/// Decoded RECATTR (FAT) area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordAttributes {
    pub format:          RecordFormat,
    pub attributes:      u8,
    pub record_size:     u16,
    pub highest_block:   u32,
    pub end_of_file_block: u32,
    pub first_free_byte: u16,
}

impl RecordAttributes {
    pub fn decode(payload: &[u8]) -> Self {
        let w = words(payload);
        let word = |i: usize| w.get(i).copied().unwrap_or(0);
        // Block numbers are stored high word first.
        let long = |i: usize| (u32::from(word(i)) << 16) | u32::from(word(i + 1));
        Self {
            format:            RecordFormat::from(payload.first().copied().unwrap_or(0)),
            attributes:        payload.get(1).copied().unwrap_or(0),
            record_size:       word(1),
            highest_block:     long(2),
            end_of_file_block: long(4),
            first_free_byte:   word(6),
        }
    }

    /// File length in bytes: every block before the end-of-file block is
    /// full, the last one holds `first_free_byte` bytes.
    pub fn file_size_bytes(&self) -> u64 {
        (u64::from(self.end_of_file_block) * DISK_BLOCK_SIZE + u64::from(self.first_free_byte))
            .saturating_sub(DISK_BLOCK_SIZE)
    }

    /// Blocks in use, as DIRECTORY reports them.
    pub fn used_blocks(&self) -> u32 {
        if self.first_free_byte == 0 {
            self.end_of_file_block.saturating_sub(1)
        } else {
            self.end_of_file_block
        }
    }
}

// ── FileAttributes ───────────────────────────────────────────────────────────

/// Attributes of one file, built from the sub-records of a File record.
/// A tag seen twice keeps its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    blobs: BTreeMap<AttributeTag, Vec<u8>>,
}

impl FileAttributes {
    /// Scan sub-records from a File record payload.  `declared` is the
    /// record's size field; scanning stops when it is exhausted or fewer
    /// bytes than a sub-record header remain.
    pub fn decode(payload: &[u8], declared: usize) -> Result<Self, DecodeError> {
        let end = declared.min(payload.len());
        let mut attrs = FileAttributes::default();
        let mut addr = FILE_RECORD_PREAMBLE;
        while addr < end {
            if end - addr < ATTRIBUTE_FIXED.len() {
                break;
            }
            let rec = AttributeRecord::parse(&payload[addr..end])?;
            attrs.blobs.insert(rec.tag(), rec.payload().to_vec());
            addr += rec.decoded_len();
        }
        Ok(attrs)
    }

    pub fn insert(&mut self, tag: AttributeTag, payload: Vec<u8>) {
        self.blobs.insert(tag, payload);
    }

    pub fn raw(&self, tag: AttributeTag) -> Option<&[u8]> {
        self.blobs.get(&tag).map(Vec::as_slice)
    }

    pub fn value(&self, tag: AttributeTag) -> Option<AttributeValue> {
        self.raw(tag).map(|b| tag.decode(b))
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeTag, AttributeValue)> + '_ {
        self.blobs.iter().map(|(&tag, b)| (tag, tag.decode(b)))
    }

    fn words_of(&self, tag: AttributeTag) -> Vec<u16> {
        self.raw(tag).map(words).unwrap_or_default()
    }

    fn time_of(&self, tag: AttributeTag) -> VmsTime {
        VmsTime(self.raw(tag).map(le_i64).unwrap_or(0))
    }

    /// Full file specification, e.g. `[DIR.SUB]NAME.EXT;3`.
    pub fn filename(&self) -> String {
        self.raw(AttributeTag::Filename).map(latin1).unwrap_or_default()
    }

    pub fn fid(&self) -> Vec<u16> {
        self.words_of(AttributeTag::Fid)
    }

    pub fn backlink(&self) -> Vec<u16> {
        self.words_of(AttributeTag::Backlink)
    }

    /// Allocated size in blocks.
    pub fn allocated_blocks(&self) -> u32 {
        self.raw(AttributeTag::FileSize).map(le_u32).unwrap_or(0)
    }

    /// Owner UIC as `[member, group]`.
    pub fn uic(&self) -> Vec<u16> {
        self.words_of(AttributeTag::Uic)
    }

    pub fn protection(&self) -> Vec<u8> {
        self.raw(AttributeTag::FPro).map(<[u8]>::to_vec).unwrap_or_default()
    }

    pub fn characteristics(&self) -> Vec<u16> {
        self.words_of(AttributeTag::UChar)
    }

    pub fn record_attributes(&self) -> RecordAttributes {
        self.raw(AttributeTag::RecAttr).map(RecordAttributes::decode).unwrap_or_default()
    }

    pub fn record_format(&self) -> RecordFormat {
        self.record_attributes().format
    }

    pub fn file_size_bytes(&self) -> u64 {
        self.record_attributes().file_size_bytes()
    }

    pub fn revision(&self) -> u16 {
        self.raw(AttributeTag::Revision).map(le_u16).unwrap_or(0)
    }

    pub fn created(&self) -> VmsTime {
        self.time_of(AttributeTag::CreDate)
    }

    pub fn revised(&self) -> VmsTime {
        self.time_of(AttributeTag::RevDate)
    }

    pub fn expires(&self) -> VmsTime {
        self.time_of(AttributeTag::ExpDate)
    }

    pub fn backed_up(&self) -> VmsTime {
        self.time_of(AttributeTag::BakDate)
    }

    pub fn version_limit(&self) -> u16 {
        self.raw(AttributeTag::VerLimit).map(le_u16).unwrap_or(0)
    }

    pub fn highwater(&self) -> u32 {
        self.raw(AttributeTag::Highwater).map(le_u32).unwrap_or(0)
    }
}
