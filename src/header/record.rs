//! Record header (BRH) — frames every record inside a block.

use super::{read_u16, read_u32, Anchor, DecodeError, FieldSpec, Layout};

pub const RECORD_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
enum RecordField {
    RSize,
    RType,
    Flags,
    Address,
    BlockFlags,
}

use RecordField as F;

static RECORD_LAYOUT: Layout<6> = Layout::resolve([
    FieldSpec::new(Anchor::Start, 2),
    FieldSpec::new(Anchor::After(F::RSize as usize), 2),
    FieldSpec::new(Anchor::After(F::RType as usize), 4),
    FieldSpec::new(Anchor::After(F::Flags as usize), 4),
    FieldSpec::new(Anchor::After(F::Address as usize), 2),
    FieldSpec::new(Anchor::After(F::BlockFlags as usize), 2),
]);

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Null,
    Summary,
    Volume,
    File,
    Vbn,
    PhysVol,
    Lbn,
    Fid,
    FileExt,
    Lbn576,
    RsDirAttr,
    Alias,
    Unknown(u16),
}

impl From<u16> for RecordType {
    fn from(v: u16) -> Self {
        match v {
            0  => RecordType::Null,
            1  => RecordType::Summary,
            2  => RecordType::Volume,
            3  => RecordType::File,
            4  => RecordType::Vbn,
            5  => RecordType::PhysVol,
            6  => RecordType::Lbn,
            7  => RecordType::Fid,
            8  => RecordType::FileExt,
            9  => RecordType::Lbn576,
            10 => RecordType::RsDirAttr,
            11 => RecordType::Alias,
            n  => RecordType::Unknown(n),
        }
    }
}

impl RecordType {
    /// Records that leave the current file open.  Anything else marks a
    /// file boundary.
    pub fn continues_file(self) -> bool {
        matches!(self, RecordType::Vbn | RecordType::Volume | RecordType::Null)
    }
}

/// Record flag bits (low byte of the flags longword).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(pub u32);

impl RecordFlags {
    pub const BAD_DATA:       u32 = 0x80;
    pub const DIRECTORY:      u32 = 0x40;
    pub const NON_SEQUENTIAL: u32 = 0x20;
    pub const BLOCK_ERRORS:   u32 = 0x10;
    pub const ALIAS_ENTRY:    u32 = 0x08;
    pub const HEAD_ONLY:      u32 = 0x04;

    #[inline]
    fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn bad_data(self)       -> bool { self.has(Self::BAD_DATA) }
    pub fn directory(self)      -> bool { self.has(Self::DIRECTORY) }
    pub fn non_sequential(self) -> bool { self.has(Self::NON_SEQUENTIAL) }
    pub fn block_errors(self)   -> bool { self.has(Self::BLOCK_ERRORS) }
    pub fn alias_entry(self)    -> bool { self.has(Self::ALIAS_ENTRY) }
    pub fn head_only(self)      -> bool { self.has(Self::HEAD_ONLY) }
}

/// Borrowed view over a record header.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader<'a> {
    buf: &'a [u8],
}

impl<'a> RecordHeader<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        RECORD_LAYOUT.check(buf, "record header")?;
        Ok(Self { buf })
    }

    pub fn decoded_len(&self) -> usize {
        RECORD_LAYOUT.len()
    }

    /// Payload bytes following the header.
    pub fn size(&self) -> u16 {
        read_u16(self.buf, RECORD_LAYOUT.field(F::RSize as usize))
    }

    pub fn raw_type(&self) -> u16 {
        read_u16(self.buf, RECORD_LAYOUT.field(F::RType as usize))
    }

    pub fn record_type(&self) -> RecordType {
        RecordType::from(self.raw_type())
    }

    pub fn flags(&self) -> RecordFlags {
        RecordFlags(read_u32(self.buf, RECORD_LAYOUT.field(F::Flags as usize)))
    }

    pub fn address(&self) -> u32 {
        read_u32(self.buf, RECORD_LAYOUT.field(F::Address as usize))
    }

    pub fn block_flags(&self) -> u16 {
        read_u16(self.buf, RECORD_LAYOUT.field(F::BlockFlags as usize))
    }

    /// The header bytes, for diagnostics.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buf[..RECORD_HEADER_LEN]
    }
}
