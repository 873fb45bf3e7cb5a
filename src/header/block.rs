//! Block header (BBH) — the first 256 bytes of every save-set block.

use super::{read_bytes, read_u16, read_u32, read_u8, Anchor, DecodeError, FieldSpec, Layout};

/// Declared length of a block header on the medium.
pub const BLOCK_HEADER_LEN: usize = 256;

/// `flags` bit: block CRC was not computed.
pub const BBH_FLAG_NOCRC: u32 = 0x0000_0001;

/// Field indices into [`BLOCK_LAYOUT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BlockField {
    Size,
    OpSys,
    SubSys,
    Applic,
    Number,
    Fill1,
    StrucLev,
    StrucVer,
    StrucLevByte,
    VolNum,
    Crc,
    BlockSize,
    Flags,
    SsName,
    Fid,
    Did,
    FileName,
    RType,
    RAttrib,
    RSize,
    BktSize,
    VfcSize,
    MaxRec,
    FileSize,
    Reserved2,
    Checksum,
}

use BlockField as F;

pub static BLOCK_LAYOUT: Layout<26> = Layout::resolve([
    FieldSpec::new(Anchor::Start, 2),                              // Size
    FieldSpec::new(Anchor::After(F::Size as usize), 2),            // OpSys
    FieldSpec::new(Anchor::After(F::OpSys as usize), 2),           // SubSys
    FieldSpec::new(Anchor::After(F::SubSys as usize), 2),          // Applic
    FieldSpec::new(Anchor::After(F::Applic as usize), 4),          // Number
    FieldSpec::array(Anchor::After(F::Number as usize), 1, 20),    // Fill1
    FieldSpec::new(Anchor::After(F::Fill1 as usize), 2),           // StrucLev
    FieldSpec::new(Anchor::Over(F::StrucLev as usize), 1),         // StrucVer
    FieldSpec::new(Anchor::After(F::StrucVer as usize), 1),        // StrucLevByte
    FieldSpec::new(Anchor::After(F::StrucLev as usize), 2),        // VolNum
    FieldSpec::new(Anchor::After(F::VolNum as usize), 4),          // Crc
    FieldSpec::new(Anchor::After(F::Crc as usize), 4),             // BlockSize
    FieldSpec::new(Anchor::After(F::BlockSize as usize), 4),       // Flags
    FieldSpec::array(Anchor::After(F::Flags as usize), 1, 32),     // SsName
    FieldSpec::array(Anchor::After(F::SsName as usize), 2, 3),     // Fid
    FieldSpec::array(Anchor::After(F::Fid as usize), 2, 3),        // Did
    FieldSpec::array(Anchor::After(F::Did as usize), 1, 128),      // FileName
    FieldSpec::new(Anchor::After(F::FileName as usize), 1),        // RType
    FieldSpec::new(Anchor::After(F::RType as usize), 1),           // RAttrib
    FieldSpec::new(Anchor::After(F::RAttrib as usize), 2),         // RSize
    FieldSpec::new(Anchor::After(F::RSize as usize), 1),           // BktSize
    FieldSpec::new(Anchor::After(F::BktSize as usize), 1),         // VfcSize
    FieldSpec::new(Anchor::After(F::VfcSize as usize), 2),         // MaxRec
    FieldSpec::new(Anchor::After(F::MaxRec as usize), 4),          // FileSize
    FieldSpec::array(Anchor::After(F::FileSize as usize), 1, 22),  // Reserved2
    FieldSpec::new(Anchor::After(F::Reserved2 as usize), 2),       // Checksum
]);

/// Borrowed view over a block header.
#[derive(Debug, Clone, Copy)]
pub struct BlockHeader<'a> {
    buf: &'a [u8],
}

impl<'a> BlockHeader<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        BLOCK_LAYOUT.check(buf, "block header")?;
        Ok(Self { buf })
    }

    #[inline]
    fn field(f: BlockField) -> super::Field {
        BLOCK_LAYOUT.field(f as usize)
    }

    /// Bytes decoded by this view.
    pub fn decoded_len(&self) -> usize {
        BLOCK_LAYOUT.len()
    }

    /// Header length declared on the medium; records start here.
    pub fn header_size(&self) -> u16 {
        read_u16(self.buf, Self::field(F::Size))
    }

    pub fn opsys(&self) -> u16 {
        read_u16(self.buf, Self::field(F::OpSys))
    }

    pub fn number(&self) -> u32 {
        read_u32(self.buf, Self::field(F::Number))
    }

    pub fn structure_version(&self) -> u8 {
        read_u8(self.buf, Self::field(F::StrucVer))
    }

    pub fn structure_level(&self) -> u8 {
        read_u8(self.buf, Self::field(F::StrucLevByte))
    }

    pub fn volume_number(&self) -> u16 {
        read_u16(self.buf, Self::field(F::VolNum))
    }

    pub fn crc(&self) -> u32 {
        read_u32(self.buf, Self::field(F::Crc))
    }

    /// Declared block size; zero means "same as the save set".
    pub fn block_size(&self) -> u32 {
        read_u32(self.buf, Self::field(F::BlockSize))
    }

    pub fn flags(&self) -> u32 {
        read_u32(self.buf, Self::field(F::Flags))
    }

    pub fn crc_disabled(&self) -> bool {
        self.flags() & BBH_FLAG_NOCRC != 0
    }

    /// Save-set name.  Stored as a counted string: the first byte is the
    /// length, NULs are dropped.
    pub fn save_set_name(&self) -> String {
        let raw = read_bytes(self.buf, Self::field(F::SsName));
        let count = usize::from(raw[0]).min(raw.len() - 1);
        raw[1..=count]
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| char::from(b))
            .collect()
    }

    pub fn checksum(&self) -> u16 {
        read_u16(self.buf, Self::field(F::Checksum))
    }

    /// A block belongs to a save set of `block_size` when it declares the
    /// same size, or zero.
    pub fn is_compatible_with(&self, block_size: u32) -> bool {
        let size = self.block_size();
        size == 0 || size == block_size
    }
}
