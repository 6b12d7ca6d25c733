#![allow(non_upper_case_globals)]

use thiserror::Error;
use fehler::{throw, throws};
use bitflags::bitflags;

use super::{LEGACY_MAGIC, MAGIC, SKIPPABLE_MAGIC, SKIPPABLE_MASK};

bitflags! {
    pub struct Flags: u8 {
        const IndependentBlocks = 0b00100000;
        const BlockChecksums    = 0b00010000;
        const ContentSize       = 0b00001000;
        const ContentChecksum   = 0b00000100;
        const DictionaryId      = 0b00000001;
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ParseError {
    #[error("at the time of writing this, spec says value {0} is reserved")]
    UnimplementedBlocksize(u8),
    #[error("file version {0} not supported")]
    UnsupportedVersion(u8),
    #[error("reserved bits in flags set")]
    ReservedFlagBitsSet,
    #[error("reserved bits in bd set")]
    ReservedBdBitsSet,
}

impl Flags {
    #[throws(ParseError)]
    pub fn parse(i: u8) -> Self {
        let version = i >> 6;
        if version != 1 {
            throw!(ParseError::UnsupportedVersion(version));
        }
        if (i & 0b10) != 0 {
            throw!(ParseError::ReservedFlagBitsSet);
        }

        Flags::from_bits_truncate(i)
    }

    pub fn independent_blocks(&self) -> bool { self.contains(Flags::IndependentBlocks) }
    pub fn block_checksums(&self)    -> bool { self.contains(Flags::BlockChecksums) }
    pub fn content_size(&self)       -> bool { self.contains(Flags::ContentSize) }
    pub fn content_checksum(&self)   -> bool { self.contains(Flags::ContentChecksum) }
    pub fn dictionary_id(&self)      -> bool { self.contains(Flags::DictionaryId) }
}

#[derive(Debug)]
pub struct BlockDescriptor(pub u8); // ??? or what else could "BD" stand for ???
impl BlockDescriptor {
    #[throws(ParseError)]
    pub fn parse(i: u8) -> Self {
        if (i & 0b10001111) != 0 {
            throw!(ParseError::ReservedBdBitsSet);
        }
        BlockDescriptor(i)
    }

    #[throws(ParseError)]
    pub fn block_maxsize(&self) -> usize {
        let size = (self.0 >> 4) & 0b111;
        if (4..8).contains(&size) {
            1 << (size * 2 + 8)
        } else {
            throw!(ParseError::UnimplementedBlocksize(size))
        }
    }
}

/// The kind of frame a magic number announces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameKind {
    General,
    Legacy,
    Skippable,
}

impl FrameKind {
    /// Classify a magic word. `None` means the stream is not LZ4 at all.
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            MAGIC => Some(FrameKind::General),
            LEGACY_MAGIC => Some(FrameKind::Legacy),
            m if m & SKIPPABLE_MASK == SKIPPABLE_MAGIC => Some(FrameKind::Skippable),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_must_be_one() {
        assert_eq!(Flags::parse(0x00).unwrap_err(), ParseError::UnsupportedVersion(0));
        assert_eq!(Flags::parse(0xC0).unwrap_err(), ParseError::UnsupportedVersion(3));
        assert!(Flags::parse(0x60).is_ok());
    }

    #[test]
    fn reserved_flag_bit_rejected() {
        assert_eq!(Flags::parse(0x62).unwrap_err(), ParseError::ReservedFlagBitsSet);
    }

    #[test]
    fn bd_reserved_bits_rejected() {
        assert_eq!(BlockDescriptor::parse(0x41).unwrap_err(), ParseError::ReservedBdBitsSet);
        assert_eq!(BlockDescriptor::parse(0xC0).unwrap_err(), ParseError::ReservedBdBitsSet);
    }

    #[test]
    fn bd_sizes() {
        assert_eq!(BlockDescriptor::parse(0x40).unwrap().block_maxsize().unwrap(), 64 * 1024);
        assert_eq!(BlockDescriptor::parse(0x50).unwrap().block_maxsize().unwrap(), 256 * 1024);
        assert_eq!(BlockDescriptor::parse(0x60).unwrap().block_maxsize().unwrap(), 1024 * 1024);
        assert_eq!(BlockDescriptor::parse(0x70).unwrap().block_maxsize().unwrap(), 4 * 1024 * 1024);
        for reserved in 0..4u8 {
            let bd = BlockDescriptor::parse(reserved << 4).unwrap();
            assert_eq!(
                bd.block_maxsize().unwrap_err(),
                ParseError::UnimplementedBlocksize(reserved)
            );
        }
    }

    #[test]
    fn magic_classification() {
        assert_eq!(FrameKind::from_magic(0x184D2204), Some(FrameKind::General));
        assert_eq!(FrameKind::from_magic(0x184C2102), Some(FrameKind::Legacy));
        for nibble in 0..16u32 {
            assert_eq!(FrameKind::from_magic(0x184D2A50 | nibble), Some(FrameKind::Skippable));
        }
        assert_eq!(FrameKind::from_magic(0x184D2A4F), None);
        assert_eq!(FrameKind::from_magic(0xDEADBEEF), None);
    }
}
