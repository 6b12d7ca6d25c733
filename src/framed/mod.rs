//! The LZ4 frame formats.
//!
//! An lz4-compressed file typically consists of a single frame.
//!
//! The frame format is self-terminating, i.e. it can be embedded without a length prefix.
//! This also allows LZ4 frames to be concatenated back to back; the reader here decodes
//! a whole chain of them as one continuous stream.
//!
//! Three kinds of frame exist on the wire: the current format with a descriptor and
//! per-block headers, the legacy format from before the frame format was specified
//! (a bare sequence of size-prefixed blocks), and skippable frames, which carry
//! application data that a decoder passes over without interpreting.

mod decompress;
mod header;

/// The four magic bytes at the start of every modern LZ4 frame (little endian).
pub const MAGIC: u32 = 0x184D2204;
/// The magic of the legacy frame format, retired when the frame format was specified.
pub const LEGACY_MAGIC: u32 = 0x184C2102;
/// Skippable frames carry any of 16 magics; the low nibble is application-defined.
pub const SKIPPABLE_MAGIC: u32 = 0x184D2A50;
pub(crate) const SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;
/// The frame format sets the high bit of every block length field to indicate that the data was not compressed.
const INCOMPRESSIBLE: u32 = 1 << 31;
/// The LZ4 raw format maintains a lookback window of exactly 64KiB.
pub const WINDOW_SIZE: usize = 64 * 1024;
/// Legacy frames have no descriptor; every block decodes to at most 8MiB.
pub const LEGACY_BLOCK_MAXSIZE: usize = 8 * 1024 * 1024;
/// Worst case compressed size of a legacy block. A length field above this cannot
/// be a block and is taken as the magic of a following frame.
const LEGACY_BLOCK_COMPRESS_BOUND: usize =
    LEGACY_BLOCK_MAXSIZE + LEGACY_BLOCK_MAXSIZE / 255 + 16;

pub use decompress::*;
pub use header::{FrameKind, ParseError};
