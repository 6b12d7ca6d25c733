#![forbid(unsafe_code)]

//! LZ4 decompression.
//!
//! The [`framed`] module reads whole LZ4 files or streams: modern frames,
//! pre-frame legacy streams and skippable frames, concatenated back to back.
//! The [`raw`] module decodes a single LZ4 block with no framing around it.

pub mod raw;
pub mod framed;

pub use raw::*;
pub use framed::*;
