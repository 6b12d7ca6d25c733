//! The raw LZ4 block format.
//!
//! A block is a sequence of tokens, each introducing a run of literal bytes and a
//! back-reference into the output produced so far. This is what the frame format
//! stores inside its blocks; you only need it directly when dealing with embedded
//! LZ4 data that was stripped of its framing.

mod decompress;

pub use decompress::*;
