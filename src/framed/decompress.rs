use byteorder::{LE, ReadBytesExt};
use std::hash::Hasher;
use std::io::{self, BufRead, ErrorKind, Read};
use std::cmp;
use std::convert::TryInto;
use twox_hash::XxHash32;
use thiserror::Error;
use fehler::{throw, throws};

use super::{
    INCOMPRESSIBLE, LEGACY_BLOCK_COMPRESS_BOUND, LEGACY_BLOCK_MAXSIZE, WINDOW_SIZE,
};
use super::header::{self, BlockDescriptor, Flags, FrameKind};
use crate::raw;

/// Errors when decompressing LZ4 frames.
#[derive(Error, Debug)]
pub enum DecompressionError {
    #[error("error reading from the input you gave me")]
    InputError(#[from] io::Error),
    #[error("the raw LZ4 decompression failed (data corruption?)")]
    CodecError(#[from] raw::DecodeError),
    #[error("invalid header")]
    HeaderParseError(#[from] header::ParseError),
    #[error("wrong magic number in file header: {0:08x}")]
    WrongMagic(u32),
    #[error("the header checksum was invalid")]
    HeaderChecksumFail,
    #[error("a block checksum was invalid")]
    BlockChecksumFail,
    #[error("the frame checksum was invalid")]
    FrameChecksumFail,
    #[error("stream contains a compressed block with a size so large we can't even compute it (let alone fit the block in memory...)")]
    BlockLengthOverflow,
    #[error("a block decompressed to more data than allowed")]
    BlockSizeOverflow,
    #[error("a block's payload was cut short by the end of the stream")]
    ShortRead,
    #[error("the stream ended in the middle of a frame")]
    EndOfStream,
}
type Error = DecompressionError; // do it this way for better docs

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::new(ErrorKind::Other, e)
    }
}

/// A frame whose header has been read and whose blocks are being decoded.
///
/// Skippable frames never appear here: the header reader consumes them whole.
enum Frame {
    General {
        flags: Flags,
        block_maxsize: usize,
        content_size: Option<u64>,
        dictionary_id: Option<u32>,
        content_hasher: Option<XxHash32>,
        carryover_window: Option<Vec<u8>>,
    },
    Legacy,
}

enum BlockOutcome {
    Data,
    EndOfFrame,
}

/// Turn an abrupt end of input inside a frame structure into its own error.
fn eof_is_abrupt(e: io::Error) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::EndOfStream
    } else {
        e.into()
    }
}

/// Same, but for block payloads, which get a more precise diagnosis.
fn eof_is_short(e: io::Error) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::ShortRead
    } else {
        e.into()
    }
}

/// Reads exactly `buf.len()` bytes, returning `false` on a clean end of input
/// before the first byte. Running dry mid-buffer is an `EndOfStream` error.
#[throws]
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> bool {
    loop {
        match reader.read(&mut buf[..1]) {
            Ok(0) => return false,
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => throw!(Error::from(e)),
        }
    }
    reader.read_exact(&mut buf[1..]).map_err(eof_is_abrupt)?;
    true
}

/// Configures frame decompression. Create it using `Default::default()`.
#[derive(Clone, Copy, Debug)]
pub struct DecompressionSettings {
    verify_checksums: bool,
}

impl Default for DecompressionSettings {
    fn default() -> Self {
        Self { verify_checksums: true }
    }
}

impl DecompressionSettings {
    /// Whether header, block and content checksums are verified against the data.
    /// The checksum fields are always parsed and consumed either way, so disabling
    /// verification never changes how much of the stream is read.
    ///
    /// Verification is enabled by default.
    pub fn verify_checksums(&mut self, v: bool) -> &mut Self {
        self.verify_checksums = v;
        self
    }

    /// Read every frame in `reader` into a vector and return it.
    #[throws]
    pub fn decompress<R: Read>(&self, reader: R) -> Vec<u8> {
        let mut plaintext = Vec::new();
        LZ4FrameReader::with_settings(reader, *self)?
            .into_read()
            .read_to_end(&mut plaintext)?;
        plaintext
    }
}

/// Read a stream of LZ4 frames.
///
/// This reader decodes the blocks inside the frames one by one, moving on to the
/// next frame when the current one ends. Skippable frames are passed over wherever
/// a frame boundary allows one.
pub struct LZ4FrameReader<R: Read> {
    reader: R,
    settings: DecompressionSettings,
    frame: Option<Frame>,
    read_buf: Vec<u8>,
    /// A legacy frame ends when its length field holds the next frame's magic;
    /// that magic is parked here until the next header read.
    carried_magic: Option<u32>,
}

impl<R: Read> LZ4FrameReader<R> {
    /// Start reading frames, verifying all checksums on the way.
    #[throws]
    pub fn new(reader: R) -> Self {
        Self::with_settings(reader, DecompressionSettings::default())?
    }

    /// Start reading frames with explicit settings.
    ///
    /// The first frame header is read eagerly; an input that is already at its end
    /// yields a reader that reports end of stream on the first use.
    #[throws]
    pub fn with_settings(reader: R, settings: DecompressionSettings) -> Self {
        let mut this = LZ4FrameReader {
            reader,
            settings,
            frame: None,
            read_buf: Vec::new(),
            carried_magic: None,
        };
        this.frame = this.read_frame_header()?;
        this
    }

    /// Maximum number of bytes a single block of the current frame decodes to.
    pub fn block_size(&self) -> usize {
        match &self.frame {
            Some(Frame::General { block_maxsize, .. }) => *block_maxsize,
            Some(Frame::Legacy) => LEGACY_BLOCK_MAXSIZE,
            None => 0,
        }
    }

    /// The decoded size the current frame declares for itself, if it does.
    pub fn frame_size(&self) -> Option<u64> {
        match &self.frame {
            Some(Frame::General { content_size, .. }) => *content_size,
            _ => None,
        }
    }

    /// The dictionary id the current frame declares, if any.
    ///
    /// Dictionary lookup is the caller's business; this reader only surfaces the id.
    pub fn dictionary_id(&self) -> Option<u32> {
        match &self.frame {
            Some(Frame::General { dictionary_id, .. }) => *dictionary_id,
            _ => None,
        }
    }

    /// Wrap this reader so it can be used as a `std::io::Read`.
    pub fn into_read(self) -> LZ4FrameIoReader<R> {
        LZ4FrameIoReader {
            buffer: Vec::with_capacity(self.block_size()),
            bytes_taken: 0,
            frame_reader: self,
        }
    }

    /// Decode one block into `output`, crossing frame boundaries as needed.
    ///
    /// Leaving `output` empty means the stream has ended.
    #[throws]
    pub fn decode_block(&mut self, output: &mut Vec<u8>) {
        assert!(output.is_empty(), "You must pass an empty buffer to this interface.");

        loop {
            let mut frame = match self.frame.take() {
                Some(frame) => frame,
                None => return,
            };

            let outcome = match &mut frame {
                Frame::General {
                    flags,
                    block_maxsize,
                    content_hasher,
                    carryover_window,
                    ..
                } => self.decode_general_block(
                    *flags,
                    *block_maxsize,
                    content_hasher,
                    carryover_window,
                    output,
                )?,
                Frame::Legacy => self.decode_legacy_block(output)?,
            };

            match outcome {
                BlockOutcome::Data => {
                    self.frame = Some(frame);
                    // blocks can legitimately decode to nothing; keep going
                    if !output.is_empty() {
                        return;
                    }
                }
                BlockOutcome::EndOfFrame => {
                    self.frame = self.read_frame_header()?;
                }
            }
        }
    }

    /// Read the next frame header, consuming any skippable frames on the way.
    /// `None` means the input ended cleanly at a frame boundary.
    #[throws]
    fn read_frame_header(&mut self) -> Option<Frame> {
        loop {
            let magic = match self.carried_magic.take() {
                Some(magic) => magic,
                None => {
                    let mut word = [0u8; 4];
                    if !read_exact_or_eof(&mut self.reader, &mut word)? {
                        return None;
                    }
                    u32::from_le_bytes(word)
                }
            };

            match FrameKind::from_magic(magic) {
                Some(FrameKind::General) => return Some(self.read_frame_descriptor()?),
                Some(FrameKind::Legacy) => return Some(Frame::Legacy),
                Some(FrameKind::Skippable) => {
                    let length = self.reader.read_u32::<LE>().map_err(eof_is_abrupt)?;
                    let skipped = io::copy(
                        &mut (&mut self.reader).take(u64::from(length)),
                        &mut io::sink(),
                    )?;
                    if skipped != u64::from(length) {
                        throw!(Error::EndOfStream);
                    }
                }
                None => throw!(Error::WrongMagic(magic)),
            }
        }
    }

    #[throws]
    fn read_frame_descriptor(&mut self) -> Frame {
        let reader = &mut self.reader;

        let flags_byte = reader.read_u8().map_err(eof_is_abrupt)?;
        let flags = Flags::parse(flags_byte)?;
        let bd_byte = reader.read_u8().map_err(eof_is_abrupt)?;
        let block_maxsize = BlockDescriptor::parse(bd_byte)?.block_maxsize()?;

        let mut hasher = XxHash32::with_seed(0);
        hasher.write(&[flags_byte, bd_byte]);

        let content_size = if flags.content_size() {
            let i = reader.read_u64::<LE>().map_err(eof_is_abrupt)?;
            hasher.write(&i.to_le_bytes());
            Some(i)
        } else {
            None
        };

        let dictionary_id = if flags.dictionary_id() {
            let i = reader.read_u32::<LE>().map_err(eof_is_abrupt)?;
            hasher.write(&i.to_le_bytes());
            Some(i)
        } else {
            None
        };

        let header_checksum = reader.read_u8().map_err(eof_is_abrupt)?;
        if self.settings.verify_checksums && header_checksum != (hasher.finish() >> 8) as u8 {
            throw!(Error::HeaderChecksumFail);
        }

        let content_hasher = if flags.content_checksum() && self.settings.verify_checksums {
            Some(XxHash32::with_seed(0))
        } else {
            None
        };

        let carryover_window = if flags.independent_blocks() {
            None
        } else {
            Some(Vec::with_capacity(WINDOW_SIZE))
        };

        Frame::General {
            flags,
            block_maxsize,
            content_size,
            dictionary_id,
            content_hasher,
            carryover_window,
        }
    }

    #[throws]
    fn decode_general_block(
        &mut self,
        flags: Flags,
        block_maxsize: usize,
        content_hasher: &mut Option<XxHash32>,
        carryover_window: &mut Option<Vec<u8>>,
        output: &mut Vec<u8>,
    ) -> BlockOutcome {
        let reader = &mut self.reader;

        let block_length = reader.read_u32::<LE>().map_err(eof_is_abrupt)?;
        if block_length == 0 {
            // end mark; the content checksum sits right behind it
            if flags.content_checksum() {
                let checksum = reader.read_u32::<LE>().map_err(eof_is_abrupt)?;
                if let Some(hasher) = content_hasher.take() {
                    if hasher.finish() != u64::from(checksum) {
                        throw!(Error::FrameChecksumFail);
                    }
                }
            }
            return BlockOutcome::EndOfFrame;
        }

        let is_compressed = block_length & INCOMPRESSIBLE == 0;
        let block_length = block_length & !INCOMPRESSIBLE;

        if block_length as usize > block_maxsize {
            throw!(Error::BlockSizeOverflow);
        }

        let buf = &mut self.read_buf;
        buf.resize(block_length.try_into().or(Err(Error::BlockLengthOverflow))?, 0);
        reader.read_exact(buf.as_mut_slice()).map_err(eof_is_short)?;

        if flags.block_checksums() {
            let checksum = reader.read_u32::<LE>().map_err(eof_is_abrupt)?;
            if self.settings.verify_checksums {
                let mut hasher = XxHash32::with_seed(0);
                hasher.write(buf);
                if hasher.finish() != u64::from(checksum) {
                    throw!(Error::BlockChecksumFail);
                }
            }
        }

        if is_compressed {
            let window = carryover_window.as_deref().unwrap_or(&[]);
            raw::decompress_block(buf, window, output)?;
        } else {
            output.extend_from_slice(buf);
        }

        if output.len() > block_maxsize {
            throw!(Error::BlockSizeOverflow);
        }

        // linked blocks may reference up to a window of history from this frame
        if let Some(window) = carryover_window.as_mut() {
            let outlen = output.len();
            if outlen < WINDOW_SIZE {
                let available_bytes = window.len() + outlen;
                if let Some(surplus_bytes) = available_bytes.checked_sub(WINDOW_SIZE) {
                    // remove as many bytes from front as we are replacing
                    window.drain(..surplus_bytes);
                }
                window.extend_from_slice(output);
            } else {
                window.clear();
                window.extend_from_slice(&output[outlen - WINDOW_SIZE..]);
            }

            assert!(window.len() <= WINDOW_SIZE);
        }

        if let Some(hasher) = content_hasher.as_mut() {
            hasher.write(output);
        }

        BlockOutcome::Data
    }

    #[throws]
    fn decode_legacy_block(&mut self, output: &mut Vec<u8>) -> BlockOutcome {
        let mut word = [0u8; 4];
        if !read_exact_or_eof(&mut self.reader, &mut word)? {
            // legacy frames have no end mark; plain EOF finishes them
            return BlockOutcome::EndOfFrame;
        }
        let block_length = u32::from_le_bytes(word);

        // a following frame announces itself where a block length belongs
        if block_length as usize > LEGACY_BLOCK_COMPRESS_BOUND {
            self.carried_magic = Some(block_length);
            return BlockOutcome::EndOfFrame;
        }

        let buf = &mut self.read_buf;
        buf.resize(block_length as usize, 0);
        self.reader.read_exact(buf.as_mut_slice()).map_err(eof_is_short)?;

        raw::decompress_block(buf, &[], output)?;
        if output.len() > LEGACY_BLOCK_MAXSIZE {
            throw!(Error::BlockSizeOverflow);
        }

        BlockOutcome::Data
    }
}

/// Wrapper around `LZ4FrameReader` that implements `Read` and `BufRead`.
pub struct LZ4FrameIoReader<R: Read> {
    frame_reader: LZ4FrameReader<R>,
    bytes_taken: usize,
    buffer: Vec<u8>,
}

impl<R: Read> Read for LZ4FrameIoReader<R> {
    #[throws(io::Error)]
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mybuf = self.fill_buf()?;
        let bytes_to_take = cmp::min(mybuf.len(), buf.len());
        buf[..bytes_to_take].copy_from_slice(&mybuf[..bytes_to_take]);
        self.consume(bytes_to_take);
        bytes_to_take
    }
}

impl<R: Read> BufRead for LZ4FrameIoReader<R> {
    #[throws(io::Error)]
    fn fill_buf(&mut self) -> &[u8] {
        if self.bytes_taken == self.buffer.len() {
            self.buffer.clear();
            self.frame_reader.decode_block(&mut self.buffer)?;
            self.bytes_taken = 0;
        }
        &self.buffer[self.bytes_taken..]
    }

    fn consume(&mut self, amt: usize) {
        self.bytes_taken += amt;
        assert!(
            self.bytes_taken <= self.buffer.len(),
            "You consumed more bytes than I even gave you!"
        );
    }
}

/// Convenience wrapper around `LZ4FrameReader` that reads everything into a vector
/// and returns it.
#[throws]
pub fn decompress_frames<R: Read>(reader: R) -> Vec<u8> {
    DecompressionSettings::default().decompress(reader)?
}
