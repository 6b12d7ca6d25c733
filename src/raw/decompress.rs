use byteorder::{ReadBytesExt, LE};
use std::cmp;
use std::io::Cursor;
use thiserror::Error;

/// Matches are at least this long; the wire format only stores the excess.
const MINMATCH: usize = 4;

/// Errors when decoding a raw LZ4 block.
#[derive(Error, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DecodeError {
    /// A length continuation or literal run was cut off by the end of the block.
    /// Either your input was truncated or you're trying to decompress garbage.
    #[error("block ends in the middle of a literal run or length encoding")]
    IncompleteData,
    /// A match offset needs two bytes but the block only has one left.
    #[error("block ends in the middle of a match offset")]
    NotEnoughData,
    /// The offset for a deduplication is zero or out of bounds.
    /// This may be caused by a missing or incomplete prefix.
    #[error("match offset points outside the data decoded so far")]
    InvalidDeduplicationOffset,
}

/// This is how LZ4 encodes varints.
/// Just keep reading and adding while it's all F.
///
/// The accumulated length is returned even when the input runs out mid-sequence,
/// so the caller can salvage a partial literal run before giving up.
fn read_lsic(initial: u8, cursor: &mut Cursor<&[u8]>) -> (usize, Result<(), DecodeError>) {
    let mut value = initial as usize;
    if value == 0xF {
        loop {
            let more = match cursor.read_u8() {
                Ok(x) => x,
                Err(_) => return (value, Err(DecodeError::IncompleteData)),
            };
            value += more as usize;
            if more != 0xFF {
                break;
            }
        }
    }
    (value, Ok(()))
}

/// Decompress an LZ4-compressed block, appending to `output`.
///
/// LZ4 heavily relies on a lookback mechanism where bytes earlier in the output
/// stream are referenced. Data that precedes the block (say, earlier blocks of the
/// same frame when blocks are linked) is passed in `prefix`; matches may reach
/// through the current output into it. A standalone block takes an empty prefix.
///
/// The final sequence of a block is allowed to consist of literals only, so input
/// that ends right after a literal run terminates cleanly.
pub fn decompress_block(input: &[u8], prefix: &[u8], output: &mut Vec<u8>) -> Result<(), DecodeError> {
    let mut reader = Cursor::new(input);
    loop {
        let token = match reader.read_u8() {
            Ok(x) => x,
            _ => break,
        };

        // read literals
        let (literal_length, literal_length_result) = read_lsic(token >> 4, &mut reader);
        let pos = reader.position() as usize;
        let take = cmp::min(literal_length, input.len() - pos);
        output.extend_from_slice(&input[pos..pos + take]);
        reader.set_position((pos + take) as u64);
        literal_length_result?;
        if take < literal_length {
            return Err(DecodeError::IncompleteData);
        }

        // the block may end without a final match
        if reader.position() as usize == input.len() {
            break;
        }

        // read duplicates
        let offset = match reader.read_u16::<LE>() {
            Ok(x) => x as usize,
            _ => return Err(DecodeError::NotEnoughData),
        };
        let (extra, match_length_result) = read_lsic(token & 0xF, &mut reader);
        match_length_result?;
        copy_overlapping(offset, MINMATCH + extra, prefix, output)?;
    }
    Ok(())
}

/// Apply a match: copy `match_len` bytes starting `offset` bytes before the end of
/// `output` (reaching into `prefix` if need be) to the end of `output`.
///
/// Matches regularly overlap the bytes they produce (that's how LZ4 encodes runs),
/// so every path here has forward-copy semantics: a copy chunk never spans more
/// than `offset` bytes.
fn copy_overlapping(
    offset: usize,
    match_len: usize,
    prefix: &[u8],
    output: &mut Vec<u8>,
) -> Result<(), DecodeError> {
    let old_len = output.len();
    if offset == 0 {
        return Err(DecodeError::InvalidDeduplicationOffset);
    }
    match offset {
        i if i > old_len => {
            // need prefix for this
            let prefix_needed = i - old_len;
            if prefix_needed > prefix.len() {
                return Err(DecodeError::InvalidDeduplicationOffset);
            }
            let bytes_from_prefix = cmp::min(prefix_needed, match_len);
            output.extend_from_slice(&prefix[prefix.len() - prefix_needed..][..bytes_from_prefix]);
            let remaining_len = match_len - bytes_from_prefix;
            if remaining_len != 0 {
                // offset stays the same because the cursor moved forward
                // by the amount of bytes we took from the prefix
                return copy_overlapping(offset, remaining_len, &[], output);
            }
        }

        // fastpath: memset if we repeat the same byte forever
        1 => output.resize(old_len + match_len, output[old_len - 1]),

        o if match_len <= o => {
            // fastpath: nonoverlapping
            // for borrowck reasons we have to extend with zeroes first and then memcpy
            // instead of simply using extend_from_slice
            output.resize(old_len + match_len, 0);
            let (head, tail) = output.split_at_mut(old_len);
            tail.copy_from_slice(&head[old_len - offset..][..match_len]);
        }
        2 | 4 | 8 => {
            // fastpath: overlapping but small

            // speedup: build 16 byte buffer so we can handle 16 bytes each iteration instead of one
            let mut buf = [0u8; 16];
            for chunk in buf.chunks_mut(offset) {
                // if this panics (i.e. chunklen != offset), offset does not divide 16 (but it always does)
                chunk.copy_from_slice(&output[old_len - offset..][..offset]);
            }
            // fill with zero bytes
            output.resize(old_len + match_len, 0);
            // copy buf as often as possible
            for target in output[old_len..].chunks_mut(buf.len()) {
                target.copy_from_slice(&buf[..target.len()]);
            }
        }
        _ => {
            // slowest path: copy single bytes
            output.reserve(match_len);
            for i in 0..match_len {
                let b = output[old_len - offset + i];
                output.push(b);
            }
        }
    }
    Ok(())
}

/// Decompress all bytes of `input` as one standalone block.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut vec = Vec::new();
    decompress_block(input, &[], &mut vec)?;
    Ok(vec)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aaaaaaaaaaa_lots_of_aaaaaaaaa() {
        assert_eq!(decompress(&[0x11, b'a', 1, 0]).unwrap(), b"aaaaaa");
    }

    #[test]
    fn multiple_repeated_blocks() {
        assert_eq!(
            decompress(&[0x11, b'a', 1, 0, 0x22, b'b', b'c', 2, 0]).unwrap(),
            b"aaaaaabcbcbcbc"
        );
    }

    #[test]
    fn all_literal() {
        assert_eq!(decompress(&[0x30, b'a', b'4', b'9']).unwrap(), b"a49");
    }

    #[test]
    fn offset_oob() {
        assert_eq!(
            decompress(&[0x10, b'a', 2, 0]).unwrap_err(),
            DecodeError::InvalidDeduplicationOffset
        );
    }

    #[test]
    fn zero_offset() {
        assert_eq!(
            decompress(&[0x10, b'a', 0, 0]).unwrap_err(),
            DecodeError::InvalidDeduplicationOffset
        );
    }

    #[test]
    fn long_match_expands() {
        // 8 literals, then a 278 byte match at offset 2
        let block = [0x8F, 1, 2, 3, 4, 5, 6, 7, 8, 0x02, 0x00, 0xFF, 0x04];
        let out = decompress(&block).unwrap();
        assert_eq!(out.len(), 286);
        assert_eq!(&out[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(out[8..].chunks(2).all(|pair| pair == [7, 8]));
    }

    #[test]
    fn overlapping_match_replicates_last_byte() {
        let mut out = vec![1, 2, 3, 4];
        decompress_block(&[0x06, 0x01, 0x00], &[], &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn length_continuation_stops_at_first_non_ff() {
        // nibble 15 plus continuation byte 0x21 makes 48 literals
        let mut block = vec![0xF0, 0x21];
        block.extend(std::iter::repeat(0xAB).take(48));
        assert_eq!(decompress(&block).unwrap(), vec![0xAB; 48]);
    }

    #[test]
    fn truncated_length_continuation() {
        assert_eq!(
            decompress(&[0xF0, 0xFF, 0xFF]).unwrap_err(),
            DecodeError::IncompleteData
        );
    }

    #[test]
    fn truncated_literal_run_keeps_partial_output() {
        let mut out = Vec::new();
        let err = decompress_block(&[0x40, b'a', b'b'], &[], &mut out).unwrap_err();
        assert_eq!(err, DecodeError::IncompleteData);
        assert_eq!(out, b"ab");
    }

    #[test]
    fn missing_offset_byte() {
        // one byte where a two-byte offset belongs
        assert_eq!(
            decompress(&[0x10, b'a', 0x01]).unwrap_err(),
            DecodeError::NotEnoughData
        );
    }

    #[test]
    fn match_reaching_into_prefix() {
        let mut out = Vec::new();
        decompress_block(&[0x00, 0x04, 0x00], b"wxyz", &mut out).unwrap();
        assert_eq!(out, b"wxyz");
    }

    #[test]
    fn match_straddling_prefix_and_output() {
        let mut out = Vec::new();
        decompress_block(&[0x10, b'a', 0x02, 0x00], b"z", &mut out).unwrap();
        assert_eq!(out, b"azaza");
    }
}
