//! LZO1X decompression for OpenSpace payloads
//!
//! The engine compresses block payloads and relocation lists with its own
//! flavour of LZO1X. The stream alternates literal runs and back-references
//! into the output produced so far; the meaning of instruction bytes 0-15
//! depends on how many literals the previous instruction copied.
//!
//! Only decoding is provided.

mod decoder;
mod state;

pub use decoder::Flow;
pub use state::{LzoState, TrailingLiterals};

use crate::{DecompressionStats, Result, SnaError};

/// Distance value of the end-of-stream marker (a 16-31 match with zero offset bits)
pub const END_OF_STREAM_DISTANCE: usize = 0x4000;

/// Base distance of the 3-byte match that follows a long literal run
pub const FAR_SHORT_MATCH_BASE: usize = 0x801;

/// Largest distance reachable by the 64-255 instructions
pub const SHORT_MATCH_MAX_DISTANCE: usize = 0x800;

/// Largest distance reachable by the 32-63 instructions
pub const MEDIUM_MATCH_MAX_DISTANCE: usize = 0x4000;

/// Decompress `input`, producing at most `expected_size` bytes
///
/// Decoding stops at the end-of-stream marker or once `expected_size` bytes
/// are available, whichever comes first. An empty input yields an empty
/// buffer.
///
/// With `expected_size == 0` no input is read at all, so the leading-byte
/// check does not apply. Encoders write an empty payload as the bare
/// end-of-stream marker `11 00 00`, whose leading 17 is otherwise illegal.
pub fn decompress(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    decompress_with_stats(input, expected_size).map(|(output, _)| output)
}

/// Decompress `input` and report instruction statistics
pub fn decompress_with_stats(
    input: &[u8],
    expected_size: usize,
) -> Result<(Vec<u8>, DecompressionStats)> {
    if input.is_empty() {
        return Ok((Vec::new(), DecompressionStats::default()));
    }

    let mut state = LzoState::new(input, expected_size);

    if !state.is_complete() {
        let mut flow = state.begin()?;
        while flow == Flow::Continue && !state.is_complete() {
            let instruction = state.next_byte()?;
            flow = state.execute(instruction)?;
        }

        if flow == Flow::EndOfStream && !state.is_complete() {
            return Err(SnaError::CorruptStream(format!(
                "end of stream after {} of {} expected bytes",
                state.output.len(),
                expected_size
            )));
        }
    }

    let mut stats = std::mem::take(&mut state.stats);
    stats.input_bytes = state.in_pos;
    stats.output_bytes = state.output.len();

    log::trace!(
        "lzo: {} -> {} bytes, {} instructions, {} matches",
        stats.input_bytes,
        stats.output_bytes,
        stats.instructions,
        stats.match_count
    );

    Ok((state.output, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompress_empty() {
        assert!(decompress(&[], 0).unwrap().is_empty());
        assert!(decompress(&[], 1024).unwrap().is_empty());
    }

    #[test]
    fn test_single_literal_and_end_marker() {
        let output = decompress(&[0x12, 0x41, 0x11, 0x00, 0x00], 1).unwrap();
        assert_eq!(output, b"A");
    }

    #[test]
    fn test_early_end_marker_is_corrupt() {
        let result = decompress(&[0x12, 0x41, 0x11, 0x00, 0x00], 2);
        assert!(matches!(result, Err(SnaError::CorruptStream(_))));
    }

    #[test]
    fn test_stops_at_expected_size() {
        // Literal "A" then a short match repeating it 8 times; expected 5 bytes
        // and no end marker in the stream at all
        let input = [0x12, 0x41, 0xE0, 0x00];
        let (output, stats) = decompress_with_stats(&input, 5).unwrap();
        assert_eq!(output, b"AAAAA");
        assert_eq!(stats.input_bytes, 4);
        assert_eq!(stats.match_count, 1);
    }

    #[test]
    fn test_zero_expected_size_reads_nothing() {
        let (output, stats) = decompress_with_stats(&[0x10, 0xFF], 0).unwrap();
        assert!(output.is_empty());
        assert_eq!(stats.input_bytes, 0);
    }

    #[test]
    fn test_empty_payload_marker() {
        // Bare end marker: empty for a zero size, illegal otherwise
        assert!(decompress(&[0x11, 0x00, 0x00], 0).unwrap().is_empty());
        assert!(matches!(
            decompress(&[0x11, 0x00, 0x00], 1),
            Err(SnaError::CorruptStream(_))
        ));
    }
}
