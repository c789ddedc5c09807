//! Decompression state management
//!
//! This module holds the cursor into the compressed stream, the growing output
//! buffer (which doubles as the back-reference window) and the trailing-literal
//! state that decides how the next low instruction byte is interpreted.

use crate::{DecompressionStats, Result, SnaError, MAX_DISTANCE};

/// Output preallocated per input byte
const INITIAL_GROWTH: usize = 8;

/// Number of literal bytes copied by the previous instruction
///
/// Instruction bytes 0-15 are not self-describing; their meaning depends on
/// this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingLiterals {
    /// The previous match carried no literals: 0-15 starts a literal run
    None,
    /// One to three literals followed a match: 0-15 is a 2-byte near match
    Short(u8),
    /// A literal run of four or more bytes: 0-15 is a 3-byte match at 2049-3072
    Long,
}

impl TrailingLiterals {
    /// State after copying `count` literal bytes
    pub fn after(count: usize) -> Self {
        match count {
            0 => TrailingLiterals::None,
            1..=3 => TrailingLiterals::Short(count as u8),
            _ => TrailingLiterals::Long,
        }
    }
}

/// Decoder state for one LZO1X stream
#[derive(Debug)]
pub struct LzoState<'a> {
    /// Compressed input
    pub input: &'a [u8],
    /// Current position in the input
    pub in_pos: usize,
    /// Decompressed output and back-reference history
    pub output: Vec<u8>,
    /// Number of bytes the caller expects
    pub expected_size: usize,
    /// Literal count of the previous instruction
    pub trailing: TrailingLiterals,
    /// Running statistics
    pub stats: DecompressionStats,
}

impl<'a> LzoState<'a> {
    /// Create a new decompression state
    pub fn new(input: &'a [u8], expected_size: usize) -> Self {
        Self {
            input,
            in_pos: 0,
            // Headers are untrusted; grow past this on demand
            output: Vec::with_capacity(
                expected_size.min(input.len().saturating_mul(INITIAL_GROWTH)),
            ),
            expected_size,
            trailing: TrailingLiterals::None,
            stats: DecompressionStats::default(),
        }
    }

    /// Whether the expected number of bytes has been produced
    pub fn is_complete(&self) -> bool {
        self.output.len() >= self.expected_size
    }

    /// Output bytes still wanted
    pub fn remaining_output(&self) -> usize {
        self.expected_size.saturating_sub(self.output.len())
    }

    /// Read the next input byte
    pub fn next_byte(&mut self) -> Result<u8> {
        match self.input.get(self.in_pos) {
            Some(&byte) => {
                self.in_pos += 1;
                Ok(byte)
            }
            None => Err(SnaError::CorruptStream(format!(
                "input truncated at byte {}",
                self.in_pos
            ))),
        }
    }

    /// Read a little-endian 16-bit value
    pub fn next_le16(&mut self) -> Result<usize> {
        let lo = self.next_byte()? as usize;
        let hi = self.next_byte()? as usize;
        Ok(lo | (hi << 8))
    }

    /// Copy `count` literal bytes from the input to the output
    ///
    /// The copy is clipped at the expected size; nothing past that point is
    /// ever read.
    pub fn copy_literals(&mut self, count: usize) -> Result<()> {
        let count = count.min(self.remaining_output());
        let end = self.in_pos + count;
        if end > self.input.len() {
            return Err(SnaError::CorruptStream(format!(
                "literal run of {} bytes at input byte {} overruns the stream ({} bytes)",
                count,
                self.in_pos,
                self.input.len()
            )));
        }

        self.output.extend_from_slice(&self.input[self.in_pos..end]);
        self.in_pos = end;
        self.stats.literal_bytes += count;
        Ok(())
    }

    /// Copy `length` bytes starting `distance` bytes back in the output
    ///
    /// Source and destination may overlap, so bytes are copied one at a time
    /// and each becomes a source for the rest of the same copy.
    pub fn copy_match(&mut self, distance: usize, length: usize) -> Result<()> {
        if distance == 0 || distance > self.output.len() || distance > MAX_DISTANCE {
            return Err(SnaError::CorruptStream(format!(
                "back-reference distance {} with only {} bytes of history",
                distance,
                self.output.len()
            )));
        }

        let length = length.min(self.remaining_output());
        let mut src = self.output.len() - distance;
        for _ in 0..length {
            let byte = self.output[src];
            self.output.push(byte);
            src += 1;
        }

        self.stats.match_count += 1;
        self.stats.longest_match = self.stats.longest_match.max(length);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_after() {
        assert_eq!(TrailingLiterals::after(0), TrailingLiterals::None);
        assert_eq!(TrailingLiterals::after(2), TrailingLiterals::Short(2));
        assert_eq!(TrailingLiterals::after(3), TrailingLiterals::Short(3));
        assert_eq!(TrailingLiterals::after(4), TrailingLiterals::Long);
        assert_eq!(TrailingLiterals::after(300), TrailingLiterals::Long);
    }

    #[test]
    fn test_overlapping_match() {
        let mut state = LzoState::new(&[], 7);
        state.output.extend_from_slice(b"ab");
        state.copy_match(2, 5).unwrap();
        assert_eq!(state.output, b"abababa");
    }

    #[test]
    fn test_match_clipped_at_expected_size() {
        let mut state = LzoState::new(&[], 4);
        state.output.push(b'x');
        state.copy_match(1, 100).unwrap();
        assert_eq!(state.output, b"xxxx");
        assert!(state.is_complete());
    }

    #[test]
    fn test_distance_beyond_history() {
        let mut state = LzoState::new(&[], 16);
        state.output.extend_from_slice(b"abc");
        assert!(matches!(
            state.copy_match(4, 3),
            Err(SnaError::CorruptStream(_))
        ));
        assert!(state.copy_match(0, 3).is_err());
    }

    #[test]
    fn test_literal_overrun() {
        let input = [1u8, 2, 3];
        let mut state = LzoState::new(&input, 16);
        assert!(state.copy_literals(4).is_err());
        state.copy_literals(3).unwrap();
        assert_eq!(state.output, vec![1, 2, 3]);
        assert!(state.next_byte().is_err());
    }
}
