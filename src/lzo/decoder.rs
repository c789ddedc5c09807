//! Instruction decoding
//!
//! Each method here decodes one instruction class of the LZO1X variant,
//! performs its copy and records the trailing-literal state for the next
//! instruction.

use super::state::{LzoState, TrailingLiterals};
use super::{END_OF_STREAM_DISTANCE, FAR_SHORT_MATCH_BASE};
use crate::{Result, SnaError};

/// What the main loop should do after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep decoding
    Continue,
    /// The end-of-stream marker was decoded
    EndOfStream,
}

impl LzoState<'_> {
    /// Decode the first instruction byte of a stream
    ///
    /// Values 18 and above are an initial literal run of `value - 17` bytes,
    /// 0-15 behave like a regular literal run, 16 and 17 are rejected.
    pub fn begin(&mut self) -> Result<Flow> {
        let first = self.next_byte()?;
        match first {
            16 | 17 => Err(SnaError::CorruptStream(format!(
                "illegal leading instruction {first:#04x}"
            ))),
            18..=255 => {
                self.stats.instructions += 1;
                let count = first as usize - 17;
                self.copy_literals(count)?;
                self.trailing = TrailingLiterals::after(count);
                Ok(Flow::Continue)
            }
            _ => self.execute(first),
        }
    }

    /// Decode and run one instruction
    pub fn execute(&mut self, instruction: u8) -> Result<Flow> {
        self.stats.instructions += 1;
        let t = instruction as usize;
        match instruction {
            0..=15 => match self.trailing {
                TrailingLiterals::None => self.literal_run(t),
                TrailingLiterals::Short(_) => self.near_match(t),
                TrailingLiterals::Long => self.far_short_match(t),
            },
            16..=31 => self.long_match(t),
            32..=63 => self.medium_match(t),
            64..=255 => self.short_match(t),
        }
    }

    /// Read a variable-length run extension
    ///
    /// Every zero byte adds 255; the first non-zero byte ends the run and is
    /// added together with `base`.
    pub fn read_run_length(&mut self, base: usize) -> Result<usize> {
        let mut length = base;
        loop {
            match self.next_byte()? {
                0 => length += 255,
                byte => return Ok(length + byte as usize),
            }
        }
    }

    /// Literal run: 3 + (t, or 15 + extension when t is zero) bytes
    fn literal_run(&mut self, t: usize) -> Result<Flow> {
        let count = if t == 0 {
            self.read_run_length(15)?
        } else {
            t
        } + 3;

        self.copy_literals(count)?;
        self.trailing = TrailingLiterals::Long;
        Ok(Flow::Continue)
    }

    /// 2-byte match at distance 1-1024, only legal after 1-3 trailing literals
    fn near_match(&mut self, t: usize) -> Result<Flow> {
        let distance = 1 + (t >> 2) + ((self.next_byte()? as usize) << 2);
        self.copy_match(distance, 2)?;
        self.trailing_literals(t)
    }

    /// 3-byte match at distance 2049-3072, only legal after a long literal run
    fn far_short_match(&mut self, t: usize) -> Result<Flow> {
        let distance = FAR_SHORT_MATCH_BASE + (t >> 2) + ((self.next_byte()? as usize) << 2);
        self.copy_match(distance, 3)?;
        self.trailing_literals(t)
    }

    /// 64-255: 3-8 byte match at distance 1-2048
    fn short_match(&mut self, t: usize) -> Result<Flow> {
        let distance = 1 + ((t >> 2) & 7) + ((self.next_byte()? as usize) << 3);
        let length = (t >> 5) + 1;
        self.copy_match(distance, length)?;
        self.trailing_literals(t)
    }

    /// 32-63: match at distance 1-16384
    fn medium_match(&mut self, t: usize) -> Result<Flow> {
        let length = match t & 31 {
            0 => self.read_run_length(31)?,
            bits => bits,
        } + 2;

        let word = self.next_le16()?;
        let distance = 1 + (word >> 2);
        self.copy_match(distance, length)?;
        self.trailing_literals(word)
    }

    /// 16-31: match at distance 16385-49151, or the end-of-stream marker
    fn long_match(&mut self, t: usize) -> Result<Flow> {
        let length = match t & 7 {
            0 => self.read_run_length(7)?,
            bits => bits,
        } + 2;

        let word = self.next_le16()?;
        let distance = END_OF_STREAM_DISTANCE + ((t & 8) << 11) + (word >> 2);
        if distance == END_OF_STREAM_DISTANCE {
            return Ok(Flow::EndOfStream);
        }

        self.copy_match(distance, length)?;
        self.trailing_literals(word)
    }

    /// Copy the 0-3 literals encoded in the low two bits of a match
    fn trailing_literals(&mut self, bits: usize) -> Result<Flow> {
        let count = bits & 3;
        self.copy_literals(count)?;
        self.trailing = TrailingLiterals::after(count);
        Ok(Flow::Continue)
    }
}
