//! Legacy XOR stream cipher
//!
//! Some sibling engine releases mask their snapshot and relocation files with
//! a self-evolving XOR key. Montreal files are stored in the clear, so the
//! default profile leaves this stage out, but the same parsers can read the
//! masked variants once the mask is peeled off here.

use crate::{FormatProfile, Result, SnaError};
use std::borrow::Cow;

/// Where the initial mask value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskSeed {
    /// The first four bytes of the stream (little-endian), which are consumed
    Stream,
    /// A constant baked into the engine build
    Fixed(u32),
}

/// How the mask evolves after each byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskStep {
    /// XOR with the low byte, then rotate the mask left by one bit
    Rotate,
    /// XOR with bits 8-15, then advance a Park-Miller generator
    ParkMiller,
}

/// XOR mask configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XorMask {
    /// Initial mask source
    pub seed: MaskSeed,
    /// Mask evolution
    pub step: MaskStep,
}

impl XorMask {
    /// Create a mask configuration
    pub fn new(seed: MaskSeed, step: MaskStep) -> Self {
        Self { seed, step }
    }

    /// Stream-seeded rotating mask
    pub fn rotating() -> Self {
        Self::new(MaskSeed::Stream, MaskStep::Rotate)
    }

    /// Stream-seeded Park-Miller mask
    pub fn park_miller() -> Self {
        Self::new(MaskSeed::Stream, MaskStep::ParkMiller)
    }

    /// Unmask a whole stream
    ///
    /// With a stream seed the four seed bytes are dropped from the output.
    pub fn apply(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let (seed, body) = match self.seed {
            MaskSeed::Fixed(value) => (value, raw),
            MaskSeed::Stream => {
                let Some((head, body)) = raw.split_first_chunk::<4>() else {
                    return Err(SnaError::Truncated {
                        offset: 0,
                        needed: 4,
                        available: raw.len(),
                    });
                };
                (u32::from_le_bytes(*head), body)
            }
        };

        let mut state = MaskState::new(seed, self.step);
        Ok(body.iter().map(|&byte| state.decode_byte(byte)).collect())
    }
}

/// Running mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskState {
    mask: u32,
    step: MaskStep,
}

impl MaskState {
    /// Start a mask from `seed`
    pub fn new(seed: u32, step: MaskStep) -> Self {
        Self { mask: seed, step }
    }

    /// Current mask value
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Byte XORed into the next stream byte
    pub fn mask_byte(&self) -> u8 {
        match self.step {
            MaskStep::Rotate => self.mask as u8,
            MaskStep::ParkMiller => (self.mask >> 8) as u8,
        }
    }

    /// Move to the next mask value
    pub fn advance(&mut self) {
        self.mask = match self.step {
            MaskStep::Rotate => self.mask.rotate_left(1),
            MaskStep::ParkMiller => next_park_miller(self.mask),
        };
    }

    /// XOR one byte and advance
    pub fn decode_byte(&mut self, byte: u8) -> u8 {
        let decoded = byte ^ self.mask_byte();
        self.advance();
        decoded
    }
}

/// Park-Miller step (Schrage form) over the mask XORed with the engine salt
fn next_park_miller(mask: u32) -> u32 {
    let x = mask ^ 0x075B_D924;
    let next = 16807u32
        .wrapping_mul(x)
        .wrapping_sub(0x7FFF_FFFFu32.wrapping_mul(x / 0x1F31D));
    if (next as i32) <= 0 {
        next.wrapping_add(0x7FFF_FFFF)
    } else {
        next
    }
}

/// Byte-stream stage run before any parser sees the data
pub trait StreamTransform {
    /// Transform a raw file image
    fn transform<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

impl StreamTransform for XorMask {
    fn transform<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        self.apply(raw).map(Cow::Owned)
    }
}

impl StreamTransform for FormatProfile {
    fn transform<'a>(&self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match &self.cipher {
            Some(mask) => mask.transform(raw),
            None => Ok(Cow::Borrowed(raw)),
        }
    }
}
