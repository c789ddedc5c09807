//! Shared fixtures for the integration tests and benchmarks
//!
//! Builders that write containers and relocation tables byte by byte, plus a
//! small greedy LZO1X encoder that only emits instruction forms the decoder
//! understands. The encoder exists to produce compressed fixtures; it makes
//! no attempt at a good ratio.

#![allow(dead_code)]

use std::collections::HashMap;

/// Longest distance the 16-31 instructions can reach
const MAX_DISTANCE: usize = 0xBFFF;

/// Compress `data` into an LZO1X stream ending in the end-of-stream marker
pub fn lzo_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = Encoder::default();
    let mut table: HashMap<[u8; 3], usize> = HashMap::new();
    let mut ip = 0;
    let mut literal_start = 0;

    while ip + 3 <= data.len() {
        let key = [data[ip], data[ip + 1], data[ip + 2]];
        let candidate = table.insert(key, ip);

        match candidate {
            Some(start) if ip - start <= MAX_DISTANCE => {
                let mut length = 3;
                while ip + length < data.len() && data[start + length] == data[ip + length] {
                    length += 1;
                }

                encoder.literals(&data[literal_start..ip]);
                encoder.matched(ip - start, length);

                for p in ip + 1..ip + length {
                    if p + 3 <= data.len() {
                        table.insert([data[p], data[p + 1], data[p + 2]], p);
                    }
                }
                ip += length;
                literal_start = ip;
            }
            _ => ip += 1,
        }
    }

    encoder.literals(&data[literal_start..]);
    encoder.out.extend_from_slice(&[0x11, 0x00, 0x00]);
    encoder.out
}

#[derive(Default)]
struct Encoder {
    out: Vec<u8>,
    /// Byte whose low two bits carry the literal count after the last match
    trail: Option<usize>,
}

impl Encoder {
    fn literals(&mut self, literals: &[u8]) {
        let count = literals.len();
        if count == 0 {
            return;
        }

        match self.trail {
            Some(pos) if count <= 3 => self.out[pos] |= count as u8,
            None if self.out.is_empty() && count <= 238 => self.out.push(17 + count as u8),
            _ => {
                if count <= 18 {
                    self.out.push((count - 3) as u8);
                } else {
                    self.out.push(0);
                    self.extension(count - 18);
                }
            }
        }
        self.out.extend_from_slice(literals);
        self.trail = None;
    }

    fn matched(&mut self, distance: usize, length: usize) {
        if length <= 8 && distance <= 0x800 {
            let d = distance - 1;
            self.out.push((((length - 1) << 5) | ((d & 7) << 2)) as u8);
            self.trail = Some(self.out.len() - 1);
            self.out.push((d >> 3) as u8);
        } else if distance <= 0x4000 {
            let d = distance - 1;
            if length - 2 <= 31 {
                self.out.push(32 | (length - 2) as u8);
            } else {
                self.out.push(32);
                self.extension(length - 2 - 31);
            }
            self.word(d << 2);
        } else {
            let d = distance - 0x4000;
            let high = ((d >> 11) & 8) as u8;
            if length - 2 <= 7 {
                self.out.push(16 | high | (length - 2) as u8);
            } else {
                self.out.push(16 | high);
                self.extension(length - 2 - 7);
            }
            self.word((d & 0x3FFF) << 2);
        }
    }

    fn word(&mut self, value: usize) {
        self.trail = Some(self.out.len());
        self.out.extend_from_slice(&(value as u16).to_le_bytes());
    }

    fn extension(&mut self, mut remaining: usize) {
        while remaining > 255 {
            self.out.push(0);
            remaining -= 255;
        }
        self.out.push(remaining as u8);
    }
}

/// Payload header followed by the stored bytes
pub fn payload_envelope(payload: &[u8], compress: bool) -> Vec<u8> {
    let stored = if compress {
        lzo_compress(payload)
    } else {
        payload.to_vec()
    };

    let mut bytes = Vec::with_capacity(20 + stored.len());
    for word in [
        u32::from(compress),
        stored.len() as u32,
        0xC0DE_0001,
        payload.len() as u32,
        0xC0DE_0002,
    ] {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.extend_from_slice(&stored);
    bytes
}

/// Writes `.sna` container images
#[derive(Default)]
pub struct ContainerBuilder {
    bytes: Vec<u8>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, module: u8, block_id: u8, base: i32, block_size: u32) {
        self.bytes.extend_from_slice(&[module, block_id]);
        self.bytes.extend_from_slice(&base.to_le_bytes());
        for word in [0x11u32, 0x22, 0x33, block_size] {
            self.bytes.extend_from_slice(&word.to_le_bytes());
        }
    }

    /// Block stored without compression
    pub fn stored(mut self, module: u8, block_id: u8, base: i32, payload: &[u8]) -> Self {
        self.record(module, block_id, base, payload.len() as u32);
        self.bytes.extend(payload_envelope(payload, false));
        self
    }

    /// Block compressed with the fixture encoder
    pub fn compressed(mut self, module: u8, block_id: u8, base: i32, payload: &[u8]) -> Self {
        self.record(module, block_id, base, payload.len() as u32);
        self.bytes.extend(payload_envelope(payload, true));
        self
    }

    /// Block with a zero size field and no payload header
    pub fn empty(mut self, module: u8, block_id: u8, base: i32) -> Self {
        self.record(module, block_id, base, 0);
        self
    }

    /// Arbitrary bytes, for malformed fixtures
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Finish with a terminator record
    pub fn build(mut self) -> Vec<u8> {
        self.bytes.extend_from_slice(&[0, 0]);
        self.bytes.extend_from_slice(&(-1i32).to_le_bytes());
        self.bytes
    }

    /// Finish without a terminator record
    pub fn build_unterminated(self) -> Vec<u8> {
        self.bytes
    }
}

/// Writes relocation table images
pub struct RelocationBuilder {
    width: usize,
    inner: bool,
    compress: bool,
    lists: Vec<(u8, u8, Vec<(u32, u8, u8)>)>,
}

impl RelocationBuilder {
    /// Montreal layout: 6-byte entries behind compressed payload headers
    pub fn montreal() -> Self {
        Self::new(6, true, true)
    }

    pub fn new(width: usize, inner: bool, compress: bool) -> Self {
        Self {
            width,
            inner,
            compress,
            lists: Vec::new(),
        }
    }

    /// Add a list of `(memory_offset, target_module, target_block_id)` sites
    pub fn list(mut self, module: u8, block_id: u8, entries: &[(u32, u8, u8)]) -> Self {
        self.lists.push((module, block_id, entries.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut bytes = vec![self.lists.len() as u8];
        for (module, block_id, entries) in &self.lists {
            bytes.extend_from_slice(&[*module, *block_id]);
            bytes.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            if entries.is_empty() {
                continue;
            }

            let mut records = Vec::with_capacity(entries.len() * self.width);
            for &(offset, target_module, target_block_id) in entries {
                let start = records.len();
                records.extend_from_slice(&offset.to_le_bytes());
                records.extend_from_slice(&[target_module, target_block_id]);
                records.resize(start + self.width, 0xAB);
            }

            if self.inner {
                bytes.extend(payload_envelope(&records, self.compress));
            } else {
                bytes.extend(records);
            }
        }
        bytes
    }
}

/// Bytes with enough repetition to exercise every match form
pub fn sample_payload(len: usize) -> Vec<u8> {
    let phrase = b"OpenSpace keeps its world in blocks; ";
    let mut data = Vec::with_capacity(len);
    let mut state = 0x1234_5678u32;
    while data.len() < len {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
        match (state >> 16) % 4 {
            0 => data.extend_from_slice(phrase),
            1 => data.extend(std::iter::repeat((state >> 8) as u8).take(40)),
            _ => data.extend((0..24).map(|i| (state >> (i % 24)) as u8)),
        }
    }
    data.truncate(len);
    data
}
