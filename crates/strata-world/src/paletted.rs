use bytes::{Buf, BufMut, BytesMut};
use strata_protocol_core::{read_varint, write_varint, CodecError};

const MIN_BITS_BLOCK: u8 = 4;
const MAX_BITS_BLOCK: u8 = 15;
const MIN_BITS_BIOME: u8 = 1;
const MAX_BITS_BIOME: u8 = 6;

/// Widest palette index that still uses the indirect encoding.
const MAX_INDIRECT_BITS_BLOCK: u8 = 8;
const MAX_INDIRECT_BITS_BIOME: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    SingleValued,
    Indirect,
    Direct,
}

/// A bit-packed array of block states or biome ids with three encodings
/// sharing get/set semantics.
///
/// Entries never straddle a 64-bit word: each word holds
/// `64 / bits_per_entry` entries and the leftover high bits stay zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalettedContainer {
    encoding: Encoding,
    bits_per_entry: u8,
    palette: Vec<u32>,
    data: Vec<u64>,
    size: usize,
    is_block: bool,
}

impl PalettedContainer {
    /// A new container filled with a single value (0 = air / first biome).
    pub fn new(size: usize, is_block: bool) -> Self {
        Self {
            encoding: Encoding::SingleValued,
            bits_per_entry: 0,
            palette: vec![0],
            data: Vec::new(),
            size,
            is_block,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn bits_per_entry(&self) -> u8 {
        self.bits_per_entry
    }

    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Collapse the container to a single value.
    pub fn set_single_value(&mut self, value: u32) {
        self.encoding = Encoding::SingleValued;
        self.bits_per_entry = 0;
        self.palette = vec![value];
        self.data.clear();
    }

    /// Build a container from a full values array, choosing the optimal
    /// encoding: single-valued for one unique value, indirect while the
    /// palette fits the indirect index width, direct beyond that.
    pub fn from_values(values: &[u32], is_block: bool) -> Self {
        let mut container = Self::new(values.len(), is_block);
        container.set_from_values(values);
        container
    }

    pub fn set_from_values(&mut self, values: &[u32]) {
        assert_eq!(values.len(), self.size, "values length must match container size");

        // Palette in first-appearance order keeps the encoding deterministic.
        let mut palette: Vec<u32> = Vec::new();
        let mut index_of = std::collections::HashMap::new();
        let mut indices: Vec<u32> = Vec::with_capacity(values.len());
        for &value in values {
            let idx = *index_of.entry(value).or_insert_with(|| {
                palette.push(value);
                palette.len() - 1
            });
            indices.push(idx as u32);
        }

        if palette.len() == 1 {
            self.set_single_value(palette[0]);
            return;
        }

        let max_indirect = 1usize << self.max_indirect_bits();
        if palette.len() <= max_indirect {
            self.encoding = Encoding::Indirect;
            self.bits_per_entry = self.min_bits().max(bit_width(palette.len() - 1));
            self.palette = palette;
            self.pack(&indices);
        } else {
            self.encoding = Encoding::Direct;
            self.bits_per_entry = self.direct_bits();
            self.palette.clear();
            self.pack(values);
        }
    }

    /// Read the value at `index`.
    pub fn get(&self, index: usize) -> u32 {
        assert!(index < self.size, "index out of bounds");
        match self.encoding {
            Encoding::SingleValued => self.palette[0],
            Encoding::Indirect => {
                let palette_index = self.get_bits(index) as usize;
                self.palette.get(palette_index).copied().unwrap_or(0)
            }
            Encoding::Direct => self.get_bits(index),
        }
    }

    /// Wire encoding: bits-per-entry byte, the palette (VarInt count plus
    /// ids) only for the indirect encoding, then the packed data words
    /// (VarInt count, little-endian 64-bit words).
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_entry);
        if self.encoding == Encoding::Indirect {
            write_varint(buf, self.palette.len() as i32);
            for &entry in &self.palette {
                write_varint(buf, entry as i32);
            }
        }
        write_varint(buf, self.data.len() as i32);
        for &word in &self.data {
            buf.put_slice(&word.to_le_bytes());
        }
    }

    /// Parse a container previously written by [`serialize`]. `size` and
    /// `is_block` describe the expected geometry (4096/true for blocks,
    /// 64/false for biomes). The wire carries no palette for the
    /// single-valued encoding, so `bpe == 0` yields the zero-valued
    /// container.
    pub fn deserialize(buf: &mut BytesMut, size: usize, is_block: bool) -> Result<Self, CodecError> {
        let mut container = Self::new(size, is_block);
        if !buf.has_remaining() {
            return Err(CodecError::NotEnoughData);
        }
        let bits_per_entry = buf.get_u8();

        if bits_per_entry == 0 {
            container.set_single_value(0);
        } else if bits_per_entry <= container.max_indirect_bits() {
            let count = read_varint(buf)?;
            if count < 0 {
                return Err(CodecError::NotEnoughData);
            }
            let mut palette = Vec::with_capacity(count as usize);
            for _ in 0..count {
                palette.push(read_varint(buf)? as u32);
            }
            container.encoding = Encoding::Indirect;
            container.bits_per_entry = bits_per_entry;
            container.palette = palette;
        } else {
            container.encoding = Encoding::Direct;
            container.bits_per_entry = bits_per_entry;
            container.palette.clear();
        }

        let word_count = read_varint(buf)?;
        if word_count < 0 {
            return Err(CodecError::NotEnoughData);
        }
        let mut data = Vec::with_capacity(word_count as usize);
        for _ in 0..word_count {
            if buf.remaining() < 8 {
                return Err(CodecError::NotEnoughData);
            }
            let mut raw = [0u8; 8];
            buf.copy_to_slice(&mut raw);
            data.push(u64::from_le_bytes(raw));
        }
        container.data = data;
        Ok(container)
    }

    fn min_bits(&self) -> u8 {
        if self.is_block {
            MIN_BITS_BLOCK
        } else {
            MIN_BITS_BIOME
        }
    }

    fn direct_bits(&self) -> u8 {
        if self.is_block {
            MAX_BITS_BLOCK
        } else {
            MAX_BITS_BIOME
        }
    }

    fn max_indirect_bits(&self) -> u8 {
        if self.is_block {
            MAX_INDIRECT_BITS_BLOCK
        } else {
            MAX_INDIRECT_BITS_BIOME
        }
    }

    fn pack(&mut self, values: &[u32]) {
        let bits = self.bits_per_entry as usize;
        let values_per_word = 64 / bits;
        let word_count = self.size.div_ceil(values_per_word);
        self.data = vec![0u64; word_count];
        for (i, &value) in values.iter().enumerate() {
            let word = i / values_per_word;
            let offset = (i % values_per_word) * bits;
            let mask = (1u64 << bits) - 1;
            self.data[word] |= (value as u64 & mask) << offset;
        }
    }

    fn get_bits(&self, index: usize) -> u32 {
        let bits = self.bits_per_entry as usize;
        let values_per_word = 64 / bits;
        let word = index / values_per_word;
        let offset = (index % values_per_word) * bits;
        let mask = (1u64 << bits) - 1;
        self.data
            .get(word)
            .map(|&w| ((w >> offset) & mask) as u32)
            .unwrap_or(0)
    }
}

/// Minimum number of bits needed to represent `n`.
pub(crate) fn bit_width(n: usize) -> u8 {
    (usize::BITS - n.leading_zeros()) as u8
}
