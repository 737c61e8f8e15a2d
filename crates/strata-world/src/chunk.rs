use crate::heightmap::HeightMap;
use crate::paletted::PalettedContainer;
use crate::registry::BiomeRegistry;
use bytes::{BufMut, BytesMut};
use strata_nbt::NbtValue;
use strata_protocol_core::BlockEntityData;

pub const SECTION_BLOCKS: usize = 4096;
pub const SECTION_BIOMES: usize = 64;
pub const LIGHT_ARRAY_BYTES: usize = 2048;

/// A 16x16x16 slab of a chunk column.
#[derive(Debug, Clone)]
pub struct ChunkSection {
    pub block_states: PalettedContainer,
    pub biomes: PalettedContainer,
    pub sky_light: Option<Vec<u8>>,
    pub block_light: Option<Vec<u8>>,
    /// Cached count of non-air blocks.
    pub block_count: i16,
}

impl ChunkSection {
    /// An all-air section over the default biome.
    pub fn empty() -> Self {
        Self {
            block_states: PalettedContainer::new(SECTION_BLOCKS, true),
            biomes: {
                let mut biomes = PalettedContainer::new(SECTION_BIOMES, false);
                biomes.set_single_value(BiomeRegistry::PLAINS);
                biomes
            },
            sky_light: None,
            block_light: None,
            block_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// Wire layout inside the chunk packet's data field: non-air count,
    /// block container, biome container.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i16(self.block_count);
        self.block_states.serialize(buf);
        self.biomes.serialize(buf);
    }
}

/// One block entity decoded from chunk NBT. Coordinates are chunk-relative
/// in x/z, absolute in y.
#[derive(Debug, Clone)]
pub struct BlockEntity {
    pub rel_x: u8,
    pub rel_z: u8,
    pub y: i16,
    pub type_id: u32,
    pub data: NbtValue,
}

impl BlockEntity {
    pub fn to_packet_data(&self) -> BlockEntityData {
        BlockEntityData {
            packed_xz: BlockEntityData::pack_xz(self.rel_x, self.rel_z),
            y: self.y,
            type_id: self.type_id as i32,
            data: self.data.clone(),
        }
    }
}

/// A full chunk column keyed by `(chunk_x, chunk_z)`.
#[derive(Debug, Clone)]
pub struct ChunkData {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub world_height: i32,
    pub min_y: i32,
    pub sections: Vec<ChunkSection>,
    pub heightmaps: HeightMap,
    pub block_entities: Vec<BlockEntity>,
    pub last_update: i64,
    pub inhabited_time: i64,
    pub fully_generated: bool,
}

impl ChunkData {
    pub fn new(chunk_x: i32, chunk_z: i32, world_height: i32, min_y: i32) -> Self {
        let section_count = (world_height / 16) as usize;
        Self {
            chunk_x,
            chunk_z,
            world_height,
            min_y,
            sections: (0..section_count).map(|_| ChunkSection::empty()).collect(),
            heightmaps: HeightMap::new(world_height, min_y),
            block_entities: Vec::new(),
            last_update: 0,
            inhabited_time: 0,
            fully_generated: false,
        }
    }

    /// The fallback chunk for missing or undecodable region data: all-air
    /// sections, plains biome, zeroed generated heightmaps.
    pub fn empty(chunk_x: i32, chunk_z: i32, world_height: i32, min_y: i32) -> Self {
        let mut chunk = Self::new(chunk_x, chunk_z, world_height, min_y);
        chunk.heightmaps.generate_empty();
        chunk
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(ChunkSection::is_empty) && self.block_entities.is_empty()
    }

    /// Serialize every section into the chunk packet's data field.
    pub fn serialize_sections(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for section in &self.sections {
            section.write_to(&mut buf);
        }
        buf.to_vec()
    }

    pub fn heightmaps_nbt(&self) -> NbtValue {
        self.heightmaps.to_nbt()
    }

    pub fn block_entities_packet_data(&self) -> Vec<BlockEntityData> {
        self.block_entities
            .iter()
            .map(BlockEntity::to_packet_data)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paletted::Encoding;

    #[test]
    fn test_empty_chunk_shape() {
        let chunk = ChunkData::empty(0, 0, 384, -64);
        assert_eq!(chunk.section_count(), 24);
        assert!(chunk.is_empty());
        assert!(!chunk.fully_generated);
        for section in &chunk.sections {
            assert_eq!(section.block_states.encoding(), Encoding::SingleValued);
            assert_eq!(section.block_states.get(0), 0);
            assert_eq!(section.biomes.get(0), BiomeRegistry::PLAINS);
        }
        assert!(chunk
            .heightmaps
            .has(crate::heightmap::HeightmapKind::MotionBlocking));
    }

    #[test]
    fn test_empty_section_wire_size() {
        let section = ChunkSection::empty();
        let mut buf = BytesMut::new();
        section.write_to(&mut buf);
        // count(2) + blocks [bpe, data len] + biomes [bpe, data len]
        assert_eq!(buf.len(), 6);
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_non_empty_chunk() {
        let mut chunk = ChunkData::new(1, -1, 384, -64);
        let mut blocks = vec![0u32; SECTION_BLOCKS];
        blocks[0] = 1;
        chunk.sections[0].block_states = PalettedContainer::from_values(&blocks, true);
        chunk.sections[0].block_count = 1;
        assert!(!chunk.is_empty());

        let data = chunk.serialize_sections();
        // First section now carries a palette; the remaining 23 are 6 bytes.
        assert!(data.len() > 24 * 6);
    }
}
