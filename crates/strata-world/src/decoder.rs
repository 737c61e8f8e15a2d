use crate::chunk::{ChunkData, ChunkSection, BlockEntity, LIGHT_ARRAY_BYTES, SECTION_BIOMES, SECTION_BLOCKS};
use crate::heightmap::HeightmapKind;
use crate::paletted::{bit_width, PalettedContainer};
use crate::registry::{block_entity_type_id, BiomeRegistry, BlockRegistry};
use strata_nbt::{parse_root, NbtError, NbtValue};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("invalid chunk NBT: {0}")]
    InvalidNbt(#[from] NbtError),
    #[error("invalid section at Y={y}: {reason}")]
    InvalidSection { y: i32, reason: &'static str },
}

/// Decodes raw chunk NBT into [`ChunkData`], resolving palette names
/// through the block and biome registries.
pub struct ChunkDecoder {
    world_height: i32,
    min_y: i32,
    load_lighting: bool,
    blocks: BlockRegistry,
    biomes: BiomeRegistry,
}

impl ChunkDecoder {
    pub fn new(world_height: i32, min_y: i32, blocks: BlockRegistry, biomes: BiomeRegistry) -> Self {
        Self {
            world_height,
            min_y,
            load_lighting: true,
            blocks,
            biomes,
        }
    }

    pub fn load_lighting(mut self, enabled: bool) -> Self {
        self.load_lighting = enabled;
        self
    }

    pub fn decode(&self, nbt_bytes: &[u8], chunk_x: i32, chunk_z: i32) -> Result<ChunkData, ChunkError> {
        let (_, root) = parse_root(nbt_bytes)?;

        // Modern chunks keep everything at root level; legacy chunks nest
        // it under "Level".
        let level = match root.get("Level") {
            Some(nested @ NbtValue::Compound(_)) => nested,
            _ => &root,
        };

        let mut chunk = ChunkData::new(chunk_x, chunk_z, self.world_height, self.min_y);

        self.read_metadata(level, &mut chunk);
        self.read_heightmaps(level, &mut chunk);
        self.read_sections(level, &mut chunk)?;
        self.read_block_entities(level, &mut chunk);

        Ok(chunk)
    }

    fn read_metadata(&self, level: &NbtValue, chunk: &mut ChunkData) {
        chunk.inhabited_time = level
            .get("InhabitedTime")
            .and_then(NbtValue::as_i64)
            .unwrap_or(0);
        chunk.last_update = level
            .get("LastUpdate")
            .and_then(NbtValue::as_i64)
            .unwrap_or(0);
        let status = level
            .get("Status")
            .and_then(NbtValue::as_str)
            .unwrap_or("empty");
        chunk.fully_generated =
            status == "full" || status == "fullchunk" || status == "minecraft:full";
    }

    fn read_heightmaps(&self, level: &NbtValue, chunk: &mut ChunkData) {
        let Some(heightmaps) = level.get("Heightmaps") else {
            return;
        };
        for kind in HeightmapKind::ALL {
            if let Some(packed) = heightmaps.get(kind.name()).and_then(NbtValue::as_long_array) {
                chunk.heightmaps.set_packed(kind, packed);
            }
        }
    }

    fn read_sections(&self, level: &NbtValue, chunk: &mut ChunkData) -> Result<(), ChunkError> {
        let sections = level
            .get("sections")
            .or_else(|| level.get("Sections"))
            .and_then(NbtValue::as_list)
            .unwrap_or(&[]);

        let min_section = self.min_y / 16;
        for section_tag in sections {
            let section_y = section_tag
                .get("Y")
                .and_then(NbtValue::as_i8)
                .unwrap_or(0) as i32;
            let index = section_y - min_section;
            if index < 0 || index as usize >= chunk.sections.len() {
                continue;
            }
            let section = &mut chunk.sections[index as usize];

            if let Some(block_states) = section_tag.get("block_states") {
                self.read_block_states(block_states, section);
            }
            if let Some(biomes) = section_tag.get("biomes") {
                self.read_biomes(biomes, section);
            }
            if self.load_lighting {
                self.read_lighting(section_tag, section, section_y)?;
            }
        }
        Ok(())
    }

    fn read_block_states(&self, block_states: &NbtValue, section: &mut ChunkSection) {
        let palette = block_states.get("palette").and_then(NbtValue::as_list);
        let data = block_states.get("data").and_then(NbtValue::as_long_array);

        let values: Vec<u32> = match (palette, data) {
            (Some(palette), Some(data)) => {
                let ids: Vec<u32> = palette.iter().map(|e| self.resolve_block(e)).collect();
                let bits = bit_width(ids.len().saturating_sub(1)).max(4);
                unpack_words(data, bits, SECTION_BLOCKS)
                    .into_iter()
                    .map(|idx| ids.get(idx as usize).copied().unwrap_or(BlockRegistry::AIR))
                    .collect()
            }
            (None, Some(data)) => unpack_words(data, 15, SECTION_BLOCKS),
            (Some(palette), None) if palette.len() == 1 => {
                vec![self.resolve_block(&palette[0]); SECTION_BLOCKS]
            }
            (Some(palette), None) => {
                warn!(
                    palette_len = palette.len(),
                    "Multi-entry block palette without data array, filling with air"
                );
                vec![BlockRegistry::AIR; SECTION_BLOCKS]
            }
            (None, None) => vec![BlockRegistry::AIR; SECTION_BLOCKS],
        };

        section.block_count = values.iter().filter(|&&v| v != BlockRegistry::AIR).count() as i16;
        section.block_states = PalettedContainer::from_values(&values, true);
    }

    fn read_biomes(&self, biomes: &NbtValue, section: &mut ChunkSection) {
        let palette = biomes.get("palette").and_then(NbtValue::as_list);
        let data = biomes.get("data").and_then(NbtValue::as_long_array);

        let values: Vec<u32> = match (palette, data) {
            (Some(palette), Some(data)) => {
                let ids: Vec<u32> = palette.iter().map(|e| self.resolve_biome(e)).collect();
                let bits = bit_width(ids.len().saturating_sub(1)).max(1);
                unpack_words(data, bits, SECTION_BIOMES)
                    .into_iter()
                    .map(|idx| ids.get(idx as usize).copied().unwrap_or(BiomeRegistry::PLAINS))
                    .collect()
            }
            (None, Some(data)) => unpack_words(data, 6, SECTION_BIOMES),
            (Some(palette), None) if palette.len() == 1 => {
                vec![self.resolve_biome(&palette[0]); SECTION_BIOMES]
            }
            _ => vec![BiomeRegistry::PLAINS; SECTION_BIOMES],
        };

        section.biomes = PalettedContainer::from_values(&values, false);
    }

    fn read_lighting(
        &self,
        section_tag: &NbtValue,
        section: &mut ChunkSection,
        section_y: i32,
    ) -> Result<(), ChunkError> {
        if let Some(sky) = section_tag.get("SkyLight").and_then(NbtValue::as_byte_array) {
            if sky.len() != LIGHT_ARRAY_BYTES {
                return Err(ChunkError::InvalidSection {
                    y: section_y,
                    reason: "SkyLight array is not 2048 bytes",
                });
            }
            section.sky_light = Some(sky.iter().map(|&b| b as u8).collect());
        }
        if let Some(block) = section_tag
            .get("BlockLight")
            .and_then(NbtValue::as_byte_array)
        {
            if block.len() != LIGHT_ARRAY_BYTES {
                return Err(ChunkError::InvalidSection {
                    y: section_y,
                    reason: "BlockLight array is not 2048 bytes",
                });
            }
            section.block_light = Some(block.iter().map(|&b| b as u8).collect());
        }
        Ok(())
    }

    fn read_block_entities(&self, level: &NbtValue, chunk: &mut ChunkData) {
        let entities = level
            .get("block_entities")
            .or_else(|| level.get("BlockEntities"))
            .and_then(NbtValue::as_list)
            .unwrap_or(&[]);

        for entity_tag in entities {
            let NbtValue::Compound(entries) = entity_tag else {
                continue;
            };
            let x = entity_tag.get("x").and_then(NbtValue::as_i64).unwrap_or(0) as i32;
            let y = entity_tag.get("y").and_then(NbtValue::as_i64).unwrap_or(0) as i16;
            let z = entity_tag.get("z").and_then(NbtValue::as_i64).unwrap_or(0) as i32;
            let id = entity_tag.get("id").and_then(NbtValue::as_str).unwrap_or("");

            let type_id = match block_entity_type_id(id) {
                Some(type_id) => type_id,
                None => {
                    info!(id, "Unknown block entity type, keeping with type 0");
                    0
                }
            };

            // The packet tail is the entity data minus the addressing keys.
            let tail: Vec<(String, NbtValue)> = entries
                .iter()
                .filter(|(key, _)| {
                    !matches!(key.as_str(), "x" | "y" | "z" | "id" | "keepPacked")
                })
                .cloned()
                .collect();

            chunk.block_entities.push(BlockEntity {
                rel_x: (x & 15) as u8,
                rel_z: (z & 15) as u8,
                y,
                type_id,
                data: NbtValue::Compound(tail),
            });
        }
    }

    fn resolve_block(&self, palette_entry: &NbtValue) -> u32 {
        let name = palette_entry
            .get("Name")
            .and_then(NbtValue::as_str)
            .unwrap_or("minecraft:air");
        match self.blocks.state_id(name) {
            Some(id) => id,
            None => {
                info!(block = name, "Unknown block name, substituting air");
                BlockRegistry::AIR
            }
        }
    }

    fn resolve_biome(&self, palette_entry: &NbtValue) -> u32 {
        let name = palette_entry.as_str().unwrap_or("minecraft:plains");
        match self.biomes.biome_id(name) {
            Some(id) => id,
            None => {
                info!(biome = name, "Unknown biome name, substituting plains");
                BiomeRegistry::PLAINS
            }
        }
    }
}

/// Unpack bit-packed entries from 64-bit words; entries never straddle a
/// word boundary. Missing trailing words read as zero.
fn unpack_words(data: &[i64], bits: u8, size: usize) -> Vec<u32> {
    let bits = bits as usize;
    let values_per_word = 64 / bits;
    let mask = (1u64 << bits) - 1;

    let mut values = vec![0u32; size];
    for (i, value) in values.iter_mut().enumerate() {
        let word = i / values_per_word;
        let offset = (i % values_per_word) * bits;
        match data.get(word) {
            Some(&w) => *value = ((w as u64 >> offset) & mask) as u32,
            None => break,
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn decoder() -> ChunkDecoder {
        ChunkDecoder::new(
            384,
            -64,
            BlockRegistry::with_basic_blocks(),
            BiomeRegistry::with_basic_biomes(),
        )
    }

    fn encode(nbt: &NbtValue) -> Vec<u8> {
        let mut buf = BytesMut::new();
        nbt.write_root_named("", &mut buf);
        buf.to_vec()
    }

    fn block_palette_entry(name: &str) -> NbtValue {
        NbtValue::compound([("Name", NbtValue::string(name))])
    }

    /// Pack palette indices the way chunk NBT stores them.
    fn pack_indices(indices: &[u32], bits: usize) -> Vec<i64> {
        let values_per_word = 64 / bits;
        let mut words = vec![0i64; indices.len().div_ceil(values_per_word)];
        for (i, &idx) in indices.iter().enumerate() {
            let word = i / values_per_word;
            let offset = (i % values_per_word) * bits;
            words[word] |= ((idx as u64) << offset) as i64;
        }
        words
    }

    #[test]
    fn test_single_palette_section() {
        let nbt = NbtValue::compound([
            ("Status", NbtValue::string("full")),
            (
                "sections",
                NbtValue::list([NbtValue::compound([
                    ("Y", NbtValue::Byte(-4)),
                    (
                        "block_states",
                        NbtValue::compound([(
                            "palette",
                            NbtValue::list([block_palette_entry("minecraft:bedrock")]),
                        )]),
                    ),
                    (
                        "biomes",
                        NbtValue::compound([(
                            "palette",
                            NbtValue::list([NbtValue::string("minecraft:plains")]),
                        )]),
                    ),
                ])]),
            ),
        ]);
        let chunk = decoder().decode(&encode(&nbt), 0, 0).unwrap();
        assert!(chunk.fully_generated);
        let section = &chunk.sections[0];
        assert_eq!(section.block_count, 4096);
        assert_eq!(section.block_states.get(0), 21); // bedrock
        assert_eq!(section.biomes.get(0), 0);
        // Sections the NBT does not mention stay empty.
        assert!(chunk.sections[1].is_empty());
    }

    #[test]
    fn test_indirect_section_with_data() {
        // Alternating air / stone: 2 palette entries packed at 4 bits.
        let indices: Vec<u32> = (0..4096).map(|i| (i % 2) as u32).collect();
        let nbt = NbtValue::compound([(
            "sections",
            NbtValue::list([NbtValue::compound([
                ("Y", NbtValue::Byte(0)),
                (
                    "block_states",
                    NbtValue::compound([
                        (
                            "palette",
                            NbtValue::list([
                                block_palette_entry("minecraft:air"),
                                block_palette_entry("minecraft:stone"),
                            ]),
                        ),
                        ("data", NbtValue::LongArray(pack_indices(&indices, 4))),
                    ]),
                ),
            ])]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 0, 0).unwrap();
        let section = &chunk.sections[4]; // Y=0 is the fifth section from -64
        assert_eq!(section.block_count, 2048);
        assert_eq!(section.block_states.get(0), 0);
        assert_eq!(section.block_states.get(1), 1);
        assert_eq!(section.block_states.get(4095), 1);
    }

    #[test]
    fn test_unknown_block_name_becomes_air() {
        let nbt = NbtValue::compound([(
            "sections",
            NbtValue::list([NbtValue::compound([
                ("Y", NbtValue::Byte(-4)),
                (
                    "block_states",
                    NbtValue::compound([(
                        "palette",
                        NbtValue::list([block_palette_entry("minecraft:warped_fungus")]),
                    )]),
                ),
            ])]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 0, 0).unwrap();
        assert_eq!(chunk.sections[0].block_states.get(0), 0);
        assert_eq!(chunk.sections[0].block_count, 0);
    }

    #[test]
    fn test_multi_palette_without_data_fills_air() {
        let nbt = NbtValue::compound([(
            "sections",
            NbtValue::list([NbtValue::compound([
                ("Y", NbtValue::Byte(-4)),
                (
                    "block_states",
                    NbtValue::compound([(
                        "palette",
                        NbtValue::list([
                            block_palette_entry("minecraft:stone"),
                            block_palette_entry("minecraft:dirt"),
                        ]),
                    )]),
                ),
            ])]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 0, 0).unwrap();
        assert_eq!(chunk.sections[0].block_states.get(0), 0);
    }

    #[test]
    fn test_bad_light_array_rejected() {
        let nbt = NbtValue::compound([(
            "sections",
            NbtValue::list([NbtValue::compound([
                ("Y", NbtValue::Byte(-4)),
                ("SkyLight", NbtValue::ByteArray(vec![0x0F; 100])),
            ])]),
        )]);
        assert!(matches!(
            decoder().decode(&encode(&nbt), 0, 0),
            Err(ChunkError::InvalidSection { y: -4, .. })
        ));
    }

    #[test]
    fn test_lighting_copied() {
        let nbt = NbtValue::compound([(
            "sections",
            NbtValue::list([NbtValue::compound([
                ("Y", NbtValue::Byte(-4)),
                ("SkyLight", NbtValue::ByteArray(vec![-1i8; 2048])),
                ("BlockLight", NbtValue::ByteArray(vec![0x22; 2048])),
            ])]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 0, 0).unwrap();
        let section = &chunk.sections[0];
        assert_eq!(section.sky_light.as_ref().unwrap()[0], 0xFF);
        assert_eq!(section.block_light.as_ref().unwrap()[0], 0x22);
    }

    #[test]
    fn test_legacy_level_root() {
        let nbt = NbtValue::compound([(
            "Level",
            NbtValue::compound([
                ("InhabitedTime", NbtValue::Long(1234)),
                ("LastUpdate", NbtValue::Long(99)),
                ("Status", NbtValue::string("full")),
            ]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 3, -2).unwrap();
        assert_eq!(chunk.inhabited_time, 1234);
        assert_eq!(chunk.last_update, 99);
        assert!(chunk.fully_generated);
        assert_eq!(chunk.chunk_x, 3);
        assert_eq!(chunk.chunk_z, -2);
    }

    #[test]
    fn test_block_entities() {
        let nbt = NbtValue::compound([(
            "block_entities",
            NbtValue::list([NbtValue::compound([
                ("id", NbtValue::string("minecraft:chest")),
                ("x", NbtValue::Int(19)),
                ("y", NbtValue::Int(70)),
                ("z", NbtValue::Int(-3)),
                ("keepPacked", NbtValue::Byte(0)),
                ("CustomName", NbtValue::string("loot")),
            ])]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 1, -1).unwrap();
        assert_eq!(chunk.block_entities.len(), 1);
        let entity = &chunk.block_entities[0];
        assert_eq!(entity.rel_x, 3);
        assert_eq!(entity.rel_z, 13);
        assert_eq!(entity.y, 70);
        assert_eq!(entity.type_id, 1); // chest
        assert!(entity.data.get("CustomName").is_some());
        assert!(entity.data.get("x").is_none());

        let packet = entity.to_packet_data();
        assert_eq!(packet.packed_xz, 0x3D);
    }

    #[test]
    fn test_heightmaps_unpacked() {
        let mut source = crate::heightmap::HeightMap::new(384, -64);
        source.set_direct(
            HeightmapKind::MotionBlocking,
            (0..256u16).map(|i| i % 385).collect(),
        );
        let packed = source.pack(HeightmapKind::MotionBlocking).unwrap();

        let nbt = NbtValue::compound([(
            "Heightmaps",
            NbtValue::compound([("MOTION_BLOCKING", NbtValue::LongArray(packed))]),
        )]);
        let chunk = decoder().decode(&encode(&nbt), 0, 0).unwrap();
        assert!(chunk.heightmaps.has(HeightmapKind::MotionBlocking));
        assert_eq!(chunk.heightmaps.get_height(HeightmapKind::MotionBlocking, 5, 0), 5);
        assert!(!chunk.heightmaps.has(HeightmapKind::OceanFloor));
    }

    #[test]
    fn test_garbage_nbt_is_invalid() {
        assert!(matches!(
            decoder().decode(&[0xFF, 0x00, 0x13], 0, 0),
            Err(ChunkError::InvalidNbt(_))
        ));
    }
}
