use std::collections::HashMap;

/// Maps block names from chunk palettes to numeric block state ids.
/// Unknown names resolve to air; callers log and continue.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    by_name: HashMap<String, u32>,
}

impl BlockRegistry {
    pub const AIR: u32 = 0;

    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table covering the block set common overworld chunks
    /// contain. Registry contents are data, not behaviour; extending the
    /// table does not change the decoder.
    pub fn with_basic_blocks() -> Self {
        let mut registry = Self::new();
        for (id, name) in BASIC_BLOCKS.iter().enumerate() {
            registry.insert(format!("minecraft:{}", name), id as u32);
        }
        registry
    }

    pub fn insert(&mut self, name: impl Into<String>, state_id: u32) {
        self.by_name.insert(name.into(), state_id);
    }

    pub fn state_id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Maps biome names from chunk palettes to numeric biome ids.
#[derive(Debug, Clone, Default)]
pub struct BiomeRegistry {
    by_name: HashMap<String, u32>,
}

impl BiomeRegistry {
    /// Plains is the fallback for unknown biome names.
    pub const PLAINS: u32 = 0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_basic_biomes() -> Self {
        let mut registry = Self::new();
        for (id, name) in BASIC_BIOMES.iter().enumerate() {
            registry.insert(format!("minecraft:{}", name), id as u32);
        }
        registry
    }

    pub fn insert(&mut self, name: impl Into<String>, biome_id: u32) {
        self.by_name.insert(name.into(), biome_id);
    }

    pub fn biome_id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }
}

/// Block entity type ids for the chunk packet.
pub(crate) fn block_entity_type_id(name: &str) -> Option<u32> {
    let path = name.strip_prefix("minecraft:").unwrap_or(name);
    BLOCK_ENTITY_TYPES
        .iter()
        .position(|&entry| entry == path)
        .map(|idx| idx as u32)
}

/// Default-state ids for common blocks, indexed by position. Ordering is
/// the registry's wire contract: changing it changes every saved world's
/// meaning, so entries are append-only.
const BASIC_BLOCKS: &[&str] = &[
    "air",
    "stone",
    "granite",
    "polished_granite",
    "diorite",
    "polished_diorite",
    "andesite",
    "polished_andesite",
    "grass_block",
    "dirt",
    "coarse_dirt",
    "podzol",
    "cobblestone",
    "oak_planks",
    "spruce_planks",
    "birch_planks",
    "jungle_planks",
    "acacia_planks",
    "dark_oak_planks",
    "oak_sapling",
    "spruce_sapling",
    "bedrock",
    "water",
    "lava",
    "sand",
    "red_sand",
    "gravel",
    "gold_ore",
    "deepslate_gold_ore",
    "iron_ore",
    "deepslate_iron_ore",
    "coal_ore",
    "deepslate_coal_ore",
    "nether_gold_ore",
    "oak_log",
    "spruce_log",
    "birch_log",
    "jungle_log",
    "acacia_log",
    "dark_oak_log",
    "stripped_spruce_log",
    "stripped_birch_log",
    "stripped_jungle_log",
    "stripped_acacia_log",
    "stripped_dark_oak_log",
    "stripped_oak_log",
    "oak_wood",
    "spruce_wood",
    "birch_wood",
    "jungle_wood",
    "acacia_wood",
    "dark_oak_wood",
    "stripped_oak_wood",
    "stripped_spruce_wood",
    "oak_leaves",
    "spruce_leaves",
    "birch_leaves",
    "deepslate",
    "tuff",
    "calcite",
    "snow",
    "ice",
    "sandstone",
    "clay",
    "obsidian",
];

const BASIC_BIOMES: &[&str] = &[
    "plains",
    "desert",
    "forest",
    "taiga",
    "swamp",
    "river",
    "ocean",
    "beach",
    "mountains",
];

const BLOCK_ENTITY_TYPES: &[&str] = &[
    "furnace",
    "chest",
    "trapped_chest",
    "ender_chest",
    "jukebox",
    "dispenser",
    "dropper",
    "sign",
    "hanging_sign",
    "mob_spawner",
    "piston",
    "brewing_stand",
    "enchanting_table",
    "end_portal",
    "beacon",
    "skull",
    "daylight_detector",
    "hopper",
    "comparator",
    "banner",
    "structure_block",
    "end_gateway",
    "command_block",
    "shulker_box",
    "bed",
    "conduit",
    "barrel",
    "smoker",
    "blast_furnace",
    "lectern",
    "bell",
    "campfire",
];
