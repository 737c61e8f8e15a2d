use crate::paletted::bit_width;
use std::collections::BTreeMap;
use strata_nbt::NbtValue;

const HEIGHTMAP_SIZE: usize = 256;

/// The heightmap kinds stored in chunk NBT and sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeightmapKind {
    MotionBlocking,
    MotionBlockingNoLeaves,
    OceanFloor,
    WorldSurface,
    WorldSurfaceWg,
}

impl HeightmapKind {
    pub const ALL: [HeightmapKind; 5] = [
        HeightmapKind::MotionBlocking,
        HeightmapKind::MotionBlockingNoLeaves,
        HeightmapKind::OceanFloor,
        HeightmapKind::WorldSurface,
        HeightmapKind::WorldSurfaceWg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HeightmapKind::MotionBlocking => "MOTION_BLOCKING",
            HeightmapKind::MotionBlockingNoLeaves => "MOTION_BLOCKING_NO_LEAVES",
            HeightmapKind::OceanFloor => "OCEAN_FLOOR",
            HeightmapKind::WorldSurface => "WORLD_SURFACE",
            HeightmapKind::WorldSurfaceWg => "WORLD_SURFACE_WG",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

/// Per-kind 16x16 height grids, bit-packed on the wire with
/// `ceil(log2(world_height + 1))` bits per entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    maps: BTreeMap<HeightmapKind, Vec<u16>>,
    world_height: i32,
    min_y: i32,
    bits_per_entry: u8,
}

impl HeightMap {
    pub fn new(world_height: i32, min_y: i32) -> Self {
        assert!(world_height > 0, "world height must be positive");
        Self {
            maps: BTreeMap::new(),
            world_height,
            min_y,
            bits_per_entry: Self::bits_for_height(world_height),
        }
    }

    /// Heights run 0..=world_height inclusive, hence the +1.
    pub fn bits_for_height(world_height: i32) -> u8 {
        bit_width(world_height as usize)
    }

    pub fn bits_per_entry(&self) -> u8 {
        self.bits_per_entry
    }

    pub fn world_height(&self) -> i32 {
        self.world_height
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn has(&self, kind: HeightmapKind) -> bool {
        self.maps.contains_key(&kind)
    }

    pub fn get_height(&self, kind: HeightmapKind, x: u8, z: u8) -> u16 {
        assert!(x < 16 && z < 16, "coordinates must be within 0-15");
        self.maps
            .get(&kind)
            .map(|heights| heights[z as usize * 16 + x as usize])
            .unwrap_or(0)
    }

    /// Install a heightmap from already-unpacked heights.
    pub fn set_direct(&mut self, kind: HeightmapKind, heights: Vec<u16>) {
        assert_eq!(heights.len(), HEIGHTMAP_SIZE, "height grid must have 256 entries");
        self.maps.insert(kind, heights);
    }

    /// Install a heightmap from the packed long array found in chunk NBT.
    pub fn set_packed(&mut self, kind: HeightmapKind, packed: &[i64]) {
        self.maps.insert(kind, self.unpack(packed));
    }

    /// Zero-filled MOTION_BLOCKING and WORLD_SURFACE grids, the shape the
    /// empty chunk carries.
    pub fn generate_empty(&mut self) {
        for kind in [HeightmapKind::MotionBlocking, HeightmapKind::WorldSurface] {
            self.maps.insert(kind, vec![0; HEIGHTMAP_SIZE]);
        }
    }

    pub fn pack(&self, kind: HeightmapKind) -> Option<Vec<i64>> {
        let heights = self.maps.get(&kind)?;
        let bits = self.bits_per_entry as usize;
        let values_per_word = 64 / bits;
        let word_count = HEIGHTMAP_SIZE.div_ceil(values_per_word);
        let mask = (1u64 << bits) - 1;

        let mut packed = vec![0i64; word_count];
        for (i, &height) in heights.iter().enumerate() {
            let word = i / values_per_word;
            let offset = (i % values_per_word) * bits;
            packed[word] |= ((height as u64 & mask) << offset) as i64;
        }
        Some(packed)
    }

    fn unpack(&self, packed: &[i64]) -> Vec<u16> {
        let bits = self.bits_per_entry as usize;
        let values_per_word = 64 / bits;
        let mask = (1u64 << bits) - 1;

        let mut heights = vec![0u16; HEIGHTMAP_SIZE];
        for (i, height) in heights.iter_mut().enumerate() {
            let word = i / values_per_word;
            let offset = (i % values_per_word) * bits;
            match packed.get(word) {
                Some(&value) => *height = ((value as u64 >> offset) & mask) as u16,
                None => break,
            }
        }
        heights
    }

    /// The heightmaps compound sent in the chunk packet: one long array
    /// per present kind.
    pub fn to_nbt(&self) -> NbtValue {
        let entries = self
            .maps
            .keys()
            .map(|&kind| {
                (
                    kind.name().to_string(),
                    NbtValue::LongArray(self.pack(kind).unwrap_or_default()),
                )
            })
            .collect();
        NbtValue::Compound(entries)
    }
}
