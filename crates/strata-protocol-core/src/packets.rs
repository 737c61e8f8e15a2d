use strata_nbt::NbtValue;
use strata_types::{BlockPos, Difficulty, GameMode, GameProfile, TextComponent, Vec3d};
use uuid::Uuid;

/// Version-independent internal packet representation.
/// Protocol adapters convert between wire format and these.
#[derive(Debug, Clone)]
pub enum InternalPacket {
    // === Handshake (serverbound) ===
    Handshake {
        protocol_version: i32,
        server_address: String,
        server_port: u16,
        next_state: i32,
    },

    // === Status ===
    StatusRequest,
    StatusResponse {
        json: String,
    },
    PingRequest {
        payload: i64,
    },
    PongResponse {
        payload: i64,
    },

    // === Login (serverbound) ===
    LoginStart {
        name: String,
        uuid: Uuid,
    },
    LoginAcknowledged,

    // === Login (clientbound) ===
    LoginSuccess {
        profile: GameProfile,
    },

    // === Configuration (serverbound) ===
    ClientInformation {
        locale: String,
        view_distance: i8,
        chat_mode: i32,
        chat_colors: bool,
        skin_parts: u8,
        main_hand: i32,
        text_filtering: bool,
        allow_listing: bool,
    },
    PluginMessage {
        channel: String,
        data: Vec<u8>,
    },
    FinishConfigurationAck,
    KnownPacksResponse {
        packs: Vec<KnownPack>,
    },

    // === Configuration (clientbound) ===
    RegistryData {
        registry_id: String,
        entries: Vec<RegistryEntry>,
    },
    /// Tag table push. The server sends an empty table.
    UpdateTags,
    FinishConfiguration,
    KnownPacksRequest {
        packs: Vec<KnownPack>,
    },

    // === Play (clientbound) ===
    JoinGame {
        entity_id: i32,
        is_hardcore: bool,
        dimension_names: Vec<String>,
        max_players: i32,
        view_distance: i32,
        simulation_distance: i32,
        reduced_debug_info: bool,
        enable_respawn_screen: bool,
        do_limited_crafting: bool,
        dimension_type: i32,
        dimension_name: String,
        hashed_seed: i64,
        game_mode: GameMode,
        previous_game_mode: i8,
        is_debug: bool,
        is_flat: bool,
        death_location: Option<(String, BlockPos)>,
        portal_cooldown: i32,
        sea_level: i32,
        enforces_secure_chat: bool,
    },
    ChangeDifficulty {
        difficulty: Difficulty,
        locked: bool,
    },
    PlayerAbilities {
        flags: u8,
        flying_speed: f32,
        fov_modifier: f32,
    },
    SetHeldItem {
        slot: i8,
    },
    SynchronizePlayerPosition {
        position: Vec3d,
        yaw: f32,
        pitch: f32,
        flags: u8,
        teleport_id: i32,
    },
    SetCenterChunk {
        chunk_x: i32,
        chunk_z: i32,
    },
    /// Chunk Batch Start — empty packet bracketing a chunk burst.
    ChunkBatchStart,
    ChunkBatchFinished {
        batch_size: i32,
    },
    ChunkDataAndUpdateLight {
        chunk_x: i32,
        chunk_z: i32,
        heightmaps: NbtValue,
        data: Vec<u8>,
        block_entities: Vec<BlockEntityData>,
        light_data: ChunkLightData,
    },
    UnloadChunk {
        chunk_x: i32,
        chunk_z: i32,
    },
    SetDefaultSpawnPosition {
        position: BlockPos,
        angle: f32,
    },
    SetHealth {
        health: f32,
        food: i32,
        saturation: f32,
    },
    SetExperience {
        bar: f32,
        level: i32,
        total: i32,
    },
    UpdateTime {
        world_age: i64,
        time_of_day: i64,
    },
    GameEvent {
        event: u8,
        value: f32,
    },
    KeepAliveClientbound {
        id: i64,
    },

    // === Play (serverbound) ===
    ConfirmTeleportation {
        teleport_id: i32,
    },
    ChunkBatchReceived {
        chunks_per_tick: f32,
    },
    KeepAliveServerbound {
        id: i64,
    },
    PlayerPosition {
        x: f64,
        y: f64,
        z: f64,
        on_ground: bool,
    },
    PlayerPositionAndRotation {
        x: f64,
        y: f64,
        z: f64,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    PlayerRotation {
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    PlayerOnGround {
        on_ground: bool,
    },

    // === Shared ===
    Disconnect {
        reason: TextComponent,
    },
}

#[derive(Debug, Clone)]
pub struct KnownPack {
    pub namespace: String,
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: String,
    pub data: Option<NbtValue>,
}

/// One block entity as carried in the chunk packet: chunk-relative x/z
/// packed into a nibble pair, absolute y, registry type id, raw NBT tail.
#[derive(Debug, Clone)]
pub struct BlockEntityData {
    pub packed_xz: u8,
    pub y: i16,
    pub type_id: i32,
    pub data: NbtValue,
}

impl BlockEntityData {
    pub fn pack_xz(rel_x: u8, rel_z: u8) -> u8 {
        ((rel_x & 15) << 4) | (rel_z & 15)
    }
}

/// Light section masks and nibble arrays for the chunk packet.
#[derive(Debug, Clone, Default)]
pub struct ChunkLightData {
    pub sky_light_mask: Vec<i64>,
    pub block_light_mask: Vec<i64>,
    pub empty_sky_light_mask: Vec<i64>,
    pub empty_block_light_mask: Vec<i64>,
    pub sky_light_arrays: Vec<Vec<u8>>,
    pub block_light_arrays: Vec<Vec<u8>>,
}

impl ChunkLightData {
    /// The authoritative "empty" lighting: every light section (chunk
    /// sections plus one below and one above) declared full sky light,
    /// no block light.
    pub fn full_sky(section_count: usize) -> Self {
        let light_sections = section_count + 2;
        let mask = (1i64 << light_sections) - 1;
        Self {
            sky_light_mask: vec![mask],
            block_light_mask: vec![0],
            empty_sky_light_mask: vec![0],
            empty_block_light_mask: vec![mask],
            sky_light_arrays: vec![vec![0xFF; 2048]; light_sections],
            block_light_arrays: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sky_light() {
        let light = ChunkLightData::full_sky(24);
        assert_eq!(light.sky_light_mask, vec![0x3FF_FFFF]);
        assert_eq!(light.sky_light_arrays.len(), 26);
        assert!(light.sky_light_arrays.iter().all(|a| a.len() == 2048));
        assert!(light.block_light_arrays.is_empty());
        assert_eq!(light.empty_block_light_mask, vec![0x3FF_FFFF]);
    }

    #[test]
    fn test_block_entity_xz_packing() {
        assert_eq!(BlockEntityData::pack_xz(0, 0), 0x00);
        assert_eq!(BlockEntityData::pack_xz(15, 15), 0xFF);
        assert_eq!(BlockEntityData::pack_xz(3, 9), 0x39);
    }
}
