use md5::{Digest, Md5};
use std::time::Instant;
use strata_types::{ChunkPos, GameProfile, Vec3d};
use uuid::Uuid;

/// Client-reported settings from the Configuration phase.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub locale: String,
    pub view_distance: u8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub skin_parts: u8,
    pub main_hand: i32,
    pub text_filtering: bool,
    pub allow_listing: bool,
}

/// A connected player. Lives in the temporary table between Login Start and
/// the end of Configuration, then moves to the active table.
#[derive(Debug, Clone)]
pub struct Player {
    pub entity_id: u32,
    pub profile: GameProfile,
    pub config: Option<PlayerConfig>,
    pub position: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub last_keepalive: Instant,
    pub pending_keepalive: Option<i64>,
}

impl Player {
    pub fn new(entity_id: u32, profile: GameProfile, position: Vec3d) -> Self {
        let chunk = position.chunk_pos();
        Self {
            entity_id,
            profile,
            config: None,
            position,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: false,
            chunk_x: chunk.x,
            chunk_z: chunk.z,
            last_keepalive: Instant::now(),
            pending_keepalive: None,
        }
    }

    pub fn update_position(&mut self, x: f64, y: f64, z: f64, on_ground: bool) {
        self.position = Vec3d::new(x, y, z);
        self.on_ground = on_ground;
    }

    pub fn update_rotation(&mut self, yaw: f32, pitch: f32, on_ground: bool) {
        self.yaw = yaw;
        self.pitch = pitch;
        self.on_ground = on_ground;
    }

    /// The chunk the player currently stands in, which may differ from the
    /// tracked `chunk_x`/`chunk_z` center until the handler re-centers.
    pub fn current_chunk(&self) -> ChunkPos {
        self.position.chunk_pos()
    }
}

/// Derive the offline-mode UUID for a player name: the MD5 of
/// `"OfflinePlayer:" + name` with the version nibble forced to 3
/// (name-based MD5) and the variant forced to IETF.
pub fn offline_uuid(name: &str) -> Uuid {
    let mut hasher = Md5::new();
    hasher.update(b"OfflinePlayer:");
    hasher.update(name.as_bytes());
    let mut bytes: [u8; 16] = hasher.finalize().into();
    bytes[6] = (bytes[6] & 0x0F) | 0x30;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Uuid::from_bytes(bytes)
}
