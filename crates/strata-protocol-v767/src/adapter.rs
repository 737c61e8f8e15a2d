use anyhow::{bail, Result};
use bytes::{BufMut, BytesMut};
use strata_nbt::NbtValue;
use strata_protocol_core::*;
use strata_types::TextComponent;

use crate::registries;

/// Wire adapter for protocol 767 ("1.21.1").
pub struct V767Adapter;

impl V767Adapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for V767Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter for V767Adapter {
    fn protocol_version(&self) -> i32 {
        767
    }

    fn decode_packet(
        &self,
        phase: Phase,
        id: i32,
        data: &mut BytesMut,
    ) -> Result<InternalPacket> {
        match phase {
            Phase::Handshake => decode_handshake(id, data),
            Phase::Status => decode_status(id, data),
            Phase::Login => decode_login(id, data),
            Phase::Configuration => decode_configuration(id, data),
            Phase::Play => decode_play(id, data),
            Phase::Disconnecting => bail!("Connection is disconnecting"),
        }
    }

    fn encode_packet(&self, phase: Phase, packet: &InternalPacket) -> Result<BytesMut> {
        match phase {
            Phase::Status => encode_status(packet),
            Phase::Login => encode_login(packet),
            Phase::Configuration => encode_configuration(packet),
            Phase::Play => encode_play(packet),
            _ => bail!("Cannot encode packets in {:?} phase", phase),
        }
    }

    fn registry_data(&self) -> Vec<InternalPacket> {
        registries::build_registry_packets()
    }
}

/// Packet id constants for protocol 767.
pub mod ids {
    // Handshake serverbound
    pub const HANDSHAKE: i32 = 0x00;

    // Status
    pub const STATUS_REQUEST: i32 = 0x00;
    pub const PING_REQUEST: i32 = 0x01;
    pub const STATUS_RESPONSE: i32 = 0x00;
    pub const PONG_RESPONSE: i32 = 0x01;

    // Login serverbound
    pub const LOGIN_START: i32 = 0x00;
    pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;

    // Login clientbound
    pub const LOGIN_DISCONNECT: i32 = 0x00;
    pub const LOGIN_SUCCESS: i32 = 0x02;

    // Configuration serverbound
    pub const CONFIG_CLIENT_INFORMATION: i32 = 0x00;
    pub const CONFIG_PLUGIN_MESSAGE: i32 = 0x02;
    pub const CONFIG_FINISH_ACK: i32 = 0x03;
    pub const CONFIG_KNOWN_PACKS_RESPONSE: i32 = 0x07;

    // Configuration clientbound
    pub const CONFIG_DISCONNECT: i32 = 0x02;
    pub const CONFIG_FINISH: i32 = 0x03;
    pub const CONFIG_REGISTRY_DATA: i32 = 0x07;
    pub const CONFIG_UPDATE_TAGS: i32 = 0x0D;
    pub const CONFIG_KNOWN_PACKS: i32 = 0x0E;

    // Play serverbound
    pub const PLAY_CONFIRM_TELEPORT: i32 = 0x00;
    pub const PLAY_CHUNK_BATCH_RECEIVED: i32 = 0x08;
    pub const PLAY_KEEP_ALIVE_SB: i32 = 0x18;
    pub const PLAY_POSITION: i32 = 0x1A;
    pub const PLAY_POSITION_ROTATION: i32 = 0x1B;
    pub const PLAY_ROTATION: i32 = 0x1C;
    pub const PLAY_ON_GROUND: i32 = 0x1D;

    // Play clientbound
    pub const PLAY_CHANGE_DIFFICULTY: i32 = 0x0B;
    pub const PLAY_CHUNK_BATCH_FINISHED: i32 = 0x0C;
    pub const PLAY_CHUNK_BATCH_START: i32 = 0x0D;
    pub const PLAY_DISCONNECT: i32 = 0x1D;
    pub const PLAY_UNLOAD_CHUNK: i32 = 0x21;
    pub const PLAY_GAME_EVENT: i32 = 0x22;
    pub const PLAY_KEEP_ALIVE: i32 = 0x26;
    pub const PLAY_CHUNK_DATA: i32 = 0x27;
    pub const PLAY_LOGIN: i32 = 0x2B;
    pub const PLAY_ABILITIES: i32 = 0x38;
    pub const PLAY_SYNC_PLAYER_POS: i32 = 0x40;
    pub const PLAY_SET_HELD_ITEM: i32 = 0x53;
    pub const PLAY_SET_CENTER_CHUNK: i32 = 0x54;
    pub const PLAY_SET_DEFAULT_SPAWN: i32 = 0x56;
    pub const PLAY_SET_EXPERIENCE: i32 = 0x5C;
    pub const PLAY_SET_HEALTH: i32 = 0x5D;
    pub const PLAY_UPDATE_TIME: i32 = 0x64;
}

// === Decode functions ===

fn decode_handshake(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        ids::HANDSHAKE => {
            let protocol_version = read_varint(data)?;
            let server_address = read_string(data, 255)?;
            let server_port = read_u16(data)?;
            let next_state = read_varint(data)?;
            Ok(InternalPacket::Handshake {
                protocol_version,
                server_address,
                server_port,
                next_state,
            })
        }
        _ => bail!("Unknown handshake packet 0x{:02X}", id),
    }
}

fn decode_status(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        ids::STATUS_REQUEST => Ok(InternalPacket::StatusRequest),
        ids::PING_REQUEST => {
            let payload = read_i64(data)?;
            Ok(InternalPacket::PingRequest { payload })
        }
        _ => bail!("Unknown status packet 0x{:02X}", id),
    }
}

fn decode_login(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        ids::LOGIN_START => {
            let name = read_string(data, 16)?;
            let uuid = read_uuid(data)?;
            Ok(InternalPacket::LoginStart { name, uuid })
        }
        ids::LOGIN_ACKNOWLEDGED => Ok(InternalPacket::LoginAcknowledged),
        _ => bail!("Unknown login packet 0x{:02X}", id),
    }
}

fn decode_configuration(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        ids::CONFIG_CLIENT_INFORMATION => {
            let locale = read_string(data, 16)?;
            let view_distance = read_i8(data)?;
            let chat_mode = read_varint(data)?;
            let chat_colors = read_bool(data)?;
            let skin_parts = read_u8(data)?;
            let main_hand = read_varint(data)?;
            let text_filtering = read_bool(data)?;
            let allow_listing = read_bool(data)?;
            Ok(InternalPacket::ClientInformation {
                locale,
                view_distance,
                chat_mode,
                chat_colors,
                skin_parts,
                main_hand,
                text_filtering,
                allow_listing,
            })
        }
        ids::CONFIG_PLUGIN_MESSAGE => {
            let channel = read_string(data, 32767)?;
            let rest = data.split_to(data.len());
            Ok(InternalPacket::PluginMessage {
                channel,
                data: rest.to_vec(),
            })
        }
        ids::CONFIG_FINISH_ACK => Ok(InternalPacket::FinishConfigurationAck),
        ids::CONFIG_KNOWN_PACKS_RESPONSE => {
            let count = read_varint(data)? as usize;
            let mut packs = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let namespace = read_string(data, 32767)?;
                let id = read_string(data, 32767)?;
                let version = read_string(data, 32767)?;
                packs.push(KnownPack {
                    namespace,
                    id,
                    version,
                });
            }
            Ok(InternalPacket::KnownPacksResponse { packs })
        }
        _ => bail!("Unknown configuration packet 0x{:02X}", id),
    }
}

fn decode_play(id: i32, data: &mut BytesMut) -> Result<InternalPacket> {
    match id {
        ids::PLAY_CONFIRM_TELEPORT => {
            let teleport_id = read_varint(data)?;
            Ok(InternalPacket::ConfirmTeleportation { teleport_id })
        }
        ids::PLAY_CHUNK_BATCH_RECEIVED => {
            let chunks_per_tick = read_f32(data)?;
            Ok(InternalPacket::ChunkBatchReceived { chunks_per_tick })
        }
        ids::PLAY_KEEP_ALIVE_SB => {
            let id = read_i64(data)?;
            Ok(InternalPacket::KeepAliveServerbound { id })
        }
        ids::PLAY_POSITION => {
            let x = read_f64(data)?;
            let y = read_f64(data)?;
            let z = read_f64(data)?;
            let on_ground = read_bool(data)?;
            Ok(InternalPacket::PlayerPosition { x, y, z, on_ground })
        }
        ids::PLAY_POSITION_ROTATION => {
            let x = read_f64(data)?;
            let y = read_f64(data)?;
            let z = read_f64(data)?;
            let yaw = read_f32(data)?;
            let pitch = read_f32(data)?;
            let on_ground = read_bool(data)?;
            Ok(InternalPacket::PlayerPositionAndRotation {
                x,
                y,
                z,
                yaw,
                pitch,
                on_ground,
            })
        }
        ids::PLAY_ROTATION => {
            let yaw = read_f32(data)?;
            let pitch = read_f32(data)?;
            let on_ground = read_bool(data)?;
            Ok(InternalPacket::PlayerRotation {
                yaw,
                pitch,
                on_ground,
            })
        }
        ids::PLAY_ON_GROUND => {
            let on_ground = read_bool(data)?;
            Ok(InternalPacket::PlayerOnGround { on_ground })
        }
        _ => bail!("Unknown play packet 0x{:02X}", id),
    }
}

// === Encode functions ===

fn encode_status(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::StatusResponse { json } => {
            write_varint(&mut buf, ids::STATUS_RESPONSE);
            write_string(&mut buf, json);
        }
        InternalPacket::PongResponse { payload } => {
            write_varint(&mut buf, ids::PONG_RESPONSE);
            buf.put_i64(*payload);
        }
        _ => bail!("Cannot encode {:?} in Status phase", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_login(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::Disconnect { reason } => {
            write_varint(&mut buf, ids::LOGIN_DISCONNECT);
            write_string(&mut buf, &reason.to_json());
        }
        InternalPacket::LoginSuccess { profile } => {
            write_varint(&mut buf, ids::LOGIN_SUCCESS);
            write_uuid(&mut buf, &profile.uuid);
            write_string(&mut buf, &profile.name);
            write_varint(&mut buf, profile.properties.len() as i32);
            for prop in &profile.properties {
                write_string(&mut buf, &prop.name);
                write_string(&mut buf, &prop.value);
                if let Some(ref sig) = prop.signature {
                    buf.put_u8(1);
                    write_string(&mut buf, sig);
                } else {
                    buf.put_u8(0);
                }
            }
        }
        _ => bail!("Cannot encode {:?} in Login phase", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

fn encode_configuration(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::RegistryData { registry_id, entries } => {
            write_varint(&mut buf, ids::CONFIG_REGISTRY_DATA);
            write_string(&mut buf, registry_id);
            write_varint(&mut buf, entries.len() as i32);
            for entry in entries {
                write_string(&mut buf, &entry.id);
                if let Some(ref nbt_data) = entry.data {
                    buf.put_u8(1);
                    let mut nbt_buf = BytesMut::new();
                    nbt_data.write_root_network(&mut nbt_buf);
                    buf.extend_from_slice(&nbt_buf);
                } else {
                    buf.put_u8(0);
                }
            }
        }
        InternalPacket::UpdateTags => {
            write_varint(&mut buf, ids::CONFIG_UPDATE_TAGS);
            write_varint(&mut buf, 0); // no tagged registries
        }
        InternalPacket::FinishConfiguration => {
            write_varint(&mut buf, ids::CONFIG_FINISH);
        }
        InternalPacket::KnownPacksRequest { packs } => {
            write_varint(&mut buf, ids::CONFIG_KNOWN_PACKS);
            write_varint(&mut buf, packs.len() as i32);
            for pack in packs {
                write_string(&mut buf, &pack.namespace);
                write_string(&mut buf, &pack.id);
                write_string(&mut buf, &pack.version);
            }
        }
        InternalPacket::Disconnect { reason } => {
            write_varint(&mut buf, ids::CONFIG_DISCONNECT);
            write_nbt_text(&mut buf, reason);
        }
        _ => bail!(
            "Cannot encode {:?} in Configuration phase",
            std::mem::discriminant(packet)
        ),
    }
    Ok(buf)
}

fn encode_play(packet: &InternalPacket) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    match packet {
        InternalPacket::JoinGame {
            entity_id,
            is_hardcore,
            dimension_names,
            max_players,
            view_distance,
            simulation_distance,
            reduced_debug_info,
            enable_respawn_screen,
            do_limited_crafting,
            dimension_type,
            dimension_name,
            hashed_seed,
            game_mode,
            previous_game_mode,
            is_debug,
            is_flat,
            death_location,
            portal_cooldown,
            sea_level,
            enforces_secure_chat,
        } => {
            write_varint(&mut buf, ids::PLAY_LOGIN);
            buf.put_i32(*entity_id);
            buf.put_u8(*is_hardcore as u8);
            write_varint(&mut buf, dimension_names.len() as i32);
            for dim in dimension_names {
                write_string(&mut buf, dim);
            }
            write_varint(&mut buf, *max_players);
            write_varint(&mut buf, *view_distance);
            write_varint(&mut buf, *simulation_distance);
            buf.put_u8(*reduced_debug_info as u8);
            buf.put_u8(*enable_respawn_screen as u8);
            buf.put_u8(*do_limited_crafting as u8);
            write_varint(&mut buf, *dimension_type);
            write_string(&mut buf, dimension_name);
            buf.put_i64(*hashed_seed);
            buf.put_u8(game_mode.id());
            buf.put_i8(*previous_game_mode);
            buf.put_u8(*is_debug as u8);
            buf.put_u8(*is_flat as u8);
            match death_location {
                Some((dimension, position)) => {
                    buf.put_u8(1);
                    write_string(&mut buf, dimension);
                    buf.put_u64(position.encode());
                }
                None => buf.put_u8(0),
            }
            write_varint(&mut buf, *portal_cooldown);
            write_varint(&mut buf, *sea_level);
            buf.put_u8(*enforces_secure_chat as u8);
        }
        InternalPacket::ChangeDifficulty { difficulty, locked } => {
            write_varint(&mut buf, ids::PLAY_CHANGE_DIFFICULTY);
            buf.put_u8(difficulty.id());
            buf.put_u8(*locked as u8);
        }
        InternalPacket::PlayerAbilities {
            flags,
            flying_speed,
            fov_modifier,
        } => {
            write_varint(&mut buf, ids::PLAY_ABILITIES);
            buf.put_u8(*flags);
            buf.put_f32(*flying_speed);
            buf.put_f32(*fov_modifier);
        }
        InternalPacket::SetHeldItem { slot } => {
            write_varint(&mut buf, ids::PLAY_SET_HELD_ITEM);
            buf.put_i8(*slot);
        }
        InternalPacket::SynchronizePlayerPosition {
            position,
            yaw,
            pitch,
            flags,
            teleport_id,
        } => {
            write_varint(&mut buf, ids::PLAY_SYNC_PLAYER_POS);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_u8(*flags);
            write_varint(&mut buf, *teleport_id);
        }
        InternalPacket::SetCenterChunk { chunk_x, chunk_z } => {
            write_varint(&mut buf, ids::PLAY_SET_CENTER_CHUNK);
            write_varint(&mut buf, *chunk_x);
            write_varint(&mut buf, *chunk_z);
        }
        InternalPacket::ChunkBatchStart => {
            write_varint(&mut buf, ids::PLAY_CHUNK_BATCH_START);
        }
        InternalPacket::ChunkBatchFinished { batch_size } => {
            write_varint(&mut buf, ids::PLAY_CHUNK_BATCH_FINISHED);
            write_varint(&mut buf, *batch_size);
        }
        InternalPacket::ChunkDataAndUpdateLight {
            chunk_x,
            chunk_z,
            heightmaps,
            data,
            block_entities,
            light_data,
        } => {
            write_varint(&mut buf, ids::PLAY_CHUNK_DATA);
            buf.put_i32(*chunk_x);
            buf.put_i32(*chunk_z);
            let mut nbt_buf = BytesMut::new();
            heightmaps.write_root_network(&mut nbt_buf);
            buf.extend_from_slice(&nbt_buf);
            write_varint(&mut buf, data.len() as i32);
            buf.extend_from_slice(data);
            write_varint(&mut buf, block_entities.len() as i32);
            for entity in block_entities {
                buf.put_u8(entity.packed_xz);
                buf.put_i16(entity.y);
                write_varint(&mut buf, entity.type_id);
                let mut entity_buf = BytesMut::new();
                entity.data.write_root_network(&mut entity_buf);
                buf.extend_from_slice(&entity_buf);
            }
            encode_light_data(&mut buf, light_data);
        }
        InternalPacket::UnloadChunk { chunk_x, chunk_z } => {
            write_varint(&mut buf, ids::PLAY_UNLOAD_CHUNK);
            // Unload Chunk is Z-then-X on the wire.
            buf.put_i32(*chunk_z);
            buf.put_i32(*chunk_x);
        }
        InternalPacket::SetDefaultSpawnPosition { position, angle } => {
            write_varint(&mut buf, ids::PLAY_SET_DEFAULT_SPAWN);
            buf.put_u64(position.encode());
            buf.put_f32(*angle);
        }
        InternalPacket::SetHealth {
            health,
            food,
            saturation,
        } => {
            write_varint(&mut buf, ids::PLAY_SET_HEALTH);
            buf.put_f32(*health);
            write_varint(&mut buf, *food);
            buf.put_f32(*saturation);
        }
        InternalPacket::SetExperience { bar, level, total } => {
            write_varint(&mut buf, ids::PLAY_SET_EXPERIENCE);
            buf.put_f32(*bar);
            write_varint(&mut buf, *level);
            write_varint(&mut buf, *total);
        }
        InternalPacket::UpdateTime {
            world_age,
            time_of_day,
        } => {
            write_varint(&mut buf, ids::PLAY_UPDATE_TIME);
            buf.put_i64(*world_age);
            buf.put_i64(*time_of_day);
        }
        InternalPacket::GameEvent { event, value } => {
            write_varint(&mut buf, ids::PLAY_GAME_EVENT);
            buf.put_u8(*event);
            buf.put_f32(*value);
        }
        InternalPacket::KeepAliveClientbound { id } => {
            write_varint(&mut buf, ids::PLAY_KEEP_ALIVE);
            buf.put_i64(*id);
        }
        InternalPacket::Disconnect { reason } => {
            write_varint(&mut buf, ids::PLAY_DISCONNECT);
            write_nbt_text(&mut buf, reason);
        }
        _ => bail!("Cannot encode {:?} in Play phase", std::mem::discriminant(packet)),
    }
    Ok(buf)
}

/// Disconnect reasons in Configuration and Play are NBT text components.
fn write_nbt_text(buf: &mut BytesMut, reason: &TextComponent) {
    let nbt = NbtValue::compound([("text", NbtValue::string(reason.text.clone()))]);
    let mut nbt_buf = BytesMut::new();
    nbt.write_root_network(&mut nbt_buf);
    buf.extend_from_slice(&nbt_buf);
}

fn encode_light_data(buf: &mut BytesMut, light: &ChunkLightData) {
    write_varint(buf, light.sky_light_mask.len() as i32);
    for v in &light.sky_light_mask {
        buf.put_i64(*v);
    }
    write_varint(buf, light.block_light_mask.len() as i32);
    for v in &light.block_light_mask {
        buf.put_i64(*v);
    }
    write_varint(buf, light.empty_sky_light_mask.len() as i32);
    for v in &light.empty_sky_light_mask {
        buf.put_i64(*v);
    }
    write_varint(buf, light.empty_block_light_mask.len() as i32);
    for v in &light.empty_block_light_mask {
        buf.put_i64(*v);
    }
    write_varint(buf, light.sky_light_arrays.len() as i32);
    for arr in &light.sky_light_arrays {
        write_varint(buf, arr.len() as i32);
        buf.extend_from_slice(arr);
    }
    write_varint(buf, light.block_light_arrays.len() as i32);
    for arr in &light.block_light_arrays {
        write_varint(buf, arr.len() as i32);
        buf.extend_from_slice(arr);
    }
}
