use crate::core::ServerCore;
use crate::handlers::encode_frame;
use crate::router::{HandlerAction, PacketContext};
use anyhow::{anyhow, bail};
use bytes::BytesMut;
use strata_protocol_core::{ChunkLightData, InternalPacket, Phase, ProtocolAdapter};
use strata_protocol_v767::ids;
use strata_types::{BlockPos, Difficulty, GameMode};
use strata_world::ChunkData;
use tracing::{debug, trace};

use super::login::SPAWN_POSITION;

/// Abilities byte for a creative player: invulnerable, fly-allowed,
/// creative instant-break.
const ABILITIES_FLAGS: u8 = 0x01 | 0x04 | 0x08;
const FLYING_SPEED: f32 = 0.05;
const FOV_MODIFIER: f32 = 0.1;
const SEA_LEVEL: i32 = 63;
const SPAWN_BLOCK: BlockPos = BlockPos { x: 0, y: 64, z: 0 };

/// Frames in the spawn burst besides the chunk packets themselves.
pub const SPAWN_SEQUENCE_FRAMES: usize = 13;

/// The ordered burst a client receives on entering Play: Join Game,
/// difficulty, abilities, held item, position sync, chunk center, the
/// bracketed chunk batch, spawn point, health, experience, time, and the
/// "start waiting for chunks" game event.
pub fn spawn_frames(core: &ServerCore, conn_id: u64) -> anyhow::Result<Vec<BytesMut>> {
    let (entity_id, view_distance) = core
        .with_player(conn_id, |player| {
            (player.entity_id, effective_view_distance(core, player.config.as_ref()))
        })
        .ok_or_else(|| anyhow!("No active player for connection {}", conn_id))?;
    let config = &core.config;

    let mut frames = Vec::new();
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::JoinGame {
            entity_id: entity_id as i32,
            is_hardcore: false,
            dimension_names: vec!["minecraft:overworld".into()],
            max_players: config.max_players,
            view_distance: view_distance as i32,
            simulation_distance: view_distance as i32,
            reduced_debug_info: false,
            enable_respawn_screen: true,
            do_limited_crafting: false,
            dimension_type: 0,
            dimension_name: "minecraft:overworld".into(),
            hashed_seed: 0,
            game_mode: GameMode::Creative,
            previous_game_mode: -1,
            is_debug: false,
            is_flat: false,
            death_location: None,
            portal_cooldown: 0,
            sea_level: SEA_LEVEL,
            enforces_secure_chat: false,
        },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::ChangeDifficulty {
            difficulty: Difficulty::Normal,
            locked: true,
        },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::PlayerAbilities {
            flags: ABILITIES_FLAGS,
            flying_speed: FLYING_SPEED,
            fov_modifier: FOV_MODIFIER,
        },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SetHeldItem { slot: 0 },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SynchronizePlayerPosition {
            position: SPAWN_POSITION,
            yaw: 0.0,
            pitch: 0.0,
            flags: 0,
            teleport_id: 1,
        },
    )?);

    let center_x = (SPAWN_POSITION.x.floor() as i32) >> 4;
    let center_z = (SPAWN_POSITION.z.floor() as i32) >> 4;
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SetCenterChunk {
            chunk_x: center_x,
            chunk_z: center_z,
        },
    )?);

    let view = view_distance as i32;
    let mut coords = Vec::new();
    for cx in (center_x - view)..=(center_x + view) {
        for cz in (center_z - view)..=(center_z + view) {
            coords.push((cx, cz));
        }
    }
    frames.push(encode_frame(core, Phase::Play, &InternalPacket::ChunkBatchStart)?);
    for chunk in core.world.fetch_batch(&coords) {
        frames.push(encode_frame(core, Phase::Play, &chunk_packet(&chunk))?);
    }
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::ChunkBatchFinished {
            batch_size: coords.len() as i32,
        },
    )?);

    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SetDefaultSpawnPosition {
            position: SPAWN_BLOCK,
            angle: 0.0,
        },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SetHealth {
            health: 20.0,
            food: 20,
            saturation: 5.0,
        },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SetExperience {
            bar: 0.0,
            level: 0,
            total: 0,
        },
    )?);
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::UpdateTime {
            world_age: 0,
            time_of_day: 1000,
        },
    )?);
    // Game event 13: start waiting for level chunks.
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::GameEvent {
            event: 13,
            value: 0.0,
        },
    )?);

    Ok(frames)
}

/// Build the Level Chunk with Light packet for a decoded chunk.
pub fn chunk_packet(chunk: &ChunkData) -> InternalPacket {
    InternalPacket::ChunkDataAndUpdateLight {
        chunk_x: chunk.chunk_x,
        chunk_z: chunk.chunk_z,
        heightmaps: chunk.heightmaps_nbt(),
        data: chunk.serialize_sections(),
        block_entities: chunk.block_entities_packet_data(),
        light_data: ChunkLightData::full_sky(chunk.section_count()),
    }
}

/// The keep-alive frame the liveness loop sends every 15 seconds.
pub fn keepalive_frame(core: &ServerCore, id: i64) -> anyhow::Result<BytesMut> {
    encode_frame(core, Phase::Play, &InternalPacket::KeepAliveClientbound { id })
}

fn effective_view_distance(core: &ServerCore, config: Option<&crate::player::PlayerConfig>) -> u8 {
    let server = core.config.view_distance;
    config
        .map(|c| c.view_distance.min(server))
        .unwrap_or(server)
}

// === Serverbound handlers ===

pub fn handle_confirm_teleportation(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_CONFIRM_TELEPORT, ctx.body)?;
    if let InternalPacket::ConfirmTeleportation { teleport_id } = packet {
        debug!(teleport_id, "Teleport confirmed");
    }
    Ok(HandlerAction::None)
}

pub fn handle_chunk_batch_received(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_CHUNK_BATCH_RECEIVED, ctx.body)?;
    if let InternalPacket::ChunkBatchReceived { chunks_per_tick } = packet {
        trace!(chunks_per_tick, "Chunk batch received");
    }
    Ok(HandlerAction::None)
}

pub fn handle_keep_alive(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_KEEP_ALIVE_SB, ctx.body)?;
    let InternalPacket::KeepAliveServerbound { id } = packet else {
        bail!("Expected keep alive");
    };
    ctx.core.with_player(ctx.conn.id, |player| {
        if player.pending_keepalive == Some(id) {
            player.pending_keepalive = None;
            player.last_keepalive = std::time::Instant::now();
        }
    });
    Ok(HandlerAction::None)
}

pub fn handle_player_position(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_POSITION, ctx.body)?;
    let InternalPacket::PlayerPosition { x, y, z, on_ground } = packet else {
        bail!("Expected player position");
    };
    ctx.core
        .with_player(ctx.conn.id, |player| player.update_position(x, y, z, on_ground));
    chunk_crossing(ctx.core, ctx.conn.id)
}

pub fn handle_player_position_rotation(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_POSITION_ROTATION, ctx.body)?;
    let InternalPacket::PlayerPositionAndRotation {
        x,
        y,
        z,
        yaw,
        pitch,
        on_ground,
    } = packet
    else {
        bail!("Expected player position and rotation");
    };
    ctx.core.with_player(ctx.conn.id, |player| {
        player.update_position(x, y, z, on_ground);
        player.update_rotation(yaw, pitch, on_ground);
    });
    chunk_crossing(ctx.core, ctx.conn.id)
}

pub fn handle_player_rotation(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_ROTATION, ctx.body)?;
    let InternalPacket::PlayerRotation {
        yaw,
        pitch,
        on_ground,
    } = packet
    else {
        bail!("Expected player rotation");
    };
    ctx.core
        .with_player(ctx.conn.id, |player| player.update_rotation(yaw, pitch, on_ground));
    Ok(HandlerAction::None)
}

pub fn handle_player_on_ground(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Play, ids::PLAY_ON_GROUND, ctx.body)?;
    if let InternalPacket::PlayerOnGround { on_ground } = packet {
        ctx.core
            .with_player(ctx.conn.id, |player| player.on_ground = on_ground);
    }
    Ok(HandlerAction::None)
}

/// When the player crosses a chunk border: re-center, unload chunks that
/// fell out of range, and stream the newly-in-range ring as a batch.
fn chunk_crossing(core: &ServerCore, conn_id: u64) -> anyhow::Result<HandlerAction> {
    let crossing = core
        .with_player(conn_id, |player| {
            let current = player.current_chunk();
            if current.x == player.chunk_x && current.z == player.chunk_z {
                return None;
            }
            let old = (player.chunk_x, player.chunk_z);
            player.chunk_x = current.x;
            player.chunk_z = current.z;
            Some((
                old,
                (current.x, current.z),
                effective_view_distance(core, player.config.as_ref()) as i32,
            ))
        })
        .flatten();

    let Some(((old_x, old_z), (new_x, new_z), view)) = crossing else {
        return Ok(HandlerAction::None);
    };
    debug!(old_x, old_z, new_x, new_z, "Player crossed chunk border");

    let mut frames = Vec::new();
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::SetCenterChunk {
            chunk_x: new_x,
            chunk_z: new_z,
        },
    )?);

    for cx in (old_x - view)..=(old_x + view) {
        for cz in (old_z - view)..=(old_z + view) {
            if (cx - new_x).abs() > view || (cz - new_z).abs() > view {
                frames.push(encode_frame(
                    core,
                    Phase::Play,
                    &InternalPacket::UnloadChunk {
                        chunk_x: cx,
                        chunk_z: cz,
                    },
                )?);
            }
        }
    }

    let mut coords = Vec::new();
    for cx in (new_x - view)..=(new_x + view) {
        for cz in (new_z - view)..=(new_z + view) {
            if (cx - old_x).abs() > view || (cz - old_z).abs() > view {
                coords.push((cx, cz));
            }
        }
    }
    frames.push(encode_frame(core, Phase::Play, &InternalPacket::ChunkBatchStart)?);
    for chunk in core.world.fetch_batch(&coords) {
        frames.push(encode_frame(core, Phase::Play, &chunk_packet(&chunk))?);
    }
    frames.push(encode_frame(
        core,
        Phase::Play,
        &InternalPacket::ChunkBatchFinished {
            batch_size: coords.len() as i32,
        },
    )?);

    Ok(HandlerAction::Send(frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::player::{offline_uuid, Player};
    use crate::ServerConfig;
    use bytes::{Buf, BufMut};
    use std::sync::Arc;
    use strata_protocol_core::{extract_frame, read_varint};
    use strata_types::{GameProfile, Vec3d};

    fn test_core(view_distance: u8) -> Arc<ServerCore> {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            view_distance,
            world_path: dir.path().to_string_lossy().into_owned(),
            ..ServerConfig::default()
        };
        std::mem::forget(dir);
        ServerCore::new(config)
    }

    fn active_player(core: &ServerCore, conn_id: u64, name: &str) {
        let profile = GameProfile {
            uuid: offline_uuid(name),
            name: name.into(),
            properties: Vec::new(),
        };
        core.add_temp_player(
            conn_id,
            Player::new(core.entity_ids.allocate(), profile, SPAWN_POSITION),
        );
        core.promote_temp_player(conn_id);
    }

    fn frame_ids(frames: &[BytesMut]) -> Vec<i32> {
        frames
            .iter()
            .map(|f| {
                let mut buf = f.clone();
                let mut frame = extract_frame(&mut buf).unwrap().unwrap();
                read_varint(&mut frame).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_spawn_sequence_order() {
        let core = test_core(2);
        active_player(&core, 1, "Alice");
        let frames = spawn_frames(&core, 1).unwrap();

        let chunk_count = 5 * 5;
        assert_eq!(frames.len(), SPAWN_SEQUENCE_FRAMES + chunk_count);

        let ids = frame_ids(&frames);
        let mut expected = vec![
            ids::PLAY_LOGIN,
            ids::PLAY_CHANGE_DIFFICULTY,
            ids::PLAY_ABILITIES,
            ids::PLAY_SET_HELD_ITEM,
            ids::PLAY_SYNC_PLAYER_POS,
            ids::PLAY_SET_CENTER_CHUNK,
            ids::PLAY_CHUNK_BATCH_START,
        ];
        expected.extend(std::iter::repeat(ids::PLAY_CHUNK_DATA).take(chunk_count));
        expected.extend([
            ids::PLAY_CHUNK_BATCH_FINISHED,
            ids::PLAY_SET_DEFAULT_SPAWN,
            ids::PLAY_SET_HEALTH,
            ids::PLAY_SET_EXPERIENCE,
            ids::PLAY_UPDATE_TIME,
            ids::PLAY_GAME_EVENT,
        ]);
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_abilities_flags() {
        let core = test_core(2);
        active_player(&core, 1, "Alice");
        let frames = spawn_frames(&core, 1).unwrap();
        // Abilities is the third frame: id, then the flags byte.
        let mut buf = frames[2].clone();
        let mut frame = extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(read_varint(&mut frame).unwrap(), ids::PLAY_ABILITIES);
        assert_eq!(frame.get_u8(), 0x0D);
    }

    #[test]
    fn test_empty_chunk_packet_shape() {
        let chunk = ChunkData::empty(0, 0, 384, -64);
        let packet = chunk_packet(&chunk);
        let InternalPacket::ChunkDataAndUpdateLight {
            data,
            block_entities,
            light_data,
            ..
        } = packet
        else {
            panic!("expected chunk packet");
        };
        // 24 sections, 6 bytes each when fully empty.
        assert_eq!(data.len(), 24 * 6);
        assert!(block_entities.is_empty());
        assert_eq!(light_data.sky_light_mask, vec![0x3FF_FFFF]);
        assert_eq!(light_data.sky_light_arrays.len(), 26);
    }

    #[test]
    fn test_keep_alive_ack() {
        let core = test_core(2);
        active_player(&core, 1, "Alice");
        core.with_player(1, |p| p.pending_keepalive = Some(99));

        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Play);
        let mut body = BytesMut::new();
        body.put_i64(99);
        handle_keep_alive(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert_eq!(core.with_player(1, |p| p.pending_keepalive).unwrap(), None);
    }

    #[test]
    fn test_movement_without_crossing() {
        let core = test_core(2);
        active_player(&core, 1, "Alice");
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Play);

        let mut body = BytesMut::new();
        body.put_f64(3.0);
        body.put_f64(64.0);
        body.put_f64(3.0);
        body.put_u8(1);
        let action = handle_player_position(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert!(matches!(action, HandlerAction::None));
        assert_eq!(core.with_player(1, |p| p.position.x).unwrap(), 3.0);
    }

    #[test]
    fn test_chunk_border_crossing_streams_ring() {
        let core = test_core(2);
        active_player(&core, 1, "Alice");
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Play);

        // One chunk east: x 0.5 -> 17.0 crosses from chunk 0 to chunk 1.
        let mut body = BytesMut::new();
        body.put_f64(17.0);
        body.put_f64(64.0);
        body.put_f64(0.5);
        body.put_u8(1);
        let action = handle_player_position(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        let HandlerAction::Send(frames) = action else {
            panic!("expected Send");
        };

        let ids_seen = frame_ids(&frames);
        assert_eq!(ids_seen[0], ids::PLAY_SET_CENTER_CHUNK);
        // Moving one chunk along x: a 5-wide column unloads, one loads.
        let unloads = ids_seen.iter().filter(|&&i| i == ids::PLAY_UNLOAD_CHUNK).count();
        let loads = ids_seen.iter().filter(|&&i| i == ids::PLAY_CHUNK_DATA).count();
        assert_eq!(unloads, 5);
        assert_eq!(loads, 5);
        assert_eq!(*ids_seen.last().unwrap(), ids::PLAY_CHUNK_BATCH_FINISHED);
        assert_eq!(core.with_player(1, |p| p.chunk_x).unwrap(), 1);
    }
}
