use crate::handlers::{disconnect_frames, encode_frame};
use crate::player::{offline_uuid, Player};
use crate::router::{HandlerAction, PacketContext};
use anyhow::bail;
use strata_protocol_core::{InternalPacket, Phase, ProtocolAdapter};
use strata_protocol_v767::ids;
use strata_types::{GameProfile, Vec3d};
use tracing::{debug, info};

/// Where new players appear; chunk streaming is centered here too.
pub const SPAWN_POSITION: Vec3d = Vec3d {
    x: 0.5,
    y: 64.0,
    z: 0.5,
};

/// Login Start: derive the offline profile, stage a temporary player, and
/// answer with Login Success.
pub fn handle_login_start(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Login, ids::LOGIN_START, ctx.body)?;
    let InternalPacket::LoginStart { name, uuid } = packet else {
        bail!("Expected Login Start");
    };
    debug!(peer = %ctx.conn.peer, name, client_uuid = %uuid, "Login Start");

    if name.is_empty() || name.len() > 16 {
        return Ok(HandlerAction::Disconnect(disconnect_frames(
            ctx.core,
            Phase::Login,
            "Invalid username",
        )));
    }
    if ctx.core.player_count() >= ctx.core.config.max_players as usize {
        return Ok(HandlerAction::Disconnect(disconnect_frames(
            ctx.core,
            Phase::Login,
            "Server is full",
        )));
    }

    // Offline mode only: the client-sent UUID is ignored.
    let profile = GameProfile {
        uuid: offline_uuid(&name),
        name,
        properties: Vec::new(),
    };
    info!(name = %profile.name, uuid = %profile.uuid, "Player logging in");

    let player = Player::new(ctx.core.entity_ids.allocate(), profile.clone(), SPAWN_POSITION);
    ctx.core.add_temp_player(ctx.conn.id, player);

    let frame = encode_frame(ctx.core, Phase::Login, &InternalPacket::LoginSuccess { profile })?;
    Ok(HandlerAction::Send(vec![frame]))
}

/// Login Acknowledged: move to Configuration and push the whole
/// configuration burst (known packs, registries, tags, finish).
pub fn handle_login_acknowledged(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let name = ctx
        .core
        .with_temp_player(ctx.conn.id, |player| player.profile.name.clone());
    let Some(name) = name else {
        // Acknowledged without a preceding Login Start.
        return Ok(HandlerAction::Disconnect(disconnect_frames(
            ctx.core,
            Phase::Login,
            "Login out of order",
        )));
    };
    debug!(name = %name, "Login acknowledged, entering configuration");
    ctx.conn.set_phase(Phase::Configuration);

    let mut frames = Vec::new();
    frames.push(encode_frame(
        ctx.core,
        Phase::Configuration,
        &InternalPacket::KnownPacksRequest {
            packs: vec![strata_protocol_core::KnownPack {
                namespace: "minecraft".into(),
                id: "core".into(),
                version: "1.21".into(),
            }],
        },
    )?);
    for registry_packet in ctx.core.adapter.registry_data() {
        frames.push(encode_frame(ctx.core, Phase::Configuration, &registry_packet)?);
    }
    frames.push(encode_frame(
        ctx.core,
        Phase::Configuration,
        &InternalPacket::UpdateTags,
    )?);
    frames.push(encode_frame(
        ctx.core,
        Phase::Configuration,
        &InternalPacket::FinishConfiguration,
    )?);
    Ok(HandlerAction::Send(frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::core::ServerCore;
    use crate::ServerConfig;
    use bytes::BytesMut;
    use std::sync::Arc;
    use strata_protocol_core::{
        extract_frame, read_string, read_uuid, read_varint, write_string, write_uuid,
    };
    use uuid::Uuid;

    fn test_core() -> Arc<ServerCore> {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            world_path: dir.path().to_string_lossy().into_owned(),
            ..ServerConfig::default()
        };
        std::mem::forget(dir);
        ServerCore::new(config)
    }

    fn login_start_body(name: &str) -> BytesMut {
        let mut body = BytesMut::new();
        write_string(&mut body, name);
        write_uuid(&mut body, &Uuid::from_u128(0));
        body
    }

    #[test]
    fn test_login_start_derives_offline_uuid() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Login);
        let mut body = login_start_body("Alice");

        let action = handle_login_start(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        let HandlerAction::Send(frames) = action else {
            panic!("expected Send");
        };

        let mut buf = frames[0].clone();
        let mut frame = extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(read_varint(&mut frame).unwrap(), 0x02); // Login Success
        let uuid = read_uuid(&mut frame).unwrap();
        assert_eq!(uuid, offline_uuid("Alice"));
        assert_eq!(uuid.as_bytes()[6] >> 4, 3);
        assert_eq!(read_string(&mut frame, 16).unwrap(), "Alice");
        assert_eq!(read_varint(&mut frame).unwrap(), 0); // properties

        // The player is staged, not yet active.
        assert_eq!(core.player_count(), 0);
        assert!(core
            .with_temp_player(1, |p| p.profile.name.clone())
            .is_some());
    }

    #[test]
    fn test_login_start_rejects_long_name() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Login);
        let mut body = login_start_body("seventeen_chars_x");

        let action = handle_login_start(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert!(matches!(action, HandlerAction::Disconnect(_)));
    }

    #[test]
    fn test_login_acknowledged_pushes_configuration() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Login);
        let mut body = login_start_body("Alice");
        handle_login_start(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();

        let mut body = BytesMut::new();
        let action = handle_login_acknowledged(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert_eq!(conn.phase(), Phase::Configuration);

        let HandlerAction::Send(frames) = action else {
            panic!("expected Send");
        };
        // Known Packs + one Registry Data per registry + Update Tags + Finish.
        let registry_count = core.adapter.registry_data().len();
        assert_eq!(frames.len(), registry_count + 3);

        let ids: Vec<i32> = frames
            .iter()
            .map(|f| {
                let mut buf = f.clone();
                let mut frame = extract_frame(&mut buf).unwrap().unwrap();
                read_varint(&mut frame).unwrap()
            })
            .collect();
        assert_eq!(ids[0], 0x0E); // Known Packs
        assert!(ids[1..=registry_count].iter().all(|&id| id == 0x07));
        assert_eq!(ids[registry_count + 1], 0x0D); // Update Tags
        assert_eq!(ids[registry_count + 2], 0x03); // Finish Configuration
    }

    #[test]
    fn test_acknowledged_without_start_disconnects() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Login);
        let mut body = BytesMut::new();
        let action = handle_login_acknowledged(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert!(matches!(action, HandlerAction::Disconnect(_)));
    }
}
