use crate::handlers::encode_frame;
use crate::router::{HandlerAction, PacketContext};
use anyhow::bail;
use serde_json::json;
use strata_protocol_core::{InternalPacket, Phase, ProtocolAdapter};
use strata_protocol_v767::ids;
use tracing::debug;

/// Status Request: answer with the server-list JSON.
pub fn handle_status_request(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let config = &ctx.core.config;
    let sample: Vec<_> = ctx
        .core
        .player_sample()
        .into_iter()
        .map(|(name, id)| json!({ "name": name, "id": id }))
        .collect();

    let json = json!({
        "version": {
            "name": config.version_name,
            "protocol": config.protocol_version,
        },
        "players": {
            "max": config.max_players,
            "online": ctx.core.player_count(),
            "sample": sample,
        },
        "description": {
            "text": config.motd,
        },
    })
    .to_string();

    let frame = encode_frame(ctx.core, Phase::Status, &InternalPacket::StatusResponse { json })?;
    Ok(HandlerAction::Send(vec![frame]))
}

/// Ping: echo the payload back, then close.
pub fn handle_ping(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Status, ids::PING_REQUEST, ctx.body)?;
    let InternalPacket::PingRequest { payload } = packet else {
        bail!("Expected ping request");
    };
    debug!(peer = %ctx.conn.peer, payload, "Ping");

    let frame = encode_frame(ctx.core, Phase::Status, &InternalPacket::PongResponse { payload })?;
    Ok(HandlerAction::Disconnect(vec![frame]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::core::ServerCore;
    use crate::ServerConfig;
    use bytes::{BufMut, BytesMut};
    use std::sync::Arc;
    use strata_protocol_core::{extract_frame, read_string, read_varint};

    fn test_core() -> Arc<ServerCore> {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            motd: "A Strata Server".into(),
            world_path: dir.path().to_string_lossy().into_owned(),
            ..ServerConfig::default()
        };
        std::mem::forget(dir);
        ServerCore::new(config)
    }

    #[test]
    fn test_status_response_json() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Status);
        let mut body = BytesMut::new();

        let action = handle_status_request(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        let HandlerAction::Send(frames) = action else {
            panic!("expected Send");
        };
        assert_eq!(frames.len(), 1);

        let mut buf = frames[0].clone();
        let mut frame = extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(read_varint(&mut frame).unwrap(), 0x00);
        let json = read_string(&mut frame, 32767).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"]["name"], "1.21.1");
        assert_eq!(value["version"]["protocol"], 767);
        assert_eq!(value["players"]["max"], 20);
        assert_eq!(value["players"]["online"], 0);
        assert_eq!(value["players"]["sample"], serde_json::json!([]));
        assert_eq!(value["description"]["text"], "A Strata Server");
    }

    #[test]
    fn test_ping_echo_and_close() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        conn.set_phase(Phase::Status);
        let mut body = BytesMut::new();
        body.put_i64(0x2A);

        let action = handle_ping(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        let HandlerAction::Disconnect(frames) = action else {
            panic!("expected Disconnect");
        };
        // The whole pong frame, byte for byte.
        assert_eq!(
            frames[0].to_vec(),
            vec![0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A]
        );
    }
}
