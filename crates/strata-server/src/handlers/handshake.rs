use crate::router::{HandlerAction, PacketContext};
use anyhow::bail;
use strata_protocol_core::{InternalPacket, Phase, ProtocolAdapter};
use strata_protocol_v767::ids;
use tracing::{debug, warn};

/// The only packet Handshake accepts. Carries the peer's protocol version
/// and the phase it wants next (Status or Login).
pub fn handle_handshake(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx
        .core
        .adapter
        .decode_packet(Phase::Handshake, ids::HANDSHAKE, ctx.body)?;
    let InternalPacket::Handshake {
        protocol_version,
        server_address,
        next_state,
        ..
    } = packet
    else {
        bail!("Expected handshake packet");
    };

    debug!(
        peer = %ctx.conn.peer,
        protocol_version,
        server_address,
        next_state,
        "Handshake"
    );

    if protocol_version != ctx.core.adapter.protocol_version() {
        warn!(
            peer = %ctx.conn.peer,
            protocol_version,
            expected = ctx.core.adapter.protocol_version(),
            "Client protocol version mismatch"
        );
    }

    match Phase::from_handshake_next(next_state) {
        Some(next) => {
            ctx.conn.set_phase(next);
            Ok(HandlerAction::None)
        }
        None => {
            warn!(peer = %ctx.conn.peer, next_state, "Invalid handshake next state");
            Ok(HandlerAction::Disconnect(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::core::ServerCore;
    use crate::ServerConfig;
    use bytes::{BufMut, BytesMut};
    use std::sync::Arc;
    use strata_protocol_core::{write_string, write_varint};

    fn test_core() -> Arc<ServerCore> {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            world_path: dir.path().to_string_lossy().into_owned(),
            ..ServerConfig::default()
        };
        std::mem::forget(dir);
        ServerCore::new(config)
    }

    fn handshake_body(protocol: i32, next: i32) -> BytesMut {
        let mut body = BytesMut::new();
        write_varint(&mut body, protocol);
        write_string(&mut body, "localhost");
        body.put_u16(25565);
        write_varint(&mut body, next);
        body
    }

    #[test]
    fn test_next_status() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        let mut body = handshake_body(767, 1);
        let action = handle_handshake(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert!(matches!(action, HandlerAction::None));
        assert_eq!(conn.phase(), Phase::Status);
    }

    #[test]
    fn test_next_login() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        let mut body = handshake_body(767, 2);
        handle_handshake(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert_eq!(conn.phase(), Phase::Login);
    }

    #[test]
    fn test_bad_next_state_disconnects() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        let mut body = handshake_body(767, 9);
        let action = handle_handshake(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .unwrap();
        assert!(matches!(action, HandlerAction::Disconnect(frames) if frames.is_empty()));
        assert_eq!(conn.phase(), Phase::Handshake);
    }

    #[test]
    fn test_truncated_handshake_errors() {
        let core = test_core();
        let conn = Arc::new(Connection::new_dummy(1));
        let mut body = BytesMut::new();
        write_varint(&mut body, 767);
        assert!(handle_handshake(&mut PacketContext {
            body: &mut body,
            conn: &conn,
            core: &core,
        })
        .is_err());
    }
}
