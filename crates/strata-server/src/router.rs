use crate::connection::Connection;
use crate::core::ServerCore;
use crate::handlers;
use bytes::BytesMut;
use std::collections::HashMap;
use std::sync::Arc;
use strata_protocol_core::Phase;
use strata_protocol_v767::ids;

/// What a handler decided. Frames are fully length-prefixed and are
/// enqueued by the worker in order, atomically per handler invocation.
pub enum HandlerAction {
    /// Nothing to send.
    None,
    /// Enqueue these frames.
    Send(Vec<BytesMut>),
    /// Enqueue these frames (possibly none), then tear the connection down.
    Disconnect(Vec<BytesMut>),
}

/// Context handed to a handler: the packet body after the id VarInt, the
/// connection being served, and the server for side effects.
pub struct PacketContext<'a> {
    pub body: &'a mut BytesMut,
    pub conn: &'a Arc<Connection>,
    pub core: &'a Arc<ServerCore>,
}

pub type HandlerFn = fn(&mut PacketContext) -> anyhow::Result<HandlerAction>;

/// Constant `(phase, packet id) -> handler` dispatch table, populated once
/// at startup and read-only afterwards. A lookup miss is a protocol
/// violation: the connection is closed, never silently ignored.
pub struct Router {
    table: HashMap<(Phase, i32), HandlerFn>,
}

impl Router {
    pub fn new() -> Self {
        let mut table: HashMap<(Phase, i32), HandlerFn> = HashMap::new();

        table.insert(
            (Phase::Handshake, ids::HANDSHAKE),
            handlers::handshake::handle_handshake,
        );

        table.insert(
            (Phase::Status, ids::STATUS_REQUEST),
            handlers::status::handle_status_request,
        );
        table.insert((Phase::Status, ids::PING_REQUEST), handlers::status::handle_ping);

        table.insert(
            (Phase::Login, ids::LOGIN_START),
            handlers::login::handle_login_start,
        );
        table.insert(
            (Phase::Login, ids::LOGIN_ACKNOWLEDGED),
            handlers::login::handle_login_acknowledged,
        );

        table.insert(
            (Phase::Configuration, ids::CONFIG_CLIENT_INFORMATION),
            handlers::configuration::handle_client_information,
        );
        table.insert(
            (Phase::Configuration, ids::CONFIG_PLUGIN_MESSAGE),
            handlers::configuration::handle_plugin_message,
        );
        table.insert(
            (Phase::Configuration, ids::CONFIG_KNOWN_PACKS_RESPONSE),
            handlers::configuration::handle_known_packs_response,
        );
        table.insert(
            (Phase::Configuration, ids::CONFIG_FINISH_ACK),
            handlers::configuration::handle_finish_ack,
        );

        table.insert(
            (Phase::Play, ids::PLAY_CONFIRM_TELEPORT),
            handlers::play::handle_confirm_teleportation,
        );
        table.insert(
            (Phase::Play, ids::PLAY_CHUNK_BATCH_RECEIVED),
            handlers::play::handle_chunk_batch_received,
        );
        table.insert(
            (Phase::Play, ids::PLAY_KEEP_ALIVE_SB),
            handlers::play::handle_keep_alive,
        );
        table.insert(
            (Phase::Play, ids::PLAY_POSITION),
            handlers::play::handle_player_position,
        );
        table.insert(
            (Phase::Play, ids::PLAY_POSITION_ROTATION),
            handlers::play::handle_player_position_rotation,
        );
        table.insert(
            (Phase::Play, ids::PLAY_ROTATION),
            handlers::play::handle_player_rotation,
        );
        table.insert(
            (Phase::Play, ids::PLAY_ON_GROUND),
            handlers::play::handle_player_on_ground,
        );

        Self { table }
    }

    pub fn lookup(&self, phase: Phase, packet_id: i32) -> Option<HandlerFn> {
        self.table.get(&(phase, packet_id)).copied()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_routes() {
        let router = Router::new();
        assert!(router.lookup(Phase::Handshake, 0x00).is_some());
        assert!(router.lookup(Phase::Status, 0x00).is_some());
        assert!(router.lookup(Phase::Status, 0x01).is_some());
        assert!(router.lookup(Phase::Login, 0x00).is_some());
        assert!(router.lookup(Phase::Configuration, 0x03).is_some());
        assert!(router.lookup(Phase::Play, 0x1A).is_some());
    }

    #[test]
    fn test_unknown_routes_miss() {
        let router = Router::new();
        // A valid id in the wrong phase is still a miss.
        assert!(router.lookup(Phase::Status, 0x03).is_none());
        assert!(router.lookup(Phase::Handshake, 0x01).is_none());
        assert!(router.lookup(Phase::Play, 0x7F).is_none());
        // Nothing routes once the connection is disconnecting.
        assert!(router.lookup(Phase::Disconnecting, 0x00).is_none());
    }
}
