pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

use crate::core::ServerCore;
use bytes::BytesMut;
use strata_protocol_core::{frame_body, InternalPacket, Phase, ProtocolAdapter};
use strata_types::TextComponent;

/// Encode an internal packet for the given phase and wrap it in a length
/// prefix, ready for the outbound queue.
pub fn encode_frame(
    core: &ServerCore,
    phase: Phase,
    packet: &InternalPacket,
) -> anyhow::Result<BytesMut> {
    let body = core.adapter.encode_packet(phase, packet)?;
    Ok(frame_body(&body))
}

/// The frames sent before closing a misbehaving connection: a formal
/// Disconnect packet where the phase has one, nothing otherwise.
pub fn disconnect_frames(core: &ServerCore, phase: Phase, reason: &str) -> Vec<BytesMut> {
    if !phase.supports_disconnect_packet() {
        return Vec::new();
    }
    let packet = InternalPacket::Disconnect {
        reason: TextComponent::plain(reason),
    };
    match encode_frame(core, phase, &packet) {
        Ok(frame) => vec![frame],
        Err(_) => Vec::new(),
    }
}
