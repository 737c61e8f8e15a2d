use crate::config::ServerConfig;
use crate::handlers::{disconnect_frames, play};
use crate::player::PlayerConfig;
use crate::router::{HandlerAction, PacketContext};
use anyhow::bail;
use strata_protocol_core::{InternalPacket, Phase, ProtocolAdapter};
use strata_protocol_v767::ids;
use tracing::{debug, info};

/// Client Information: record the peer's settings on its staged player.
pub fn handle_client_information(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx.core.adapter.decode_packet(
        Phase::Configuration,
        ids::CONFIG_CLIENT_INFORMATION,
        ctx.body,
    )?;
    let InternalPacket::ClientInformation {
        locale,
        view_distance,
        chat_mode,
        chat_colors,
        skin_parts,
        main_hand,
        text_filtering,
        allow_listing,
    } = packet
    else {
        bail!("Expected Client Information");
    };
    debug!(locale, view_distance, "Client information");

    let config = PlayerConfig {
        locale,
        view_distance: ServerConfig::clamp_view_distance(view_distance.max(0) as u8),
        chat_mode,
        chat_colors,
        skin_parts,
        main_hand,
        text_filtering,
        allow_listing,
    };
    ctx.core
        .with_temp_player(ctx.conn.id, |player| player.config = Some(config));
    Ok(HandlerAction::None)
}

pub fn handle_plugin_message(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx.core.adapter.decode_packet(
        Phase::Configuration,
        ids::CONFIG_PLUGIN_MESSAGE,
        ctx.body,
    )?;
    if let InternalPacket::PluginMessage { channel, data } = packet {
        debug!(channel, len = data.len(), "Plugin message");
    }
    Ok(HandlerAction::None)
}

pub fn handle_known_packs_response(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    let packet = ctx.core.adapter.decode_packet(
        Phase::Configuration,
        ids::CONFIG_KNOWN_PACKS_RESPONSE,
        ctx.body,
    )?;
    if let InternalPacket::KnownPacksResponse { packs } = packet {
        debug!(count = packs.len(), "Client known packs");
    }
    Ok(HandlerAction::None)
}

/// Acknowledge Finish Configuration: promote the staged player and stream
/// the whole entry-into-play burst.
pub fn handle_finish_ack(ctx: &mut PacketContext) -> anyhow::Result<HandlerAction> {
    if !ctx.core.promote_temp_player(ctx.conn.id) {
        return Ok(HandlerAction::Disconnect(disconnect_frames(
            ctx.core,
            Phase::Configuration,
            "Configuration out of order",
        )));
    }
    ctx.conn.set_phase(Phase::Play);

    let name = ctx
        .core
        .with_player(ctx.conn.id, |player| player.profile.name.clone())
        .unwrap_or_default();
    info!(name = %name, "Configuration finished, entering play");

    let frames = play::spawn_frames(ctx.core, ctx.conn.id)?;
    Ok(HandlerAction::Send(frames))
}
