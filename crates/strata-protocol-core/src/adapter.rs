use crate::{InternalPacket, Phase};
use anyhow::Result;
use bytes::BytesMut;

/// Trait for version-specific protocol adapters.
/// Each supported protocol version implements this trait.
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol version number this adapter handles.
    fn protocol_version(&self) -> i32;

    /// Decode a raw packet body from wire format into an InternalPacket.
    /// Unknown (phase, id) pairs are an error; the router treats them as a
    /// protocol violation.
    fn decode_packet(&self, phase: Phase, id: i32, data: &mut BytesMut)
        -> Result<InternalPacket>;

    /// Encode an InternalPacket into wire format (packet id + payload,
    /// without the outer length prefix).
    fn encode_packet(&self, phase: Phase, packet: &InternalPacket) -> Result<BytesMut>;

    /// The registry data packets pushed during the Configuration phase.
    fn registry_data(&self) -> Vec<InternalPacket>;
}
