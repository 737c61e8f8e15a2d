use crate::codec::{read_varint, write_varint, CodecError};
use bytes::{Buf, BytesMut};
use tracing::trace;

/// Try to split one complete frame out of the inbound accumulator.
///
/// A frame on the wire is `VarInt length` followed by `length` bytes
/// (packet id + payload). Returns `Ok(None)` while the accumulator holds
/// only a partial frame; the returned body still carries its leading
/// packet-id VarInt.
pub fn extract_frame(read_buf: &mut BytesMut) -> Result<Option<BytesMut>, CodecError> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = read_buf.clone();
    let length = match read_varint(&mut peek) {
        Ok(len) if len >= 0 => len as usize,
        Ok(_) => return Err(CodecError::VarIntTooBig),
        Err(CodecError::NotEnoughData) => return Ok(None),
        Err(e) => return Err(e),
    };

    let varint_bytes = read_buf.len() - peek.len();

    if peek.remaining() < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let frame = read_buf.split_to(length);
    trace!("Framed inbound packet, {} bytes", frame.len());
    Ok(Some(frame))
}

/// Build a complete outbound frame: length prefix, packet id, payload.
pub fn frame_packet(packet_id: i32, payload: &[u8]) -> BytesMut {
    let mut body = BytesMut::new();
    write_varint(&mut body, packet_id);
    body.extend_from_slice(payload);
    frame_body(&body)
}

/// Length-prefix an already-encoded packet body (id + payload).
pub fn frame_body(body: &[u8]) -> BytesMut {
    let mut frame = BytesMut::new();
    write_varint(&mut frame, body.len() as i32);
    frame.extend_from_slice(body);
    frame
}
