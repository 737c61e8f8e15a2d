use crate::nbt::{NbtValue, TagType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("unexpected end of NBT data")]
    UnexpectedEof,
    #[error("root tag must be a compound, got type {0}")]
    RootNotCompound(u8),
    #[error("unknown tag type {0}")]
    UnknownTagType(u8),
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("invalid UTF-8 in string tag")]
    InvalidUtf8,
}

type NbtResult<T> = Result<T, NbtError>;

/// Parse a named root tag (file layout: type byte, u16 name length, name,
/// compound payload). The root must be a compound.
pub fn parse_root(data: &[u8]) -> NbtResult<(String, NbtValue)> {
    let mut cursor = data;
    let root_id = read_u8(&mut cursor)?;
    if root_id != TagType::Compound.id() {
        return Err(NbtError::RootNotCompound(root_id));
    }
    let name = read_name(&mut cursor)?;
    let value = read_payload(&mut cursor, TagType::Compound)?;
    Ok((name, value))
}

fn read_u8(cursor: &mut &[u8]) -> NbtResult<u8> {
    let (&byte, rest) = cursor.split_first().ok_or(NbtError::UnexpectedEof)?;
    *cursor = rest;
    Ok(byte)
}

fn read_slice<'a>(cursor: &mut &'a [u8], len: usize) -> NbtResult<&'a [u8]> {
    if cursor.len() < len {
        return Err(NbtError::UnexpectedEof);
    }
    let (head, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(head)
}

fn read_i16(cursor: &mut &[u8]) -> NbtResult<i16> {
    let bytes = read_slice(cursor, 2)?;
    Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_i32(cursor: &mut &[u8]) -> NbtResult<i32> {
    let bytes = read_slice(cursor, 4)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_i64(cursor: &mut &[u8]) -> NbtResult<i64> {
    let bytes = read_slice(cursor, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(i64::from_be_bytes(raw))
}

fn read_name(cursor: &mut &[u8]) -> NbtResult<String> {
    let len = read_i16(cursor)? as u16 as usize;
    let bytes = read_slice(cursor, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| NbtError::InvalidUtf8)
}

/// Validate an i32 array length, rejecting negatives.
fn checked_len(len: i32) -> NbtResult<usize> {
    if len < 0 {
        return Err(NbtError::NegativeLength(len));
    }
    Ok(len as usize)
}

fn read_payload(cursor: &mut &[u8], tag: TagType) -> NbtResult<NbtValue> {
    match tag {
        // End is a terminator, never a value.
        TagType::End => Err(NbtError::UnknownTagType(TagType::End.id())),
        TagType::Byte => Ok(NbtValue::Byte(read_u8(cursor)? as i8)),
        TagType::Short => Ok(NbtValue::Short(read_i16(cursor)?)),
        TagType::Int => Ok(NbtValue::Int(read_i32(cursor)?)),
        TagType::Long => Ok(NbtValue::Long(read_i64(cursor)?)),
        TagType::Float => Ok(NbtValue::Float(f32::from_bits(read_i32(cursor)? as u32))),
        TagType::Double => Ok(NbtValue::Double(f64::from_bits(read_i64(cursor)? as u64))),
        TagType::ByteArray => {
            let len = checked_len(read_i32(cursor)?)?;
            let bytes = read_slice(cursor, len)?;
            Ok(NbtValue::ByteArray(bytes.iter().map(|&b| b as i8).collect()))
        }
        TagType::String => Ok(NbtValue::String(read_name(cursor)?)),
        TagType::List => {
            let element_id = read_u8(cursor)?;
            let len = read_i32(cursor)?;
            // A non-positive length is an empty list regardless of the
            // element type byte.
            if len <= 0 {
                return Ok(NbtValue::List(Vec::new()));
            }
            let element =
                TagType::from_id(element_id).ok_or(NbtError::UnknownTagType(element_id))?;
            let len = len as usize;
            let mut items = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                items.push(read_payload(cursor, element)?);
            }
            Ok(NbtValue::List(items))
        }
        TagType::Compound => {
            let mut entries = Vec::new();
            loop {
                let entry_id = read_u8(cursor)?;
                if entry_id == TagType::End.id() {
                    return Ok(NbtValue::Compound(entries));
                }
                let entry_type =
                    TagType::from_id(entry_id).ok_or(NbtError::UnknownTagType(entry_id))?;
                let name = read_name(cursor)?;
                let value = read_payload(cursor, entry_type)?;
                entries.push((name, value));
            }
        }
        TagType::IntArray => {
            let len = checked_len(read_i32(cursor)?)?;
            let mut values = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                values.push(read_i32(cursor)?);
            }
            Ok(NbtValue::IntArray(values))
        }
        TagType::LongArray => {
            let len = checked_len(read_i32(cursor)?)?;
            let mut values = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                values.push(read_i64(cursor)?);
            }
            Ok(NbtValue::LongArray(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn roundtrip(value: &NbtValue) -> NbtValue {
        let mut buf = BytesMut::new();
        value.write_root_named("", &mut buf);
        let (name, parsed) = parse_root(&buf).unwrap();
        assert!(name.is_empty());
        parsed
    }

    #[test]
    fn test_roundtrip_scalars() {
        let nbt = NbtValue::compound([
            ("byte", NbtValue::Byte(-1)),
            ("short", NbtValue::Short(300)),
            ("int", NbtValue::Int(-70000)),
            ("long", NbtValue::Long(1 << 40)),
            ("float", NbtValue::Float(0.5)),
            ("double", NbtValue::Double(-2.25)),
            ("str", NbtValue::string("hello")),
        ]);
        assert_eq!(roundtrip(&nbt), nbt);
    }

    #[test]
    fn test_roundtrip_nested() {
        let nbt = NbtValue::compound([
            (
                "sections",
                NbtValue::list([
                    NbtValue::compound([
                        ("Y", NbtValue::Byte(-4)),
                        ("data", NbtValue::LongArray(vec![1, -1, 42])),
                    ]),
                    NbtValue::compound([
                        ("Y", NbtValue::Byte(-3)),
                        ("SkyLight", NbtValue::ByteArray(vec![0x11; 16])),
                    ]),
                ]),
            ),
            ("ints", NbtValue::IntArray(vec![-1, 0, 1])),
        ]);
        assert_eq!(roundtrip(&nbt), nbt);
    }

    #[test]
    fn test_root_must_be_compound() {
        // TAG_Int root with empty name and payload 0.
        let data = [TagType::Int.id(), 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            parse_root(&data),
            Err(NbtError::RootNotCompound(3))
        ));
    }

    #[test]
    fn test_negative_array_length_rejected() {
        let mut buf = BytesMut::new();
        // Root compound containing an int array with length -1.
        buf.extend_from_slice(&[TagType::Compound.id(), 0, 0]);
        buf.extend_from_slice(&[TagType::IntArray.id(), 0, 3]);
        buf.extend_from_slice(b"bad");
        buf.extend_from_slice(&(-1i32).to_be_bytes());
        buf.extend_from_slice(&[TagType::End.id()]);
        assert!(matches!(
            parse_root(&buf),
            Err(NbtError::NegativeLength(-1))
        ));
    }

    #[test]
    fn test_negative_list_length_is_empty() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[TagType::Compound.id(), 0, 0]);
        buf.extend_from_slice(&[TagType::List.id(), 0, 4]);
        buf.extend_from_slice(b"list");
        buf.put_u8(TagType::Int.id());
        buf.extend_from_slice(&(-5i32).to_be_bytes());
        buf.extend_from_slice(&[TagType::End.id()]);
        let (_, parsed) = parse_root(&buf).unwrap();
        assert_eq!(parsed.get("list"), Some(&NbtValue::List(Vec::new())));
    }

    #[test]
    fn test_unknown_tag_type_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[TagType::Compound.id(), 0, 0]);
        buf.extend_from_slice(&[13, 0, 1, b'x']);
        assert!(matches!(
            parse_root(&buf),
            Err(NbtError::UnknownTagType(13))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let nbt = NbtValue::compound([("x", NbtValue::Long(7))]);
        let mut buf = BytesMut::new();
        nbt.write_root_named("", &mut buf);
        let truncated = &buf[..buf.len() - 3];
        assert!(matches!(parse_root(truncated), Err(NbtError::UnexpectedEof)));
    }

    #[test]
    fn test_named_root() {
        let nbt = NbtValue::compound([("v", NbtValue::Int(9))]);
        let mut buf = BytesMut::new();
        nbt.write_root_named("Level", &mut buf);
        let (name, parsed) = parse_root(&buf).unwrap();
        assert_eq!(name, "Level");
        assert_eq!(parsed, nbt);
    }
}
