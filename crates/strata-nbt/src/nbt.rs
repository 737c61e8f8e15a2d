use bytes::{BufMut, BytesMut};

/// NBT tag types as they appear in the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TagType {
    pub fn from_id(id: u8) -> Option<TagType> {
        Some(match id {
            0 => TagType::End,
            1 => TagType::Byte,
            2 => TagType::Short,
            3 => TagType::Int,
            4 => TagType::Long,
            5 => TagType::Float,
            6 => TagType::Double,
            7 => TagType::ByteArray,
            8 => TagType::String,
            9 => TagType::List,
            10 => TagType::Compound,
            11 => TagType::IntArray,
            12 => TagType::LongArray,
            _ => return None,
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

/// An NBT value. Compounds keep insertion order; names are unique within
/// a compound.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<NbtValue>),
    Compound(Vec<(String, NbtValue)>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtValue {
    /// Build a compound from name/value pairs, e.g. a section's
    /// `block_states` or a registry entry payload.
    pub fn compound<K>(entries: impl IntoIterator<Item = (K, NbtValue)>) -> Self
    where
        K: Into<String>,
    {
        NbtValue::Compound(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Build a homogeneous list, e.g. a chunk's `sections` or a palette.
    pub fn list(items: impl IntoIterator<Item = NbtValue>) -> Self {
        NbtValue::List(items.into_iter().collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        NbtValue::String(s.into())
    }

    pub fn tag_type(&self) -> TagType {
        match self {
            NbtValue::Byte(_) => TagType::Byte,
            NbtValue::Short(_) => TagType::Short,
            NbtValue::Int(_) => TagType::Int,
            NbtValue::Long(_) => TagType::Long,
            NbtValue::Float(_) => TagType::Float,
            NbtValue::Double(_) => TagType::Double,
            NbtValue::ByteArray(_) => TagType::ByteArray,
            NbtValue::String(_) => TagType::String,
            NbtValue::List(_) => TagType::List,
            NbtValue::Compound(_) => TagType::Compound,
            NbtValue::IntArray(_) => TagType::IntArray,
            NbtValue::LongArray(_) => TagType::LongArray,
        }
    }

    /// Look up an entry by name in a compound. Returns None for non-compounds.
    pub fn get(&self, name: &str) -> Option<&NbtValue> {
        match self {
            NbtValue::Compound(entries) => entries
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self {
            NbtValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NbtValue::Byte(v) => Some(*v as i64),
            NbtValue::Short(v) => Some(*v as i64),
            NbtValue::Int(v) => Some(*v as i64),
            NbtValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NbtValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[NbtValue]> {
        match self {
            NbtValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long_array(&self) -> Option<&[i64]> {
        match self {
            NbtValue::LongArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&[i8]> {
        match self {
            NbtValue::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    /// Write as a name-less network root (1.20.2+ packet payloads:
    /// heightmaps, registry entries, text components, block entities).
    pub fn write_root_network(&self, buf: &mut BytesMut) {
        NbtWriter::new(buf).root(None, self);
    }

    /// Write as a named root (file layout, as region chunks are stored).
    pub fn write_root_named(&self, name: &str, buf: &mut BytesMut) {
        NbtWriter::new(buf).root(Some(name), self);
    }
}

/// Streams a tag tree into the binary layout. The two root flavours share
/// one path: a root is a tag header whose name the network variant omits.
pub struct NbtWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> NbtWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    pub fn root(&mut self, name: Option<&str>, value: &NbtValue) {
        self.buf.put_u8(value.tag_type().id());
        if let Some(name) = name {
            self.string_payload(name);
        }
        self.value(value);
    }

    fn value(&mut self, value: &NbtValue) {
        match value {
            NbtValue::Byte(v) => self.buf.put_i8(*v),
            NbtValue::Short(v) => self.buf.put_i16(*v),
            NbtValue::Int(v) => self.buf.put_i32(*v),
            NbtValue::Long(v) => self.buf.put_i64(*v),
            NbtValue::Float(v) => self.buf.put_f32(*v),
            NbtValue::Double(v) => self.buf.put_f64(*v),
            NbtValue::ByteArray(bytes) => {
                self.array_len(bytes.len());
                for b in bytes {
                    self.buf.put_i8(*b);
                }
            }
            NbtValue::String(s) => self.string_payload(s),
            NbtValue::List(items) => {
                // An empty list is typed End; otherwise the first element
                // fixes the type for all of them.
                let element = items.first().map(NbtValue::tag_type).unwrap_or(TagType::End);
                self.buf.put_u8(element.id());
                self.array_len(items.len());
                for item in items {
                    self.value(item);
                }
            }
            NbtValue::Compound(entries) => {
                for (name, entry) in entries {
                    self.buf.put_u8(entry.tag_type().id());
                    self.string_payload(name);
                    self.value(entry);
                }
                self.buf.put_u8(TagType::End.id());
            }
            NbtValue::IntArray(values) => {
                self.array_len(values.len());
                for v in values {
                    self.buf.put_i32(*v);
                }
            }
            NbtValue::LongArray(values) => {
                self.array_len(values.len());
                for v in values {
                    self.buf.put_i64(*v);
                }
            }
        }
    }

    fn array_len(&mut self, len: usize) {
        self.buf.put_i32(len as i32);
    }

    fn string_payload(&mut self, s: &str) {
        self.buf.put_u16(s.as_bytes().len() as u16);
        self.buf.put_slice(s.as_bytes());
    }
}
