mod nbt;
mod parser;

pub use nbt::*;
pub use parser::{parse_root, NbtError};
