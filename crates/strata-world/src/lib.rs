mod chunk;
mod decoder;
mod heightmap;
mod paletted;
mod query;
mod registry;

pub use chunk::{BlockEntity, ChunkData, ChunkSection};
pub use decoder::{ChunkDecoder, ChunkError};
pub use heightmap::{HeightMap, HeightmapKind};
pub use paletted::{Encoding, PalettedContainer};
pub use query::{ChunkQuery, QueryMetrics};
pub use registry::{BiomeRegistry, BlockRegistry};
