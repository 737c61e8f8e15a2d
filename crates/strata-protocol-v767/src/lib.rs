mod adapter;
mod registries;

pub use adapter::{ids, V767Adapter};
pub use registries::build_registry_packets;
