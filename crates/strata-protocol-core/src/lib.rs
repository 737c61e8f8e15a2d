pub mod codec;
pub mod framing;
pub mod state;
pub mod packets;
pub mod adapter;

pub use adapter::*;
pub use codec::*;
pub use framing::*;
pub use packets::*;
pub use state::*;
