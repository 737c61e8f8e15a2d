mod region_file;

pub use region_file::{RegionDir, RegionError, RegionFile};
