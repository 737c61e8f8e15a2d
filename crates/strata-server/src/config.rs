use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_players")]
    pub max_players: i32,
    #[serde(default = "default_view_distance")]
    pub view_distance: u8,
    #[serde(default = "default_world_height")]
    pub world_height: i32,
    #[serde(default = "default_min_y")]
    pub min_y: i32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_chunk_cache_size")]
    pub chunk_cache_size: usize,
    #[serde(default = "default_motd")]
    pub motd: String,
    #[serde(default = "default_version_name")]
    pub version_name: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: i32,
    #[serde(default = "default_world_path")]
    pub world_path: String,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_max_players() -> i32 {
    20
}

fn default_view_distance() -> u8 {
    8
}

fn default_world_height() -> i32 {
    384
}

fn default_min_y() -> i32 {
    -64
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_chunk_cache_size() -> usize {
    1024
}

fn default_motd() -> String {
    "A Strata Server".into()
}

fn default_version_name() -> String {
    "1.21.1".into()
}

fn default_protocol_version() -> i32 {
    767
}

fn default_world_path() -> String {
    "world".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_players: default_max_players(),
            view_distance: default_view_distance(),
            world_height: default_world_height(),
            min_y: default_min_y(),
            workers: default_workers(),
            chunk_cache_size: default_chunk_cache_size(),
            motd: default_motd(),
            version_name: default_version_name(),
            protocol_version: default_protocol_version(),
            world_path: default_world_path(),
        }
    }
}

impl ServerConfig {
    /// View distances outside 2..=32 are clamped, not rejected.
    pub const MIN_VIEW_DISTANCE: u8 = 2;
    pub const MAX_VIEW_DISTANCE: u8 = 32;

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ServerConfig>(&contents)?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };
        config.view_distance = Self::clamp_view_distance(config.view_distance);
        if config.workers == 0 {
            config.workers = 1;
        }
        Ok(config)
    }

    pub fn clamp_view_distance(view_distance: u8) -> u8 {
        view_distance.clamp(Self::MIN_VIEW_DISTANCE, Self::MAX_VIEW_DISTANCE)
    }
}
