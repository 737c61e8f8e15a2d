use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::id_manager::IdManager;
use crate::player::Player;
use crate::router::Router;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use strata_protocol_v767::V767Adapter;
use strata_world::{BiomeRegistry, BlockRegistry, ChunkDecoder, ChunkQuery};
use tokio::sync::watch;
use tracing::{debug, info};

/// The long-lived server value. Owns the protocol adapter, registries,
/// world query, player tables and connection registry; every other
/// component holds a cheap `Arc` back to it.
pub struct ServerCore {
    pub config: ServerConfig,
    pub adapter: V767Adapter,
    pub router: Router,
    pub world: ChunkQuery,
    pub entity_ids: IdManager,
    /// Players between Login Start and the end of Configuration.
    temp_players: Mutex<HashMap<u64, Player>>,
    /// Players in the Play phase, keyed by connection id.
    players: Mutex<HashMap<u64, Player>>,
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    next_connection_id: AtomicU64,
    shutdown_flag: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl ServerCore {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let region_dir = PathBuf::from(&config.world_path).join("region");
        let decoder = ChunkDecoder::new(
            config.world_height,
            config.min_y,
            BlockRegistry::with_basic_blocks(),
            BiomeRegistry::with_basic_biomes(),
        );
        let world = ChunkQuery::new(
            region_dir,
            config.chunk_cache_size,
            config.world_height,
            config.min_y,
            decoder,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            config,
            adapter: V767Adapter::new(),
            router: Router::new(),
            world,
            entity_ids: IdManager::new(),
            temp_players: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            shutdown_flag: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    // === Shutdown ===

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Acquire)
    }

    pub fn begin_shutdown(&self) {
        info!("Shutting down");
        self.shutdown_flag.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }

    // === Connections ===

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_connection(&self, conn: Arc<Connection>) {
        let mut connections = self.connections.lock().expect("connections lock poisoned");
        connections.insert(conn.id, conn);
    }

    /// Drop all per-connection state. Called from the reactor when a socket
    /// closes.
    pub fn remove_connection(&self, conn_id: u64) {
        {
            let mut connections = self.connections.lock().expect("connections lock poisoned");
            connections.remove(&conn_id);
        }
        let temp = {
            let mut temp_players = self.temp_players.lock().expect("temp players lock poisoned");
            temp_players.remove(&conn_id)
        };
        let active = {
            let mut players = self.players.lock().expect("players lock poisoned");
            players.remove(&conn_id)
        };
        for player in temp.into_iter().chain(active) {
            info!(name = %player.profile.name, "Player disconnected");
            self.entity_ids.release(player.entity_id);
        }
        debug!(conn_id, "Connection removed");
    }

    pub fn connection_snapshot(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.lock().expect("connections lock poisoned");
        connections.values().cloned().collect()
    }

    // === Player tables ===

    pub fn player_count(&self) -> usize {
        let players = self.players.lock().expect("players lock poisoned");
        players.len()
    }

    pub fn add_temp_player(&self, conn_id: u64, player: Player) {
        let mut temp_players = self.temp_players.lock().expect("temp players lock poisoned");
        temp_players.insert(conn_id, player);
    }

    /// Move a player from the temporary to the active table. Locks are
    /// taken in a fixed order (temp, then active) so this can never
    /// deadlock against table readers.
    pub fn promote_temp_player(&self, conn_id: u64) -> bool {
        let mut temp_players = self.temp_players.lock().expect("temp players lock poisoned");
        let Some(player) = temp_players.remove(&conn_id) else {
            return false;
        };
        let mut players = self.players.lock().expect("players lock poisoned");
        players.insert(conn_id, player);
        true
    }

    pub fn with_temp_player<R>(
        &self,
        conn_id: u64,
        f: impl FnOnce(&mut Player) -> R,
    ) -> Option<R> {
        let mut temp_players = self.temp_players.lock().expect("temp players lock poisoned");
        temp_players.get_mut(&conn_id).map(f)
    }

    pub fn with_player<R>(&self, conn_id: u64, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        let mut players = self.players.lock().expect("players lock poisoned");
        players.get_mut(&conn_id).map(f)
    }

    /// Names and UUIDs of active players for the status sample.
    pub fn player_sample(&self) -> Vec<(String, String)> {
        let players = self.players.lock().expect("players lock poisoned");
        players
            .values()
            .map(|p| (p.profile.name.clone(), p.profile.uuid.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::offline_uuid;
    use strata_types::{GameProfile, Vec3d};

    fn test_core() -> Arc<ServerCore> {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            world_path: dir.path().to_string_lossy().into_owned(),
            ..ServerConfig::default()
        };
        // Leak the tempdir handle so the path outlives the core in tests.
        std::mem::forget(dir);
        ServerCore::new(config)
    }

    fn test_player(core: &ServerCore, name: &str) -> Player {
        let profile = GameProfile {
            uuid: offline_uuid(name),
            name: name.into(),
            properties: Vec::new(),
        };
        Player::new(core.entity_ids.allocate(), profile, Vec3d::new(0.5, 64.0, 0.5))
    }

    #[test]
    fn test_promote_temp_player() {
        let core = test_core();
        let player = test_player(&core, "Alice");
        core.add_temp_player(7, player);
        assert_eq!(core.player_count(), 0);

        assert!(core.promote_temp_player(7));
        assert_eq!(core.player_count(), 1);
        assert!(!core.promote_temp_player(7)); // already promoted

        let sample = core.player_sample();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].0, "Alice");
    }

    #[test]
    fn test_remove_connection_releases_entity_id() {
        let core = test_core();
        let player = test_player(&core, "Alice");
        let entity_id = player.entity_id;
        core.add_temp_player(3, player);
        core.promote_temp_player(3);

        core.remove_connection(3);
        assert_eq!(core.player_count(), 0);
        // The released entity id is reused.
        assert_eq!(core.entity_ids.allocate(), entity_id);
    }

    #[test]
    fn test_shutdown_flag() {
        let core = test_core();
        assert!(!core.is_shutting_down());
        let mut signal = core.shutdown_signal();
        core.begin_shutdown();
        assert!(core.is_shutting_down());
        assert!(*signal.borrow_and_update());
    }
}
