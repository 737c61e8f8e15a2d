use crate::chunk::ChunkData;
use crate::decoder::ChunkDecoder;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use strata_region::RegionDir;
use tracing::{debug, info};

/// Advisory cache statistics.
#[derive(Debug, Clone, Default)]
pub struct QueryMetrics {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub batch_queries: u64,
    pub last_load_time: Duration,
    pub total_load_time: Duration,
}

impl QueryMetrics {
    pub fn average_load_time(&self) -> Duration {
        if self.cache_misses == 0 {
            Duration::ZERO
        } else {
            self.total_load_time / self.cache_misses as u32
        }
    }
}

struct QueryState {
    regions: RegionDir,
    cache: LruCache<(i32, i32), Arc<ChunkData>>,
    metrics: QueryMetrics,
}

/// Memoised chunk loading over a world's region directory.
///
/// `fetch_chunk` never fails: a missing region, an absent location entry,
/// or an undecodable payload all yield the empty chunk. Failed decodes are
/// never cached, so a repaired region file is picked up on the next fetch.
pub struct ChunkQuery {
    decoder: ChunkDecoder,
    world_height: i32,
    min_y: i32,
    state: Mutex<QueryState>,
}

impl ChunkQuery {
    pub fn new(
        region_dir: PathBuf,
        cache_capacity: usize,
        world_height: i32,
        min_y: i32,
        decoder: ChunkDecoder,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Self {
            decoder,
            world_height,
            min_y,
            state: Mutex::new(QueryState {
                regions: RegionDir::new(region_dir),
                cache: LruCache::new(capacity),
                metrics: QueryMetrics::default(),
            }),
        }
    }

    /// Fetch a chunk through the cache. Thread-safe for concurrent readers.
    pub fn fetch_chunk(&self, chunk_x: i32, chunk_z: i32) -> Arc<ChunkData> {
        let mut state = self.state.lock().expect("chunk query lock poisoned");
        self.fetch_locked(&mut state, chunk_x, chunk_z)
    }

    /// Fetch many chunks, grouped by region so each region file is opened
    /// at most once across the batch. Results are in input order.
    pub fn fetch_batch(&self, coords: &[(i32, i32)]) -> Vec<Arc<ChunkData>> {
        let mut state = self.state.lock().expect("chunk query lock poisoned");
        state.metrics.batch_queries += 1;

        let mut order: Vec<usize> = (0..coords.len()).collect();
        order.sort_by_key(|&i| {
            let (cx, cz) = coords[i];
            (cx >> 5, cz >> 5)
        });

        let mut results: Vec<Option<Arc<ChunkData>>> = vec![None; coords.len()];
        for i in order {
            let (cx, cz) = coords[i];
            results[i] = Some(self.fetch_locked(&mut state, cx, cz));
        }
        results.into_iter().map(|c| c.unwrap()).collect()
    }

    /// Warm the cache for the given coordinates.
    pub fn preload(&self, coords: &[(i32, i32)]) {
        let count = coords.len();
        let _ = self.fetch_batch(coords);
        debug!(count, "Preloaded chunks");
    }

    pub fn evict(&self, chunk_x: i32, chunk_z: i32) {
        let mut state = self.state.lock().expect("chunk query lock poisoned");
        state.cache.pop(&(chunk_x, chunk_z));
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().expect("chunk query lock poisoned");
        state.cache.clear();
    }

    pub fn is_cached(&self, chunk_x: i32, chunk_z: i32) -> bool {
        let state = self.state.lock().expect("chunk query lock poisoned");
        state.cache.contains(&(chunk_x, chunk_z))
    }

    pub fn cached_count(&self) -> usize {
        let state = self.state.lock().expect("chunk query lock poisoned");
        state.cache.len()
    }

    pub fn metrics(&self) -> QueryMetrics {
        let state = self.state.lock().expect("chunk query lock poisoned");
        state.metrics.clone()
    }

    fn fetch_locked(&self, state: &mut QueryState, chunk_x: i32, chunk_z: i32) -> Arc<ChunkData> {
        state.metrics.total_queries += 1;
        if let Some(chunk) = state.cache.get(&(chunk_x, chunk_z)) {
            state.metrics.cache_hits += 1;
            return chunk.clone();
        }
        state.metrics.cache_misses += 1;

        let start = Instant::now();
        let loaded = self.load_chunk(state, chunk_x, chunk_z);
        let elapsed = start.elapsed();
        state.metrics.last_load_time = elapsed;
        state.metrics.total_load_time += elapsed;

        match loaded {
            Ok(chunk) => {
                let chunk = Arc::new(chunk);
                state.cache.put((chunk_x, chunk_z), chunk.clone());
                chunk
            }
            // Not cached: the caller gets an empty chunk now, and a later
            // fetch retries the disk.
            Err(reason) => {
                info!(chunk_x, chunk_z, %reason, "Serving empty chunk");
                Arc::new(self.empty_chunk(chunk_x, chunk_z))
            }
        }
    }

    /// Read and decode one chunk. `Ok` results are cacheable (including
    /// legitimately absent chunks); `Err` carries a loggable reason.
    fn load_chunk(
        &self,
        state: &mut QueryState,
        chunk_x: i32,
        chunk_z: i32,
    ) -> Result<ChunkData, String> {
        let payload = state
            .regions
            .read_chunk(chunk_x, chunk_z)
            .map_err(|e| e.to_string())?;

        match payload {
            Some(nbt_bytes) => self
                .decoder
                .decode(&nbt_bytes, chunk_x, chunk_z)
                .map_err(|e| e.to_string()),
            None => {
                debug!(chunk_x, chunk_z, "No region data, generating empty chunk");
                Ok(self.empty_chunk(chunk_x, chunk_z))
            }
        }
    }

    fn empty_chunk(&self, chunk_x: i32, chunk_z: i32) -> ChunkData {
        ChunkData::empty(chunk_x, chunk_z, self.world_height, self.min_y)
    }
}
