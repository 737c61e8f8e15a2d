use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::warn;

/// Allocates entity ids, reusing the smallest released id first.
#[derive(Debug, Default)]
pub struct IdManager {
    inner: Mutex<IdState>,
}

#[derive(Debug, Default)]
struct IdState {
    next_id: u32,
    freed: BTreeSet<u32>,
}

impl IdManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> u32 {
        let mut state = self.inner.lock().expect("id manager lock poisoned");
        if let Some(id) = state.freed.pop_first() {
            return id;
        }
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    pub fn release(&self, id: u32) {
        let mut state = self.inner.lock().expect("id manager lock poisoned");
        if id >= state.next_id {
            warn!(id, "Releasing an id that was never allocated");
            return;
        }
        if !state.freed.insert(id) {
            warn!(id, "Releasing an already-released id");
        }
    }

    pub fn allocated_count(&self) -> usize {
        let state = self.inner.lock().expect("id manager lock poisoned");
        state.next_id as usize - state.freed.len()
    }

    pub fn freed_count(&self) -> usize {
        let state = self.inner.lock().expect("id manager lock poisoned");
        state.freed.len()
    }

    pub fn reset(&self) {
        let mut state = self.inner.lock().expect("id manager lock poisoned");
        state.next_id = 0;
        state.freed.clear();
    }
}
