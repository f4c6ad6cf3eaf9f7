use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Per-endpoint call counters.
///
/// Each session (and each store's write side) owns its own instance, so
/// independent sessions in one process never share positions in a fixture
/// sequence. The map is guarded by a single mutex per instance; advancing
/// must be atomic per endpoint to keep resolution order deterministic when
/// callers overlap.
#[derive(Debug, Default)]
pub struct CallCounters {
    counts: Mutex<HashMap<String, usize>>,
}

impl CallCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the endpoint to its next index and returns it. An endpoint
    /// that has never been advanced lands on index 0.
    pub fn advance(&self, endpoint: &str) -> usize {
        let mut counts = self.lock();
        let next = counts.get(endpoint).map_or(0, |count| count + 1);
        counts.insert(endpoint.to_owned(), next);
        next
    }

    /// Pins the endpoint back to index 0.
    pub fn reset(&self, endpoint: &str) -> usize {
        self.lock().insert(endpoint.to_owned(), 0);
        0
    }

    /// The index the endpoint currently sits on, if it was ever advanced.
    pub fn current(&self, endpoint: &str) -> Option<usize> {
        self.lock().get(endpoint).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
