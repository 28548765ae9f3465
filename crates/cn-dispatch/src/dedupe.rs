use indexmap::IndexSet;
use parking_lot::Mutex;

/// Bounded insertion-ordered set of recently dispatched message ids.
///
/// When full, inserting a new id evicts the oldest. The window is
/// per-process; a restart forgets it.
pub struct DedupeWindow {
    capacity: usize,
    seen: Mutex<IndexSet<String>>,
}

impl DedupeWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "dedupe window capacity must be non-zero");
        Self {
            capacity,
            seen: Mutex::new(IndexSet::with_capacity(capacity)),
        }
    }

    /// Record an id. Returns `false` if it was already in the window.
    pub fn insert(&self, id: &str) -> bool {
        let mut seen = self.seen.lock();
        if !seen.insert(id.to_string()) {
            return false;
        }
        if seen.len() > self.capacity {
            seen.shift_remove_index(0);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
