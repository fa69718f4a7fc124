use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::data::Sample;

/// Immutable oldest-to-newest view of a dataset's recent samples
pub type Window = Arc<[Sample]>;

/// Bounded per-dataset history of recent samples.
///
/// Readers always get a copy taken under the buffer's lock, so a concurrent
/// append is either fully visible or not at all.
#[derive(Debug)]
pub struct WindowStore {
    /// Buffers indexed by dataset ID
    windows: DashMap<String, Arc<RwLock<VecDeque<Sample>>>>,
    /// Max samples kept per dataset
    capacity: usize,
    appended: AtomicU64,
    rejected_stale: AtomicU64,
}

impl WindowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
            appended: AtomicU64::new(0),
            rejected_stale: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest when over capacity.
    ///
    /// Returns the window as it stands right after this append, or `None`
    /// when the sample is not newer than the latest one already held.
    pub fn append(&self, dataset_id: &str, sample: Sample) -> Option<Window> {
        let buffer = self.buffer(dataset_id);
        let mut samples = buffer.write();

        if let Some(last) = samples.back() {
            if sample.timestamp <= last.timestamp {
                self.rejected_stale.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
        self.appended.fetch_add(1, Ordering::Relaxed);

        Some(samples.iter().cloned().collect())
    }

    /// Snapshot of a dataset's window; empty if nothing was appended yet
    pub fn window(&self, dataset_id: &str) -> Window {
        match self.windows.get(dataset_id) {
            Some(buffer) => {
                let buffer = Arc::clone(&buffer);
                let samples = buffer.read();
                samples.iter().cloned().collect()
            }
            None => Arc::from(Vec::new()),
        }
    }

    /// Newest sample for a dataset
    pub fn latest(&self, dataset_id: &str) -> Option<Sample> {
        let buffer = self.windows.get(dataset_id).map(|b| Arc::clone(&b))?;
        let samples = buffer.read();
        samples.back().cloned()
    }

    /// Drop a dataset's history
    pub fn remove(&self, dataset_id: &str) -> bool {
        self.windows.remove(dataset_id).is_some()
    }

    /// List dataset IDs with history
    pub fn datasets(&self) -> Vec<String> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> WindowStats {
        let total_samples = self
            .windows
            .iter()
            .map(|e| e.value().read().len())
            .sum();

        WindowStats {
            datasets: self.windows.len(),
            total_samples,
            capacity: self.capacity,
            appended: self.appended.load(Ordering::Relaxed),
            rejected_stale: self.rejected_stale.load(Ordering::Relaxed),
        }
    }

    fn buffer(&self, dataset_id: &str) -> Arc<RwLock<VecDeque<Sample>>> {
        if let Some(buffer) = self.windows.get(dataset_id) {
            return Arc::clone(&buffer);
        }

        let entry = self
            .windows
            .entry(dataset_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(VecDeque::with_capacity(self.capacity))));
        Arc::clone(&entry)
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Window store statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct WindowStats {
    pub datasets: usize,
    pub total_samples: usize,
    pub capacity: usize,
    pub appended: u64,
    pub rejected_stale: u64,
}
