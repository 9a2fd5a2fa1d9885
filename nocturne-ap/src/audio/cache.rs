//! Decoded buffer cache
//!
//! One entry per source identifier for the lifetime of the graph. Each entry
//! is an async once-cell: the first caller runs the load, concurrent callers
//! for the same identifier wait on the same cell and receive the same `Arc`.
//! A failed load leaves the cell empty and the entry is dropped, so a later
//! call retries.

use crate::audio::loader::BufferLoader;
use crate::audio::types::DecodedBuffer;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type Slot = Arc<OnceCell<Arc<DecodedBuffer>>>;

#[derive(Default)]
pub struct BufferCache {
    entries: Mutex<HashMap<String, Slot>>,
    loads: AtomicUsize,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached buffer for `source_id`, loading it on first use
    pub async fn get_or_load(
        &self,
        source_id: &str,
        sample_rate: u32,
        loader: &dyn BufferLoader,
    ) -> Result<Arc<DecodedBuffer>> {
        let slot = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(source_id.to_string()).or_default())
        };

        let result = slot
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                debug!("Cache miss for '{}', loading", source_id);
                loader.load(source_id, sample_rate).await.map(Arc::new)
            })
            .await
            .map(Arc::clone);

        if let Err(e) = &result {
            warn!("Load of '{}' failed: {}", source_id, e);
            let mut entries = self.entries.lock();
            // Only drop the slot we used; a retry may already have replaced it
            if entries
                .get(source_id)
                .is_some_and(|current| Arc::ptr_eq(current, &slot) && !slot.initialized())
            {
                entries.remove(source_id);
            }
        }

        result
    }

    /// Number of fully loaded buffers
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of loader invocations so far (hits excluded)
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
