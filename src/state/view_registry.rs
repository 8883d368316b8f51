//! Live polling activations, one per view key.
//! Request-driven views start on first use and are evicted least recently
//! used first. Pinned views are never evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::health::HealthState;
use crate::poller::Activation;
use crate::state::explorer_store::{ExplorerStore, ViewKey};

struct LiveView {
    activation: Activation,
    last_access: Instant,
    pinned: bool,
}

pub struct ViewRegistry {
    views: Mutex<HashMap<ViewKey, LiveView>>,
    /// Cap on unpinned views
    capacity: usize,
    store: Arc<ExplorerStore>,
    health: Arc<HealthState>,
}

impl ViewRegistry {
    pub fn new(capacity: usize, store: Arc<ExplorerStore>, health: Arc<HealthState>) -> Self {
        Self {
            views: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            store,
            health,
        }
    }

    /// Register a view that lives for the whole process.
    pub fn pin(&self, key: ViewKey, activation: Activation) {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        views.insert(
            key,
            LiveView {
                activation,
                last_access: Instant::now(),
                pinned: true,
            },
        );
        self.health.set_live_views(views.len());
    }

    /// Mark `key` as accessed, starting an activation if none is running.
    /// A view whose activation already finished (budget spent or stopped) gets
    /// a fresh one with a full budget. Returns true when `start` was called.
    pub fn touch_or_start(&self, key: &ViewKey, start: impl FnOnce() -> Activation) -> bool {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        let mut pinned = false;
        if let Some(view) = views.get_mut(key) {
            view.last_access = now;
            if !view.activation.is_finished() {
                return false;
            }
            pinned = view.pinned;
            debug!(view = %key, "Restarting finished view");
        } else if views.values().filter(|v| !v.pinned).count() >= self.capacity {
            let oldest = views
                .iter()
                .filter(|(_, v)| !v.pinned)
                .min_by_key(|(_, v)| v.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                // Dropping the activation cancels it.
                views.remove(&oldest);
                self.store.remove(&oldest);
                info!(view = %oldest, "Evicted least recently used view");
            }
        }

        views.insert(
            key.clone(),
            LiveView {
                activation: start(),
                last_access: now,
                pinned,
            },
        );
        self.health.set_live_views(views.len());
        true
    }
}

#[cfg(test)]
impl ViewRegistry {
    fn is_pinned(&self, key: &ViewKey) -> bool {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|v| v.pinned)
    }

    fn contains(&self, key: &ViewKey) -> bool {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn len(&self) -> usize {
        self.views.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
