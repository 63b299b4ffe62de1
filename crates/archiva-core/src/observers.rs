//! Update notification registry.
//!
//! Collaborators register a handler with [`Observers::on_update`] and keep the
//! returned [`Subscription`] to unsubscribe later. A panicking handler is
//! logged and skipped; the remaining handlers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::models::RecordId;

/// What changed in the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateNotice {
    /// A pull or full sync replaced or removed local records.
    RecordsChanged { changed: usize },
    /// A single record was removed locally.
    RecordRemoved { id: RecordId },
    /// Reconciliation or lifecycle aggregation rewrote records.
    LifecyclesChanged { changed: usize },
    /// Advisory progress for a long-running operation changed.
    ProgressChanged { id: RecordId },
}

type Handler = Arc<dyn Fn(&UpdateNotice) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler)>>,
}

/// Cloneable handle to the observer registry.
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<Registry>,
}

/// Disposer returned by [`Observers::on_update`].
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Remove the handler. Safe to call after the registry is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for update notices.
    pub fn on_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UpdateNotice) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a notice to every handler. Returns how many completed normally.
    pub fn notify(&self, notice: &UpdateNotice) -> usize {
        // Snapshot so handlers may subscribe or unsubscribe while running
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(notice))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!("Update observer panicked while handling {notice:?}"),
            }
        }
        delivered
    }
}
