//! In-flight operation registry
//!
//! Maps a key to the shared future of the one operation currently producing
//! its value. The first caller for a key starts the work on a spawned task;
//! every later caller attaches to the same future until it resolves.
//!
//! The table entry is removed when the task ends, however it ends, and
//! before the result is handed to waiters. A caller retrying after a failure
//! therefore always starts a fresh attempt.

use crate::error::{FetchError, FetchResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Shared handle on the result of an in-flight operation
pub type Pending<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

struct Slot<V> {
    pending: Pending<V>,
    waiters: usize,
}

type Table<K, V> = Arc<Mutex<HashMap<K, Slot<V>>>>;

/// Synchronized table of in-flight operations keyed by `K`
pub struct InFlight<K, V> {
    table: Table<K, V>,
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the operation running for `key`, or start one with `start`
    ///
    /// `start` is only called when no operation is running for the key. The
    /// future it returns is driven on its own task, so it runs to completion
    /// even if every caller stops waiting.
    pub fn get_or_start<F, Fut>(&self, key: K, start: F) -> Pending<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let (tx, pending) = {
            let mut table = self.table.lock();
            if let Some(slot) = table.get_mut(&key) {
                slot.waiters += 1;
                debug!("Attached to in-flight {:?} ({} waiters)", key, slot.waiters);
                return slot.pending.clone();
            }

            let (tx, rx) = oneshot::channel::<FetchResult<V>>();
            let label = format!("{:?}", key);
            let pending: Pending<V> = async move {
                rx.await
                    .unwrap_or_else(|_| Err(FetchError::Cancelled { key: label }))
            }
            .boxed()
            .shared();

            table.insert(
                key.clone(),
                Slot {
                    pending: pending.clone(),
                    waiters: 1,
                },
            );
            (tx, pending)
        };

        // Created before `start` runs so a panicking `start` still clears the slot.
        let registration = Registration {
            table: Arc::clone(&self.table),
            key: Some(key),
        };
        let work = start();

        tokio::spawn(async move {
            let result = work.await;
            drop(registration);
            // Nobody waiting is fine; the work still populated the cache.
            let _ = tx.send(result);
        });

        pending
    }

    /// Number of operations currently running
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of callers attached to the operation for `key`
    pub fn waiters(&self, key: &K) -> Option<usize> {
        self.table.lock().get(key).map(|slot| slot.waiters)
    }
}

/// Removes a key from the table when dropped
struct Registration<K: Eq + Hash, V> {
    table: Table<K, V>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> Drop for Registration<K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.table.lock().remove(&key);
        }
    }
}
