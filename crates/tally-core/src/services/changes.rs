//! Post-commit change notifications for UI refresh.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Tables a subscriber can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTable {
    Expenses,
    Categories,
    Preferences,
    SyncQueue,
    SyncMeta,
}

/// Handle returned by [`ChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(StoreTable) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    table: StoreTable,
    callback: Callback,
}

/// Registry of change callbacks.
///
/// Callbacks run on the thread that committed the mutation, after the store
/// lock has been released, so they may read from the store.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &count)
            .finish()
    }
}

impl ChangeNotifier {
    pub fn subscribe<F>(&self, table: StoreTable, callback: F) -> SubscriptionId
    where
        F: Fn(StoreTable) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                table,
                callback: Arc::new(callback),
            });
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    pub fn notify(&self, tables: &[StoreTable]) {
        let callbacks: Vec<(StoreTable, Callback)> = {
            let subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers
                .iter()
                .filter(|subscriber| tables.contains(&subscriber.table))
                .map(|subscriber| (subscriber.table, Arc::clone(&subscriber.callback)))
                .collect()
        };

        for (table, callback) in callbacks {
            callback(table);
        }
    }
}
