//! Fan-out of cache snapshots to registered callbacks.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};

use crate::models::appointment::AppointmentSnapshot;

pub type SnapshotCallback = Arc<dyn Fn(Arc<AppointmentSnapshot>) + Send + Sync + 'static>;

/// Ordered by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

thread_local! {
    static DELIVERING: Cell<Option<SubscriptionHandle>> = const { Cell::new(None) };
}

struct Subscriber {
    callback: SnapshotCallback,
    closed: AtomicBool,
    // Held for the duration of each invocation.
    delivery: Mutex<()>,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionHandle, Arc<Subscriber>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<Entries>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: SnapshotCallback) -> SubscriptionHandle {
        let mut entries = lock(&self.entries);
        entries.next_id += 1;
        let handle = SubscriptionHandle(entries.next_id);
        entries.subscribers.insert(
            handle,
            Arc::new(Subscriber {
                callback,
                closed: AtomicBool::new(false),
                delivery: Mutex::new(()),
            }),
        );
        debug!(handle = handle.0, "subscriber registered");
        handle
    }

    /// Once this returns the callback is not invoked again. Unknown handles
    /// are ignored.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let removed = lock(&self.entries).subscribers.remove(&handle);
        let Some(subscriber) = removed else {
            return;
        };

        subscriber.closed.store(true, Ordering::SeqCst);
        if DELIVERING.with(|d| d.get()) != Some(handle) {
            drop(lock(&subscriber.delivery));
        }
        debug!(handle = handle.0, "subscriber removed");
    }

    pub fn notify_all(&self, snapshot: Arc<AppointmentSnapshot>) {
        let targets: Vec<_> = lock(&self.entries)
            .subscribers
            .iter()
            .map(|(handle, subscriber)| (*handle, Arc::clone(subscriber)))
            .collect();

        for (handle, subscriber) in targets {
            let _delivery = lock(&subscriber.delivery);
            if subscriber.closed.load(Ordering::SeqCst) {
                continue;
            }

            let previous = DELIVERING.with(|d| d.replace(Some(handle)));
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                (subscriber.callback)(Arc::clone(&snapshot))
            }));
            DELIVERING.with(|d| d.set(previous));

            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(handle = handle.0, %message, "subscriber failed during notification");
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
