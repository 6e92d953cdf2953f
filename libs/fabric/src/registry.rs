use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use callframe_core::{Envelope, Stamp};

/// One-shot reply handler
pub type Callback = Box<dyn FnOnce(&Envelope) + Send>;

/// Handles are unique across the process, so one channel never matches a
/// handle issued by another
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Handle returned by every listen call, needed to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.0)
    }
}

/// Pending callbacks of one channel, keyed by stamp
///
/// Clones share the same entries so wrapped listeners can complete them.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pending: Arc<Mutex<HashMap<Stamp, Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stamp: Stamp, callback: Callback) {
        self.pending().insert(stamp, callback);
    }

    /// Run and forget the callback registered for `stamp`
    ///
    /// The entry is removed before the callback runs, so a callback that
    /// re-enters the channel can never see or consume it again.
    pub fn complete(&self, stamp: &Stamp, reply: &Envelope) -> bool {
        let callback = self.pending().remove(stamp);
        match callback {
            Some(callback) => {
                tracing::debug!(stamp = %stamp, "completing callback");
                callback(reply);
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, stamp: &Stamp) -> bool {
        self.pending().remove(stamp).is_some()
    }

    pub fn contains(&self, stamp: &Stamp) -> bool {
        self.pending().contains_key(stamp)
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Stamp, Callback>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

/// Transport subscriptions of one channel, keyed by listener handle
#[derive(Debug)]
pub struct ListenerRegistry<S> {
    subscriptions: Mutex<HashMap<ListenerHandle, S>>,
}

impl<S> ListenerRegistry<S> {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Record a subscription under a fresh handle
    pub fn insert(&self, subscription: S) -> ListenerHandle {
        let handle = ListenerHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed));
        self.subscriptions().insert(handle, subscription);
        handle
    }

    pub fn remove(&self, handle: ListenerHandle) -> Option<S> {
        self.subscriptions().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.subscriptions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<ListenerHandle, S>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Default for ListenerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
