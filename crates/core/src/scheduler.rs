//! Debounce scheduler for deferred recomputation.
//!
//! A request for a key that already has a pending (not yet started) job
//! replaces it: the old task is aborted and the delay starts over. Jobs that
//! have started always run to completion; a new request for the same key while
//! one is running simply schedules another run after it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Pending {
    token: u64,
    handle: JoinHandle<()>,
}

struct State<K> {
    pending: HashMap<K, Pending>,
    running: usize,
    next_token: u64,
}

impl<K> State<K> {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running == 0
    }
}

struct Shared<K> {
    state: Mutex<State<K>>,
    idle: Notify,
}

impl<K> Shared<K> {
    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the running count when a job finishes, even if it panics.
struct RunningGuard<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Drop for RunningGuard<K> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.running -= 1;
        if state.is_idle() {
            self.shared.idle.notify_waiters();
        }
    }
}

/// Coalesces bursts of requests per key into a single deferred job.
pub struct Debouncer<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State { pending: HashMap::new(), running: 0, next_token: 0 }),
                idle: Notify::new(),
            }),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Hash + Eq + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` to run once `delay` has passed without another request for `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request<F>(&self, key: K, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.shared.lock();
        let token = state.next_token;
        state.next_token += 1;

        if let Some(previous) = state.pending.remove(&key) {
            previous.handle.abort();
        }

        let shared = Arc::clone(&self.shared);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let guard = {
                let mut state = shared.lock();
                match state.pending.get(&task_key) {
                    Some(pending) if pending.token == token => {}
                    _ => return,
                }
                state.pending.remove(&task_key);
                state.running += 1;
                RunningGuard { shared: Arc::clone(&shared) }
            };

            job.await;
            drop(guard);
        });

        state.pending.insert(key, Pending { token, handle });
    }

    /// Drop the pending job for `key`, if any. A job already running is unaffected.
    pub fn cancel(&self, key: &K) -> bool {
        let mut state = self.shared.lock();
        let Some(pending) = state.pending.remove(key) else {
            return false;
        };
        pending.handle.abort();
        if state.is_idle() {
            self.shared.idle.notify_waiters();
        }
        true
    }

    /// Whether a job for `key` is waiting out its delay.
    pub fn is_pending(&self, key: &K) -> bool {
        self.shared.lock().pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Wait until nothing is pending or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }
}
