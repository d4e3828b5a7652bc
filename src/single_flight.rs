use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

/// Collapses concurrent calls for the same key into one execution.
///
/// The first caller for a key runs the future; everybody arriving while it is in flight awaits the same cell and
/// receives a clone of its output. The slot is dropped once the call completes, so the next call for the key runs
/// afresh. If the running caller is cancelled, one of the waiters takes over the initialization.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared output and whether this caller was the one executing `f`.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut calls = self.calls.lock();
            calls.entry(key.to_string()).or_default().clone()
        };

        let mut leader = false;
        let output = cell
            .get_or_init(|| {
                leader = true;
                f()
            })
            .await
            .clone();

        {
            let mut calls = self.calls.lock();
            if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                calls.remove(key);
            }
        }

        (output, leader)
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SingleFlight {{ in_flight: {} }}", self.calls.lock().len())
    }
}
