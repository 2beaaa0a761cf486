//! Deduplication of concurrent work by key.
//!
//! The first caller for a key runs the future; callers arriving while it is
//! in flight await the same result. The entry is removed once the work
//! completes, or once every waiting caller has been dropped, so a later call
//! runs again (and normally hits the cache).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

pub struct SingleFlight<V> {
    in_flight: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
}

impl<V: Clone> SingleFlight<V> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key` unless an identical call is already in flight.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let cell = in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();
            cell
        };

        // Runs on completion and on cancellation alike.
        let _guard = FlightGuard {
            flight: self,
            key,
            cell: &cell,
        };
        let value = cell.get_or_init(work).await.clone();
        value
    }

    fn forget(&self, key: &str, cell: &Arc<OnceCell<V>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            in_flight.remove(key);
        }
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a flight's entry when its caller finishes or is dropped.
///
/// A remaining waiter on the same cell keeps its own `Arc`; if the running
/// caller was cancelled, that waiter's `get_or_init` runs the work itself.
struct FlightGuard<'a, V: Clone> {
    flight: &'a SingleFlight<V>,
    key: &'a str,
    cell: &'a Arc<OnceCell<V>>,
}

impl<V: Clone> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        self.flight.forget(self.key, self.cell);
    }
}

impl<V: Clone> Default for SingleFlight<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("key", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let flight = SingleFlight::<usize>::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            flight
                .run("key", || async { calls.fetch_add(1, Ordering::SeqCst) })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_call_leaves_no_entry() {
        let flight = SingleFlight::<u32>::new();
        let slow = flight.run("key", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            1
        });
        let result = tokio::time::timeout(Duration::from_millis(20), slow).await;
        assert!(result.is_err());
        assert!(flight.is_empty());

        // The key is usable again.
        assert_eq!(flight.run("key", || async { 2 }).await, 2);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_survives_cancelled_leader() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move { flight.run("key", || async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        assert_eq!(waiter.await.unwrap(), 2);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share() {
        let flight = SingleFlight::<String>::new();
        let a = flight.run("a", || async { "a".to_string() });
        let b = flight.run("b", || async { "b".to_string() });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, "a");
        assert_eq!(b, "b");
    }
}
