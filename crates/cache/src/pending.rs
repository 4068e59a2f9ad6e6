//! In-flight fetch deduplication: concurrent reads for the same
//! `(book, byte range)` share one origin request instead of issuing it
//! twice, using a condvar-gated cache cell per key.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

type Key = (String, u64, u64);

enum Slot {
    Pending,
    Done(Result<Arc<Vec<u8>>, String>),
}

type Cell = Arc<(Mutex<Slot>, Condvar)>;

/// Tracks fetches currently in flight, keyed by `(book id, lo, hi)`.
pub struct PendingFetches {
    inflight: Mutex<HashMap<Key, Cell>>,
}

impl Default for PendingFetches {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingFetches {
    pub fn new() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }

    /// Run `fetch` for `(id, lo, hi)` exactly once across any callers racing
    /// on the same key; every caller (leader and followers) gets the same
    /// result. `fetch`'s error is flattened to a message string so it can be
    /// cheaply shared across waiting threads.
    pub fn run_once(
        &self,
        id: &str,
        lo: u64,
        hi: u64,
        fetch: impl FnOnce() -> Result<Vec<u8>, String>,
    ) -> Result<Arc<Vec<u8>>, String> {
        let key = (id.to_string(), lo, hi);
        let (cell, is_leader) = {
            let mut inflight = self.inflight.lock().unwrap();
            if let Some(existing) = inflight.get(&key) {
                (existing.clone(), false)
            } else {
                let cell = Arc::new((Mutex::new(Slot::Pending), Condvar::new()));
                inflight.insert(key.clone(), cell.clone());
                (cell, true)
            }
        };

        if is_leader {
            let result = fetch().map(Arc::new);
            {
                let mut slot = cell.0.lock().unwrap();
                *slot = Slot::Done(result.clone());
            }
            cell.1.notify_all();
            self.inflight.lock().unwrap().remove(&key);
            return result;
        }

        let mut slot = cell.0.lock().unwrap();
        loop {
            match &*slot {
                Slot::Done(result) => return result.clone(),
                Slot::Pending => {
                    slot = cell.1.wait(slot).unwrap();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn concurrent_callers_share_one_fetch() {
        let pending = Arc::new(PendingFetches::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pending = pending.clone();
            let calls = calls.clone();
            handles.push(thread::spawn(move || {
                pending.run_once("book-1", 0, 4095, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(20));
                    Ok(vec![1, 2, 3])
                })
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in results {
            assert_eq!(*r.unwrap(), vec![1, 2, 3]);
        }
    }

    #[test]
    fn distinct_keys_run_independently() {
        let pending = PendingFetches::new();
        let a = pending.run_once("book-1", 0, 10, || Ok(vec![1]));
        let b = pending.run_once("book-1", 11, 20, || Ok(vec![2]));
        assert_eq!(*a.unwrap(), vec![1]);
        assert_eq!(*b.unwrap(), vec![2]);
    }

    #[test]
    fn error_is_shared_across_followers() {
        let pending = Arc::new(PendingFetches::new());
        let pending2 = pending.clone();
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let b2 = barrier.clone();
        let leader = thread::spawn(move || {
            pending2.run_once("book-1", 0, 10, || {
                b2.wait();
                thread::sleep(std::time::Duration::from_millis(30));
                Err("boom".to_string())
            })
        });
        barrier.wait();
        thread::sleep(std::time::Duration::from_millis(5));
        let follower = pending.run_once("book-1", 0, 10, || Ok(vec![9]));
        assert_eq!(follower.unwrap_err(), "boom");
        assert_eq!(leader.join().unwrap().unwrap_err(), "boom");
    }
}
