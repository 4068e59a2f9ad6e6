//! Mirror pool: a set of equivalent origins for the same book, with
//! per-book sticky affinity and rolling success/failure stats so a
//! misbehaving mirror is avoided without being forgotten forever.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::client::{HeadInfo, OriginClient, OriginError};

/// EMA smoothing factor for rolling average response time. Lower is
/// smoother; matches the single-counter rolling style used elsewhere in the
/// workspace for per-entity stats.
const RESPONSE_TIME_ALPHA: f64 = 0.2;

/// Consecutive failures before a mirror is considered persistently down and
/// dropped to the back of the fallback order for every book, not just the
/// one that tripped it.
const PERSISTENT_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone)]
pub struct MirrorPoolConfig {
    pub persistent_failure_threshold: u32,
    pub max_redirects: u32,
}

impl Default for MirrorPoolConfig {
    fn default() -> Self {
        Self { persistent_failure_threshold: PERSISTENT_FAILURE_THRESHOLD, max_redirects: 5 }
    }
}

#[derive(Debug, Clone, Default)]
struct MirrorStats {
    successes: u64,
    failures: u64,
    consecutive_failures: u32,
    avg_response_ms: Option<f64>,
}

impl MirrorStats {
    fn record_success(&mut self, elapsed_ms: f64) {
        self.successes += 1;
        self.consecutive_failures = 0;
        self.avg_response_ms = Some(match self.avg_response_ms {
            Some(prev) => RESPONSE_TIME_ALPHA * elapsed_ms + (1.0 - RESPONSE_TIME_ALPHA) * prev,
            None => elapsed_ms,
        });
    }

    fn record_failure(&mut self) {
        self.failures += 1;
        self.consecutive_failures += 1;
    }

    fn is_persistently_down(&self, threshold: u32) -> bool {
        self.consecutive_failures >= threshold
    }
}

/// Point-in-time snapshot of one mirror's health, for diagnostics/stats
/// surfaces.
#[derive(Debug, Clone)]
pub struct MirrorStatSnapshot {
    pub url: String,
    pub successes: u64,
    pub failures: u64,
    pub avg_response_ms: Option<f64>,
    pub persistently_down: bool,
}

struct Inner {
    config: MirrorPoolConfig,
    stats: HashMap<String, MirrorStats>,
    /// book id -> mirror url currently preferred for that book.
    sticky: HashMap<String, String>,
}

/// A pool of mirror base URLs serving identical content, shared across all
/// books being read. Callers resolve a book id to a full URL themselves
/// (the pool only tracks base-URL health and ordering).
pub struct MirrorPool {
    mirrors: Vec<String>,
    inner: Mutex<Inner>,
}

impl MirrorPool {
    pub fn new(mirrors: Vec<String>, config: MirrorPoolConfig) -> Self {
        assert!(!mirrors.is_empty(), "mirror pool needs at least one origin");
        let stats = mirrors.iter().map(|m| (m.clone(), MirrorStats::default())).collect();
        Self {
            mirrors,
            inner: Mutex::new(Inner { config, stats, sticky: HashMap::new() }),
        }
    }

    /// Ordered list of mirrors to try for `book_id`: the sticky mirror (if
    /// any and not persistently down) first, then the rest ranked by fewest
    /// consecutive failures and lowest average response time.
    fn candidate_order(&self, book_id: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut rest: Vec<&String> = self.mirrors.iter().collect();
        let sticky = inner.sticky.get(book_id).cloned();

        rest.sort_by(|a, b| {
            let sa = inner.stats.get(*a).cloned().unwrap_or_default();
            let sb = inner.stats.get(*b).cloned().unwrap_or_default();
            sa.is_persistently_down(inner.config.persistent_failure_threshold)
                .cmp(&sb.is_persistently_down(inner.config.persistent_failure_threshold))
                .then(sa.consecutive_failures.cmp(&sb.consecutive_failures))
                .then(
                    sa.avg_response_ms
                        .unwrap_or(f64::MAX)
                        .partial_cmp(&sb.avg_response_ms.unwrap_or(f64::MAX))
                        .unwrap(),
                )
        });

        let mut order: Vec<String> = Vec::with_capacity(self.mirrors.len());
        if let Some(sticky_url) = &sticky {
            let down = inner
                .stats
                .get(sticky_url)
                .map(|s| s.is_persistently_down(inner.config.persistent_failure_threshold))
                .unwrap_or(false);
            if !down {
                order.push(sticky_url.clone());
            }
        }
        for m in rest {
            if !order.contains(m) {
                order.push(m.clone());
            }
        }
        order
    }

    fn record(&self, url: &str, outcome: Result<f64, ()>) {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.stats.entry(url.to_string()).or_default();
        match outcome {
            Ok(elapsed_ms) => entry.record_success(elapsed_ms),
            Err(()) => entry.record_failure(),
        }
    }

    fn set_sticky(&self, book_id: &str, url: &str) {
        self.inner.lock().unwrap().sticky.insert(book_id.to_string(), url.to_string());
    }

    /// HEAD `path` against each candidate mirror for `book_id` in order,
    /// returning the first success and pinning that mirror as sticky.
    pub fn head(&self, book_id: &str, path: &str) -> Result<(String, HeadInfo), OriginError> {
        self.try_each(book_id, |client, base| client.head(&format!("{base}{path}")))
    }

    /// Ranged GET `path` against each candidate mirror for `book_id`.
    pub fn get_range(
        &self,
        book_id: &str,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<(String, Vec<u8>), OriginError> {
        self.try_each(book_id, |client, base| client.get_range(&format!("{base}{path}"), start, end))
    }

    fn try_each<T>(
        &self,
        book_id: &str,
        op: impl Fn(&OriginClient, &str) -> Result<T, OriginError>,
    ) -> Result<(String, T), OriginError> {
        let order = self.candidate_order(book_id);
        let mut last_err = None;
        for mirror in &order {
            // Build a short-lived client per attempt rather than holding the
            // pool lock across a blocking network call.
            let max_redirects = self.inner.lock().unwrap().config.max_redirects;
            let client_ref = OriginClient::new().with_max_redirects(max_redirects);
            let start = Instant::now();
            match op(&client_ref, mirror) {
                Ok(value) => {
                    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                    self.record(mirror, Ok(elapsed_ms));
                    self.set_sticky(book_id, mirror);
                    tracing::info!(book_id, mirror, elapsed_ms, "origin request succeeded");
                    return Ok((mirror.clone(), value));
                }
                Err(err) => {
                    tracing::warn!(book_id, mirror, error = %err, "origin request failed, trying next mirror");
                    self.record(mirror, Err(()));
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("mirror pool is non-empty"))
    }

    pub fn stats(&self) -> Vec<MirrorStatSnapshot> {
        let inner = self.inner.lock().unwrap();
        self.mirrors
            .iter()
            .map(|url| {
                let s = inner.stats.get(url).cloned().unwrap_or_default();
                MirrorStatSnapshot {
                    url: url.clone(),
                    successes: s.successes,
                    failures: s.failures,
                    avg_response_ms: s.avg_response_ms,
                    persistently_down: s.is_persistently_down(inner.config.persistent_failure_threshold),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn spawn_server(responder: impl Fn(&str) -> String + Send + 'static) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let _ = &buf[..n];
                let response = responder("");
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn falls_back_to_second_mirror_on_failure() {
        let dead = "http://127.0.0.1:1"; // nothing listens here
        let alive = spawn_server(|_| {
            "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc".to_string()
        });
        let pool = MirrorPool::new(vec![dead.to_string(), alive.clone()], MirrorPoolConfig::default());
        let (used, info) = pool.head("book-1", "/book.txt").unwrap();
        assert_eq!(used, alive);
        assert_eq!(info.size, 3);
    }

    #[test]
    fn sticky_mirror_is_preferred_on_next_request() {
        let a = spawn_server(|_| "HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nx".to_string());
        let b = spawn_server(|_| "HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nx".to_string());
        let pool = MirrorPool::new(vec![a.clone(), b.clone()], MirrorPoolConfig::default());
        let (first, _) = pool.head("book-1", "/book.txt").unwrap();
        let order = pool.candidate_order("book-1");
        assert_eq!(order[0], first);
    }

    #[test]
    fn persistent_failures_drop_priority() {
        let dead = "http://127.0.0.1:1";
        let pool = MirrorPool::new(
            vec![dead.to_string()],
            MirrorPoolConfig { persistent_failure_threshold: 2, max_redirects: 5 },
        );
        for _ in 0..2 {
            let _ = pool.head("book-1", "/book.txt");
        }
        let stats = pool.stats();
        assert!(stats[0].persistently_down);
    }
}
