//! Per-client rate limiting.
//!
//! Provides a sliding window rate limiter to prevent abuse by limiting
//! the number of requests a single client can make within a time window.
//! Idle clients are evicted by an opportunistic sweep on the request path
//! and by an optional background task.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// How often idle clients are swept when no interval is configured.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Floor for the cleanup interval; the ticker cannot run with a zero period.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

struct ClientState {
    /// Admitted request instants, oldest first.
    requests: VecDeque<Instant>,
    /// Instant of the last admitted request.
    last_seen: Instant,
}

struct LimiterState {
    clients: HashMap<String, ClientState>,
    last_cleanup: Instant,
}

struct CleanupTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Snapshot of limiter occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub active_clients: usize,
    pub total_requests: usize,
    pub max_requests: usize,
    /// Window length in Go duration notation, e.g. `"1m0s"` or `"500ms"`.
    pub window_duration: String,
}

/// Render `d` the way Go's `time.Duration` prints itself.
fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000, 6));
    }

    let secs = d.as_secs();
    let (hours, minutes) = (secs / 3600, secs % 3600 / 60);
    let sub_minute = u128::from(secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos());
    let seconds = decimal(sub_minute, 1_000_000_000, 9);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `value / unit` with the fraction printed and trailing zeros dropped.
fn decimal(value: u128, unit: u128, digits: usize) -> String {
    let (whole, frac) = (value / unit, value % unit);
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = digits);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// A sliding window rate limiter that tracks requests per client.
///
/// Each client can make at most `max_requests` within any trailing
/// `window`. Denied requests are not recorded.
pub struct RateLimiter {
    state: RwLock<LimiterState>,
    max_requests: usize,
    window: Duration,
    cleanup_interval: Duration,
    cleanup_task: Mutex<Option<CleanupTask>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Maximum requests allowed per window
    /// * `window` - Duration of the sliding window
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            state: RwLock::new(LimiterState {
                clients: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            max_requests,
            window,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            cleanup_task: Mutex::new(None),
        }
    }

    /// Set how often idle clients are evicted, and how long a client must
    /// be idle to be evicted.
    ///
    /// Clamped to at least one millisecond.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval.max(MIN_CLEANUP_INTERVAL);
        self
    }

    /// Check whether a request from `client_id` is allowed, recording it if so.
    pub fn allow(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        if now.duration_since(state.last_cleanup) > self.cleanup_interval {
            self.sweep(&mut state, now);
        }

        let client = state
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientState {
                requests: VecDeque::with_capacity(self.max_requests.min(1024)),
                last_seen: now,
            });

        while let Some(&oldest) = client.requests.front() {
            if now.duration_since(oldest) >= self.window {
                client.requests.pop_front();
            } else {
                break;
            }
        }

        if client.requests.len() >= self.max_requests {
            return false;
        }

        client.requests.push_back(now);
        client.last_seen = now;
        true
    }

    /// Evict clients idle for longer than the cleanup interval.
    ///
    /// Returns the number of clients evicted.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.sweep(&mut state, now)
    }

    fn sweep(&self, state: &mut LimiterState, now: Instant) -> usize {
        let before = state.clients.len();
        let idle_limit = self.cleanup_interval;
        state
            .clients
            .retain(|_, client| now.duration_since(client.last_seen) <= idle_limit);
        state.last_cleanup = now;
        before - state.clients.len()
    }

    /// Current occupancy.
    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        RateLimiterStats {
            active_clients: state.clients.len(),
            total_requests: state.clients.values().map(|c| c.requests.len()).sum(),
            max_requests: self.max_requests,
            window_duration: format_duration(self.window),
        }
    }

    /// Forget every client.
    pub fn reset(&self) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clients
            .clear();
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that evicts idle clients every cleanup
    /// interval. The task holds only a weak reference, so it also ends once
    /// the limiter is dropped. Calling this while a task is running is a
    /// no-op.
    pub fn start_cleanup_task(self: &Arc<Self>) {
        let mut slot = self.cleanup_task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            debug!("Rate limiter cleanup task already running");
            return;
        }

        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.cleanup_interval;
        let (stop, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(limiter) = limiter.upgrade() else {
                            break;
                        };
                        let evicted = limiter.cleanup();
                        if evicted > 0 {
                            debug!(evicted, "Evicted idle rate limit clients");
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }

            debug!("Rate limiter cleanup task stopped");
        });

        *slot = Some(CleanupTask { stop, handle });
    }

    /// Stop the background cleanup task and wait for it to finish.
    pub async fn shutdown(&self) {
        let task = self
            .cleanup_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(task) = task {
            let _ = task.stop.send(true);
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Rate limiter cleanup task failed");
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        let task = self
            .cleanup_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.handle.abort();
        }
    }
}
