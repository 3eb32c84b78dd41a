//! Sliding-window request throttle
//!
//! Keeps the timestamps of recent requests in a one-second window and delays
//! the caller once the configured request rate would be exceeded. Bursts up to
//! the limit go out immediately; after that requests are spaced so that no
//! trailing second holds more than the configured number of admissions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::metrics;

/// Length of the sliding window
pub const WINDOW: Duration = Duration::from_secs(1);

/// Request-based rate limiter over a sliding one-second window
#[derive(Clone)]
pub struct RateLimiter {
    max_per_second: usize,
    window: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `max_per_second` requests per second
    pub fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: max_per_second.max(1),
            window: Arc::new(Mutex::new(VecDeque::with_capacity(max_per_second + 1))),
        }
    }

    /// Configured maximum requests per second
    pub fn max_per_second(&self) -> usize {
        self.max_per_second
    }

    /// Number of timestamps currently retained in the window
    pub async fn window_len(&self) -> usize {
        self.window.lock().await.len()
    }

    /// Wait until one more request fits the window, then record it
    ///
    /// The window lock is held across the wait, so concurrent callers are
    /// admitted one at a time in arrival order.
    ///
    /// # Returns
    /// The time spent waiting (zero when admitted immediately)
    pub async fn admit(&self) -> Duration {
        let mut window = self.window.lock().await;

        window.push_back(Instant::now());
        trim(&mut window);

        if window.len() <= self.max_per_second {
            return Duration::ZERO;
        }

        let wait = round_up_millis(WINDOW.saturating_sub(span(&window)));
        debug!(
            wait_ms = wait.as_millis() as u64,
            in_window = window.len(),
            "Throttling request"
        );
        sleep(wait).await;

        // The request leaves now, not when it was queued
        if let Some(newest) = window.back_mut() {
            *newest = Instant::now();
        }
        trim(&mut window);

        metrics::record_throttle_wait(wait);
        wait
    }
}

/// Drop the oldest timestamps until the window spans at most one second
fn trim(window: &mut VecDeque<Instant>) {
    while span(window) > WINDOW {
        window.pop_front();
    }
}

fn span(window: &VecDeque<Instant>) -> Duration {
    match (window.front(), window.back()) {
        (Some(oldest), Some(newest)) => newest.saturating_duration_since(*oldest),
        _ => Duration::ZERO,
    }
}

/// Round a duration up to the next whole millisecond
///
/// Always adds at least one millisecond so the window is never under-slept.
fn round_up_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64 + 1)
}
