//! Sliding-window rate limiter for LLM API calls.
//!
//! Gates every provider call so the configured per-minute budget is never
//! exceeded. Used by both the synchronous analysis path and the batch
//! dispatcher, which share one limiter instance.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Length of the rolling window.
const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter: at most N grants per rolling 60 seconds.
///
/// [`acquire`](Self::acquire) suspends until a slot is available; it never
/// fails. Grant timestamps form a FIFO: on each attempt, timestamps older
/// than the window are dropped from the front and, if the queue is below the
/// budget, the caller is granted a slot. Otherwise the caller sleeps until
/// the oldest grant leaves the window and retries. The sleep happens outside
/// the lock, so waiters do not block concurrent grants. Fairness under
/// contention is approximate FIFO.
///
/// Cancellation is honoured: dropping a pending `acquire()` future consumes
/// no slot.
pub struct RateLimiter {
    grants: Mutex<VecDeque<Instant>>,
    budget: usize,
}

impl RateLimiter {
    /// Create a limiter with the given per-minute budget (minimum 1).
    pub fn new(requests_per_minute: usize) -> Self {
        Self {
            grants: Mutex::new(VecDeque::new()),
            budget: requests_per_minute.max(1),
        }
    }

    /// Wait until one request can be made without exceeding the budget.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut grants = self.grants.lock().await;
                let now = Instant::now();
                while grants
                    .front()
                    .is_some_and(|&granted| granted + WINDOW <= now)
                {
                    grants.pop_front();
                }
                if grants.len() < self.budget {
                    grants.push_back(Instant::now());
                    return;
                }
                let Some(&oldest) = grants.front() else {
                    // Unreachable: a saturated queue holds at least one grant.
                    grants.push_back(Instant::now());
                    return;
                };
                oldest + WINDOW
            };
            sleep_until(wake_at).await;
        }
    }

    /// The configured per-minute budget.
    pub fn budget(&self) -> usize {
        self.budget
    }
}
