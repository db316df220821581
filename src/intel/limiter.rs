// src/intel/limiter.rs
//! Per-source rate limiting: a cap on concurrent requests plus a sliding
//! window of request timestamps. Callers over the limit wait; they never fail.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::intel::instant_after;

#[derive(Debug)]
pub struct RateLimiter {
    in_flight: Arc<Semaphore>,
    max_in_flight: usize,
    per_window: usize,
    window: Duration,
    /// Send instants inside the current window, oldest at the front.
    sent: Mutex<VecDeque<Instant>>,
}

/// Held for the duration of one request; releases the in-flight slot on drop.
#[derive(Debug)]
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    /// `per_window == 0` disables the window and keeps only the in-flight cap.
    pub fn new(max_in_flight: usize, per_window: usize, window: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            per_window,
            window,
            sent: Mutex::new(VecDeque::with_capacity(per_window.min(1_024))),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Semaphore::MAX_PERMITS, 0, Duration::ZERO)
    }

    pub async fn acquire(&self) -> RatePermit {
        // The semaphore is never closed, so `ok()` only drops the impossible error.
        let permit = self.in_flight.clone().acquire_owned().await.ok();

        if self.per_window > 0 && !self.window.is_zero() {
            loop {
                let wait = {
                    let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
                    let now = Instant::now();
                    while let Some(&t) = sent.front() {
                        if now.saturating_duration_since(t) >= self.window {
                            sent.pop_front();
                        } else {
                            break;
                        }
                    }
                    let next_free = if sent.len() < self.per_window {
                        sent.push_back(now);
                        None
                    } else {
                        sent.front().copied()
                    };
                    next_free.map(|t| instant_after(t, self.window).saturating_duration_since(now))
                };
                match wait {
                    None => break,
                    Some(d) => {
                        tracing::trace!(target: "intel", wait_ms = d.as_millis() as u64, "rate window full");
                        tokio::time::sleep(d).await;
                    }
                }
            }
        }

        RatePermit { _permit: permit }
    }

    /// Requests currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight
            .saturating_sub(self.in_flight.available_permits())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn per_window(&self) -> usize {
        self.per_window
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_release_on_drop() {
        let l = RateLimiter::new(2, 0, Duration::ZERO);
        let a = l.acquire().await;
        let _b = l.acquire().await;
        assert_eq!(l.in_flight(), 2);
        drop(a);
        assert_eq!(l.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_queues_excess_requests() {
        let l = RateLimiter::new(10, 2, Duration::from_secs(10));
        let t0 = Instant::now();
        drop(l.acquire().await);
        drop(l.acquire().await);
        assert!(t0.elapsed() < Duration::from_secs(1));
        drop(l.acquire().await);
        assert!(t0.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn zero_in_flight_is_clamped() {
        let l = RateLimiter::new(0, 0, Duration::ZERO);
        assert_eq!(l.max_in_flight(), 1);
    }
}
