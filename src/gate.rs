//! Sliding-window limit on outbound LLM calls.
//!
//! Every call site awaits [`CallGate::admit`] on the one process-wide gate right before talking to
//! the model.  Callers over budget are delayed, never rejected.

use crate::log_internal;
use std::{collections::VecDeque, time::Duration};
use tokio::{sync::Mutex, time::Instant};

pub struct CallGate {
    max_calls: usize,
    time_period: Duration,
    /// Admission times of the most recent calls, oldest first.
    ///
    /// Tokio's mutex queues waiters in arrival order and is held across the sleep, so callers are
    /// admitted first come, first served.
    calls: Mutex<VecDeque<Instant>>,
}

impl CallGate {
    pub fn new(max_calls: usize, time_period: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            time_period,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn time_period(&self) -> Duration {
        self.time_period
    }

    /// Wait until another call fits in the window, then record it.
    pub async fn admit(&self) {
        let mut calls = self.calls.lock().await;
        loop {
            let now = Instant::now();
            self.prune(&mut calls, now);

            if calls.len() < self.max_calls {
                calls.push_back(now);
                return;
            }

            let wait = self.wait_time(&calls, now);
            log_internal!(
                "Rate limit reached.  Waiting {:.2} seconds...",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        // A clock that went backwards reads as zero elapsed time.
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.time_period {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_time(&self, calls: &VecDeque<Instant>, now: Instant) -> Duration {
        calls
            .front()
            .map(|&oldest| {
                self.time_period
                    .saturating_sub(now.saturating_duration_since(oldest))
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    async fn window_len(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn under_budget_is_not_delayed() {
        let gate = CallGate::new(5, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..5 {
            gate.admit().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(gate.window_len().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn call_past_budget_waits_out_the_window() {
        let period = Duration::from_secs(60);
        let gate = CallGate::new(3, period);

        // Spaced closer together than period / max_calls.
        let first = Instant::now();
        for _ in 0..3 {
            gate.admit().await;
            tokio::time::advance(Duration::from_secs(5)).await;
        }

        gate.admit().await;
        assert!(first.elapsed() >= period);
        assert!(gate.window_len().await <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn window_never_exceeds_budget() {
        let gate = CallGate::new(2, Duration::from_secs(10));

        for _ in 0..7 {
            gate.admit().await;
            assert!(gate.window_len().await <= 2);
            tokio::time::advance(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_calls_free_the_budget() {
        let period = Duration::from_secs(10);
        let gate = CallGate::new(2, period);

        gate.admit().await;
        gate.admit().await;
        tokio::time::advance(period).await;

        let before = Instant::now();
        gate.admit().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_gate_limits_concurrent_callers() {
        let period = Duration::from_secs(30);
        let gate = Arc::new(CallGate::new(2, period));
        let start = Instant::now();

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move {
                gate.admit().await;
                start.elapsed()
            }));
        }

        let mut admitted = Vec::new();
        for task in tasks {
            admitted.push(task.await.unwrap());
        }
        admitted.sort();

        // Two per window: 0, 0, 30, 30, 60
        assert_eq!(admitted[1], Duration::ZERO);
        assert!(admitted[2] >= period);
        assert!(admitted[4] >= period * 2);
    }

    #[test]
    fn zero_budget_is_clamped() {
        let gate = CallGate::new(0, Duration::from_secs(1));
        assert_eq!(gate.max_calls(), 1);
    }
}
