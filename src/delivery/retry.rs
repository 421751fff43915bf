//! Exponential backoff for transient delivery failures.
//!
//! A retry is a scheduled re-enqueue: the task goes back to the queue carrying its own
//! next-eligible time, so no worker ever sleeps on behalf of a single task.
use super::dead_letter::{DeadLetterReason, DeadLetterStore};
use super::queue::{DeliveryQueue, Lease};
use super::task::TaskId;
use super::TransientDeliveryErr;

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_backoff: Duration,
    /// Attempts (the first one included) before a task is dead-lettered.
    pub max_attempts: u32,
    /// Upper bound of the random extra delay, as a fraction of the backoff.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    /// 13 attempts spread over a little more than a day.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max_backoff: Duration::from_secs(6 * 60 * 60),
            max_attempts: 13,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt, after `attempts` attempts have failed.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let doublings = attempts.saturating_sub(1).min(31);
        self.base
            .saturating_mul(1u32 << doublings)
            .min(self.max_backoff)
    }

    /// `backoff` plus jitter, never shorter than the delay used last time.
    pub fn delay(&self, attempts: u32, previous: Duration) -> Duration {
        let backoff = self.backoff(attempts);
        let jitter = if self.jitter > 0.0 {
            let fraction = rand::thread_rng().gen_range(0.0..=self.jitter);
            Duration::try_from_secs_f64(backoff.as_secs_f64() * fraction).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        backoff.saturating_add(jitter).max(previous)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    Scheduled { attempts: u32, delay: Duration },
    DeadLettered(TaskId),
}

#[derive(Debug)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    queue: Arc<DeliveryQueue>,
    dead_letters: Arc<DeadLetterStore>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, queue: Arc<DeliveryQueue>, dead_letters: Arc<DeadLetterStore>) -> Self {
        Self {
            policy,
            queue,
            dead_letters,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn retry(&self, lease: Lease, err: TransientDeliveryErr) -> Retry {
        let (id, attempts, previous) = {
            let task = lease.task();
            (task.id(), task.attempts(), task.last_backoff())
        };
        if self.policy.exhausted(attempts) {
            let task = self.queue.complete(lease);
            self.dead_letters.bury(task, DeadLetterReason::Exhausted(err));
            return Retry::DeadLettered(id);
        }

        let delay = self.policy.delay(attempts, previous);
        log::debug!(
            "Delivery {} failed on attempt {} ({}); retrying in {:?}",
            id,
            attempts,
            err,
            delay
        );
        self.queue.reschedule(lease, delay, err);
        Retry::Scheduled { attempts, delay }
    }
}
