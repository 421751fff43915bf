use crate::delivery::OverflowPolicy;
use crate::from_env_var;
use std::time::Duration;

/// Thirty days.  Longer waits would overflow the backoff arithmetic.
const LONGEST_WAIT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn seconds(s: &str) -> Option<Duration> {
    s.parse()
        .ok()
        .map(Duration::from_secs)
        .filter(|d| *d <= LONGEST_WAIT)
}

fn seconds_allowed() -> String {
    format!("a number of seconds, at most {}", LONGEST_WAIT.as_secs())
}

from_env_var!(
    /// How many delivery workers drain the queue concurrently
    let name = Workers;
    let default: usize = 8;
    let (env_var, allowed_values) = ("FANOUT_WORKERS", "a whole number greater than 0".to_string());
    let from_str = |s| s.parse().ok().filter(|n: &usize| *n > 0);
);
from_env_var!(
    /// How many delivery tasks the queue may own at once (ready, delayed, and in flight)
    let name = QueueCapacity;
    let default: usize = 10_000;
    let (env_var, allowed_values) = ("FANOUT_QUEUE_CAPACITY", "a whole number greater than 0".to_string());
    let from_str = |s| s.parse().ok().filter(|n: &usize| *n > 0);
);
from_env_var!(
    /// What a submit does when the delivery queue is full
    let name = Overflow;
    let default: OverflowPolicy = OverflowPolicy::Shed;
    let (env_var, allowed_values) = ("FANOUT_OVERFLOW", "`shed` or `block`".to_string());
    let from_str = |s| match s {
        "shed" => Some(OverflowPolicy::Shed),
        "block" => Some(OverflowPolicy::Block),
        _ => None,
    };
);
from_env_var!(
    /// How long a single delivery attempt may take
    let name = DeliveryTimeout;
    let default: Duration = Duration::from_secs(10);
    let (env_var, allowed_values) = ("FANOUT_DELIVERY_TIMEOUT", seconds_allowed());
    let from_str = |s| seconds(s);
);
from_env_var!(
    /// The backoff after the first failed attempt
    let name = RetryBase;
    let default: Duration = Duration::from_secs(60);
    let (env_var, allowed_values) = ("FANOUT_RETRY_BASE", seconds_allowed());
    let from_str = |s| seconds(s);
);
from_env_var!(
    /// The longest backoff between two attempts
    let name = RetryMax;
    let default: Duration = Duration::from_secs(6 * 60 * 60);
    let (env_var, allowed_values) = ("FANOUT_RETRY_MAX", seconds_allowed());
    let from_str = |s| seconds(s);
);
from_env_var!(
    /// Attempts (the first one included) before a delivery is dead-lettered
    let name = MaxAttempts;
    let default: u32 = 13;
    let (env_var, allowed_values) = ("FANOUT_MAX_ATTEMPTS", "a whole number greater than 0".to_string());
    let from_str = |s| s.parse().ok().filter(|n: &u32| *n > 0);
);
from_env_var!(
    /// Random extra backoff, as a fraction of the computed backoff
    let name = RetryJitter;
    let default: f64 = 0.25;
    let (env_var, allowed_values) = ("FANOUT_RETRY_JITTER", "a number between 0 and 1".to_string());
    let from_str = |s| s.parse().ok().filter(|r: &f64| (0.0..=1.0).contains(r));
);
from_env_var!(
    /// Events a stream session buffers before it starts dropping the oldest
    let name = StreamBuffer;
    let default: usize = 256;
    let (env_var, allowed_values) = ("STREAM_BUFFER", "a whole number greater than 0".to_string());
    let from_str = |s| s.parse().ok().filter(|n: &usize| *n > 0);
);
