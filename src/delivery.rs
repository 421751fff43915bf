//! Remote delivery: the bounded queue of (event, inbox) tasks, the worker pool that drains
//! it, the retry scheduler, and the dead-letter store.
//!
//! The queue and the dead-letter store are the only state the workers share, and both are
//! reached through their methods only.  A task is always in exactly one place: queued,
//! leased to one worker, or dead-lettered.
mod dead_letter;
mod err;
mod queue;
mod retry;
mod task;
mod worker;

pub use dead_letter::{DeadLetter, DeadLetterReason, DeadLetterStore};
pub use err::{PermanentDeliveryErr, QueueErr, TransientDeliveryErr, TransportErr};
pub use queue::{DeliveryQueue, Lease, OverflowPolicy, QueueStats};
pub use retry::{Retry, RetryPolicy, RetryScheduler};
pub use task::{DeliveryTask, TaskId};
pub use worker::{Outcome, Transport, WorkerId, WorkerPool};

pub(crate) use worker::WorkerContext;
