//! The bounded, in-process queue of pending deliveries.
//!
//! Tasks wait in one of two places: the `ready` list (eligible now, handed out in the order
//! they became eligible) or the `delayed` heap (waiting for their backoff to expire).  A
//! task handed to a worker is tracked in `in_flight` and represented by a `Lease` until the
//! worker settles it.  Everything the queue owns counts against its capacity.

use super::task::{DeliveryTask, TaskId, TaskKey};
use super::{QueueErr, TransientDeliveryErr, WorkerId};
use crate::event::Event;
use crate::target::RemoteInbox;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

type Result<T> = std::result::Result<T, QueueErr>;

/// What `enqueue` does once the queue is at capacity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Refuse the new tasks straight away.
    Shed,
    /// Wait until in-flight work frees enough room.
    Block,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub capacity: usize,
}

#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<QueueState>,
    task_ready: Notify,
    space_freed: Notify,
    capacity: usize,
    overflow: OverflowPolicy,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<DeliveryTask>,
    delayed: BinaryHeap<Delayed>,
    in_flight: HashMap<TaskId, WorkerId>,
    keys: HashSet<TaskKey>,
    next_id: u64,
    next_order: u64,
    closed: bool,
}

impl DeliveryQueue {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            task_ready: Notify::new(),
            space_freed: Notify::new(),
            capacity: capacity.max(1),
            overflow,
        }
    }

    /// Queue one task per inbox for `event`, all or nothing.
    ///
    /// Inboxes that already have a pending or in-flight task for this event are skipped, so
    /// a redelivered event never produces a second task for the same target.  Returns the
    /// ids of the tasks that were actually added.
    pub fn try_enqueue_all(&self, event: &Arc<Event>, inboxes: Vec<RemoteInbox>) -> Result<Vec<TaskId>> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueErr::Closed);
        }
        let mut fresh = Vec::with_capacity(inboxes.len());
        let mut seen = HashSet::new();
        for inbox in inboxes {
            let key = TaskKey::new(event, &inbox);
            if state.keys.contains(&key) || !seen.insert(key) {
                log::debug!("Skipping duplicate delivery of {} to {}", event, inbox.endpoint);
                continue;
            }
            fresh.push(inbox);
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }
        if !state.admits(fresh.len(), self.capacity) {
            return Err(QueueErr::Full);
        }
        // retries that came due first stay ahead of the new tasks
        state.promote_due(Instant::now());

        let ids = fresh
            .into_iter()
            .map(|inbox| {
                let id = TaskId(state.next_id);
                state.next_id += 1;
                let task = DeliveryTask::new(id, Arc::clone(event), inbox);
                state.keys.insert(task.key());
                state.ready.push_back(task);
                id
            })
            .collect();
        drop(state);
        self.task_ready.notify_waiters();
        Ok(ids)
    }

    /// Like `try_enqueue_all`, but under `OverflowPolicy::Block` waits for room instead of
    /// failing with `QueueErr::Full`.
    pub async fn enqueue_all(&self, event: &Arc<Event>, inboxes: Vec<RemoteInbox>) -> Result<Vec<TaskId>> {
        loop {
            let space = self.space_freed.notified();
            tokio::pin!(space);
            space.as_mut().enable();
            match self.try_enqueue_all(event, inboxes.clone()) {
                Err(QueueErr::Full) if self.overflow == OverflowPolicy::Block => space.await,
                result => return result,
            }
        }
    }

    pub async fn enqueue(&self, event: &Arc<Event>, inbox: RemoteInbox) -> Result<Option<TaskId>> {
        Ok(self.enqueue_all(event, vec![inbox]).await?.pop())
    }

    /// Wait for the next eligible task and lease it to `worker`.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(self: &Arc<Self>, worker: WorkerId) -> Option<Lease> {
        loop {
            let woken = self.task_ready.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(mut task) = state.ready.pop_front() {
                    task.attempts += 1;
                    state.in_flight.insert(task.id, worker);
                    return Some(Lease {
                        task: Some(task),
                        worker,
                        queue: Arc::clone(self),
                    });
                }
                state.delayed.peek().map(|delayed| delayed.at)
            };

            match wake_at {
                Some(at) => tokio::select! {
                    _ = &mut woken => (),
                    _ = sleep_until(at) => (),
                },
                None => woken.await,
            }
        }
    }

    /// Settle a leased task for good (delivered, or about to be dead-lettered).
    pub fn complete(&self, lease: Lease) -> DeliveryTask {
        let task = lease.take();
        let mut state = self.lock();
        state.in_flight.remove(&task.id);
        state.keys.remove(&task.key());
        drop(state);
        self.space_freed.notify_waiters();
        task
    }

    /// Put a leased task back to wait `delay` before its next attempt.
    pub fn reschedule(&self, lease: Lease, delay: Duration, err: TransientDeliveryErr) -> Instant {
        let mut task = lease.take();
        task.next_eligible = eligible_after(delay);
        task.last_backoff = delay;
        task.last_error = Some(err);
        let at = task.next_eligible;

        let mut state = self.lock();
        state.in_flight.remove(&task.id);
        let order = state.bump_order();
        state.delayed.push(Delayed { at, order, task });
        drop(state);
        // sleeping workers may need an earlier wake-up
        self.task_ready.notify_waiters();
        at
    }

    /// Stop handing out work.  Queued tasks stay where they are; leases already handed
    /// out can still be settled.
    pub fn close(&self) {
        self.lock().closed = true;
        self.task_ready.notify_waiters();
        self.space_freed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            in_flight: state.in_flight.len(),
            capacity: self.capacity,
        }
    }

    fn restore(&self, task: DeliveryTask) {
        log::warn!("Lease on task {} dropped unsettled; returning it to the queue", task.id);
        let mut state = self.lock();
        state.in_flight.remove(&task.id);
        state.ready.push_front(task);
        drop(state);
        self.task_ready.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::error!("{}", &poisoned);
            poisoned.into_inner()
        })
    }
}

impl QueueState {
    fn len(&self) -> usize {
        self.ready.len() + self.delayed.len() + self.in_flight.len()
    }

    /// An empty queue always takes a whole event, even one wider than the capacity.
    fn admits(&self, n: usize, capacity: usize) -> bool {
        let len = self.len();
        len == 0 || len + n <= capacity
    }

    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().map_or(false, |delayed| delayed.at <= now) {
            if let Some(Delayed { task, .. }) = self.delayed.pop() {
                self.ready.push_back(task);
            }
        }
    }

    fn bump_order(&mut self) -> u64 {
        self.next_order += 1;
        self.next_order
    }
}

/// Roughly thirty years; later deadlines are clamped to it.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn eligible_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(FAR_FUTURE))
        .unwrap_or(now)
}

/// Exclusive hold on an in-flight task.
///
/// Settle it with `DeliveryQueue::complete`, `DeliveryQueue::reschedule`, or the retry
/// scheduler.  A lease dropped without being settled puts its task back at the head of
/// the queue.
#[derive(Debug)]
pub struct Lease {
    task: Option<DeliveryTask>,
    worker: WorkerId,
    queue: Arc<DeliveryQueue>,
}

impl Lease {
    pub fn task(&self) -> &DeliveryTask {
        self.task
            .as_ref()
            .expect("Guaranteed: a lease holds its task until it is settled")
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    fn take(mut self) -> DeliveryTask {
        self.task
            .take()
            .expect("Guaranteed: a lease holds its task until it is settled")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.queue.restore(task);
        }
    }
}

#[derive(Debug)]
struct Delayed {
    at: Instant,
    order: u64,
    task: DeliveryTask,
}

// `BinaryHeap` is a max-heap; earliest deadline (then earliest rescheduled) sorts highest.
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.order.cmp(&self.order))
    }
}
impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.order == other.order
    }
}
impl Eq for Delayed {}
