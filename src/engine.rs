//! The handle the host process holds: one `Engine` owns every queue, store, and session
//! table, so several engines can run side by side without sharing state.
mod err;

pub use err::EngineErr;

use crate::config;
use crate::delivery::{
    DeadLetter, DeadLetterStore, DeliveryQueue, QueueStats, RetryScheduler, TaskId, Transport,
    WorkerContext, WorkerPool,
};
use crate::event::{AccountId, Event};
use crate::resolve::{ActorGraph, Resolver};
use crate::stream::{Hub, SessionHandle};

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// What `submit` did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// One delivery task per remote inbox that was not already pending.
    pub remote_tasks: Vec<TaskId>,
    /// Live sessions that took the event.
    pub local_sessions: usize,
}

/// What `redrive_dead_letter` did with a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redrive {
    /// The letter is gone and its delivery is queued again under a fresh id.
    Queued(TaskId),
    /// A delivery of the same event to the same inbox is already pending; the letter stays.
    AlreadyPending,
    /// There is no such dead letter.
    Missing,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Stats {
    pub workers: usize,
    pub sessions: usize,
    pub sessions_per_account: Vec<(AccountId, usize)>,
    pub queue: QueueStats,
    pub dead_letters: usize,
}

pub struct Engine {
    resolver: Resolver,
    queue: Arc<DeliveryQueue>,
    dead_letters: Arc<DeadLetterStore>,
    hub: Hub,
    workers: Mutex<Option<WorkerPool>>,
    worker_count: usize,
}

impl Engine {
    /// Build the engine and spawn its delivery workers on the current tokio runtime.
    pub fn start(cfg: &config::Fanout, graph: Arc<dyn ActorGraph>, transport: Arc<dyn Transport>) -> Self {
        let queue = Arc::new(DeliveryQueue::new(*cfg.queue_capacity, *cfg.overflow));
        let dead_letters = Arc::new(DeadLetterStore::new());
        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&queue),
            retry: RetryScheduler::new(cfg.retry_policy(), Arc::clone(&queue), Arc::clone(&dead_letters)),
            dead_letters: Arc::clone(&dead_letters),
            transport,
            deadline: *cfg.delivery_timeout,
        });
        let pool = WorkerPool::spawn(*cfg.workers, ctx);
        log::info!("Fan-out engine started with {} delivery worker(s)", pool.size());

        Self {
            resolver: Resolver::new(graph),
            queue,
            dead_letters,
            hub: Hub::new(*cfg.stream_buffer),
            worker_count: pool.size(),
            workers: Mutex::new(Some(pool)),
        }
    }

    /// Fan `event` out to everyone who should see it.
    ///
    /// Remote deliveries are queued before any local session sees the event, so a `Busy`
    /// (or any other error) means the event went nowhere.  Returns as soon as the tasks are
    /// queued; delivery outcomes are never reported back to the submitter.
    pub async fn submit(&self, event: Event) -> Result<Receipt, EngineErr> {
        if self.queue.is_closed() {
            return Err(EngineErr::ShuttingDown);
        }
        let targets = self.resolver.resolve(&event).await?;
        let event = Arc::new(event);

        let remote_tasks = if targets.remote.is_empty() {
            Vec::new()
        } else {
            self.queue.enqueue_all(&event, targets.remote).await.map_err(|e| {
                log::warn!("Could not queue remote deliveries for {}: {}", event, e);
                EngineErr::from(e)
            })?
        };
        let local_sessions = self.hub.publish(&event, &targets.local);

        log::debug!(
            "Submitted {}: {} delivery task(s), {} stream session(s)",
            event,
            remote_tasks.len(),
            local_sessions
        );
        Ok(Receipt {
            remote_tasks,
            local_sessions,
        })
    }

    pub fn subscribe(&self, account: AccountId) -> SessionHandle {
        self.hub.subscribe(account)
    }

    pub fn unsubscribe(&self, handle: &SessionHandle) {
        self.hub.unsubscribe(handle)
    }

    pub fn dead_letters(&self) -> Vec<Arc<DeadLetter>> {
        self.dead_letters.list()
    }

    pub fn discard_dead_letter(&self, id: TaskId) -> Option<Arc<DeadLetter>> {
        self.dead_letters.discard(id)
    }

    /// Queue a dead letter's delivery again as a fresh task with no attempts behind it.
    ///
    /// The letter is only removed once its task is queued; on `AlreadyPending` or on error
    /// it stays where it was.
    pub async fn redrive_dead_letter(&self, id: TaskId) -> Result<Redrive, EngineErr> {
        let letter = match self.dead_letters.discard(id) {
            Some(letter) => letter,
            None => return Ok(Redrive::Missing),
        };
        match self
            .queue
            .try_enqueue_all(&letter.event, vec![letter.inbox.clone()])
        {
            Ok(mut ids) => match ids.pop() {
                Some(fresh) => {
                    log::info!("Redrove dead letter {} as {}", id, fresh);
                    Ok(Redrive::Queued(fresh))
                }
                None => {
                    log::info!("Not redriving dead letter {}: its delivery is already pending", id);
                    self.dead_letters.restore(letter);
                    Ok(Redrive::AlreadyPending)
                }
            },
            Err(e) => {
                self.dead_letters.restore(letter);
                Err(e.into())
            }
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            workers: self.worker_count,
            sessions: self.hub.count(),
            sessions_per_account: self.hub.list(),
            queue: self.queue.stats(),
            dead_letters: self.dead_letters.len(),
        }
    }

    /// Stop accepting events and wait for the workers to settle their current attempts.
    /// Queued tasks stay queued.  Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        self.queue.close();
        let pool = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| {
                log::error!("{}", &poisoned);
                poisoned.into_inner()
            })
            .take();
        if let Some(pool) = pool {
            pool.join().await;
            log::info!("Fan-out engine stopped");
        }
    }
}
