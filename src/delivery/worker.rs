//! The pool of tasks that drain the delivery queue.

use super::dead_letter::{DeadLetterReason, DeadLetterStore};
use super::queue::{DeliveryQueue, Lease};
use super::retry::RetryScheduler;
use super::{PermanentDeliveryErr, TransientDeliveryErr, TransportErr};
use crate::event::Event;
use crate::target::RemoteInbox;

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use warp::http::StatusCode;

pub type WorkerId = usize;

/// Signed HTTP delivery to a remote inbox.  Resolving the event's payload and signing the
/// request are the implementor's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver_signed(&self, inbox: &RemoteInbox, event: &Event) -> Result<StatusCode, TransportErr>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Delivered,
    Rejected(PermanentDeliveryErr),
    Failed(TransientDeliveryErr),
}

impl Outcome {
    pub fn classify(response: Result<StatusCode, TransientDeliveryErr>) -> Self {
        match response {
            Ok(status) if status.is_success() => Self::Delivered,
            Ok(status) if status == StatusCode::TOO_MANY_REQUESTS => {
                Self::Failed(TransientDeliveryErr::Status(429))
            }
            Ok(status) if status.is_client_error() => {
                Self::Rejected(PermanentDeliveryErr::Status(status.as_u16()))
            }
            Ok(status) => Self::Failed(TransientDeliveryErr::Status(status.as_u16())),
            Err(e) => Self::Failed(e),
        }
    }
}

/// Everything a worker needs; shared by the whole pool.
pub(crate) struct WorkerContext {
    pub(crate) queue: Arc<DeliveryQueue>,
    pub(crate) retry: RetryScheduler,
    pub(crate) dead_letters: Arc<DeadLetterStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) deadline: Duration,
}

impl WorkerContext {
    /// Make one attempt at the leased task and settle the lease.  A panicking transport
    /// counts as a transient failure of this task only.
    pub(crate) async fn attempt(&self, lease: Lease) -> Outcome {
        let response = {
            let task = lease.task();
            let send = AssertUnwindSafe(self.transport.deliver_signed(task.inbox(), task.event()));
            match timeout(self.deadline, send.catch_unwind()).await {
                Ok(Ok(response)) => response.map_err(TransientDeliveryErr::from),
                Ok(Err(panic)) => {
                    let msg = panic_message(panic.as_ref());
                    log::error!("Transport panicked delivering task {}: {}", task.id(), msg);
                    Err(TransientDeliveryErr::Crashed(msg))
                }
                Err(_elapsed) => Err(TransientDeliveryErr::Timeout(self.deadline)),
            }
        };

        let outcome = Outcome::classify(response);
        match &outcome {
            Outcome::Delivered => {
                let task = self.queue.complete(lease);
                log::debug!(
                    "Delivered {} to {} on attempt {}",
                    task.event(),
                    task.inbox().endpoint,
                    task.attempts()
                );
            }
            Outcome::Rejected(e) => {
                let task = self.queue.complete(lease);
                self.dead_letters
                    .bury(task, DeadLetterReason::Rejected(e.clone()));
            }
            Outcome::Failed(e) => {
                self.retry.retry(lease, e.clone());
            }
        }
        outcome
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn spawn(size: usize, ctx: Arc<WorkerContext>) -> Self {
        let handles = (0..size.max(1))
            .map(|id| tokio::spawn(run(id, Arc::clone(&ctx))))
            .collect();
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to finish its current attempt and exit.  Only returns once
    /// the queue has been closed.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Delivery worker ended abnormally: {}", e);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    match (panic.downcast_ref::<&str>(), panic.downcast_ref::<String>()) {
        (Some(msg), _) => msg.to_string(),
        (_, Some(msg)) => msg.clone(),
        _ => "unknown panic".to_string(),
    }
}

async fn run(id: WorkerId, ctx: Arc<WorkerContext>) {
    log::info!("Delivery worker {} started", id);
    while let Some(lease) = ctx.queue.dequeue(id).await {
        ctx.attempt(lease).await;
    }
    log::info!("Delivery worker {} stopped", id);
}
