use super::TransientDeliveryErr;
use crate::event::{ActorId, Event};
use crate::target::RemoteInbox;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivery obligation: a single event to a single remote inbox.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub(crate) id: TaskId,
    pub(crate) event: Arc<Event>,
    pub(crate) inbox: RemoteInbox,
    pub(crate) attempts: u32,
    pub(crate) next_eligible: Instant,
    pub(crate) last_error: Option<TransientDeliveryErr>,
    pub(crate) last_backoff: Duration,
}

impl DeliveryTask {
    pub(super) fn new(id: TaskId, event: Arc<Event>, inbox: RemoteInbox) -> Self {
        Self {
            id,
            event,
            inbox,
            attempts: 0,
            next_eligible: Instant::now(),
            last_error: None,
            last_backoff: Duration::ZERO,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }
    pub fn inbox(&self) -> &RemoteInbox {
        &self.inbox
    }
    /// Attempts started so far, including one currently in flight.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
    pub fn next_eligible(&self) -> Instant {
        self.next_eligible
    }
    pub fn last_error(&self) -> Option<&TransientDeliveryErr> {
        self.last_error.as_ref()
    }
    pub fn last_backoff(&self) -> Duration {
        self.last_backoff
    }

    pub(super) fn key(&self) -> TaskKey {
        TaskKey::new(&self.event, &self.inbox)
    }
}

/// Identifies the (event, target) pair a task delivers.  The queue holds at most one task
/// per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct TaskKey {
    origin: ActorId,
    seq: u64,
    endpoint: Url,
}

impl TaskKey {
    pub(super) fn new(event: &Event, inbox: &RemoteInbox) -> Self {
        Self {
            origin: event.origin.clone(),
            seq: event.seq,
            endpoint: inbox.endpoint.clone(),
        }
    }
}
