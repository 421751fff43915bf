//! Terminal storage for deliveries that were refused or ran out of retries.
//!
//! Entries are immutable and stay until an operator discards (or redrives) them; nothing
//! in the engine purges them on its own.
use super::task::{DeliveryTask, TaskId};
use super::{PermanentDeliveryErr, TransientDeliveryErr};
use crate::event::Event;
use crate::target::RemoteInbox;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "error", rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The remote refused the content.
    Rejected(PermanentDeliveryErr),
    /// Every allowed attempt failed; this is the last error seen.
    Exhausted(TransientDeliveryErr),
}

#[derive(Serialize, Debug)]
pub struct DeadLetter {
    pub id: TaskId,
    pub event: Arc<Event>,
    pub inbox: RemoteInbox,
    pub attempts: u32,
    pub reason: DeadLetterReason,
    pub dead_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct DeadLetterStore {
    entries: Mutex<BTreeMap<TaskId, Arc<DeadLetter>>>,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bury(&self, task: DeliveryTask, reason: DeadLetterReason) -> Arc<DeadLetter> {
        log::warn!(
            "Dead-lettering delivery of {} to {} after {} attempt(s): {:?}",
            task.event,
            task.inbox.endpoint,
            task.attempts,
            reason
        );
        let letter = Arc::new(DeadLetter {
            id: task.id,
            event: task.event,
            inbox: task.inbox,
            attempts: task.attempts,
            reason,
            dead_at: SystemTime::now(),
        });
        self.lock().insert(letter.id, Arc::clone(&letter));
        letter
    }

    /// Every dead letter, oldest task first.
    pub fn list(&self) -> Vec<Arc<DeadLetter>> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<DeadLetter>> {
        self.lock().get(&id).cloned()
    }

    pub fn discard(&self, id: TaskId) -> Option<Arc<DeadLetter>> {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            log::info!("Discarded dead letter {}", id);
        }
        removed
    }

    /// Put back an entry taken out by `discard` (a redrive that could not be queued).
    pub(crate) fn restore(&self, letter: Arc<DeadLetter>) {
        self.lock().insert(letter.id, letter);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<BTreeMap<TaskId, Arc<DeadLetter>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::error!("{}", &poisoned);
            poisoned.into_inner()
        })
    }
}
