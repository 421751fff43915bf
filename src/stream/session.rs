//! One live streaming connection and its bounded outbound buffer.
//!
//! The hub pushes without ever waiting; the transport that owns the connection drains the
//! buffer with `recv`.  When the buffer is at its high-water mark the oldest buffered event
//! is evicted to make room: a slow consumer loses history, it never stalls the publisher.

use super::hub::{self, SessionTable};
use super::SessionClosed;
use crate::event::{AccountId, ActorId, Event};

use hashbrown::HashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Open,
    /// The client went away; what is buffered may still be flushed, nothing new is taken.
    Draining,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pushed {
    Queued,
    /// Queued after evicting this (the oldest) event.
    Evicted(Arc<Event>),
    /// Dropped: the session already saw this or a later event from the same origin.
    Stale,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    account: AccountId,
    high_water: usize,
    state: Mutex<SessionState>,
    ready: Notify,
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    buffer: VecDeque<Arc<Event>>,
    last_seq: HashMap<ActorId, u64>,
    evicted: u64,
}

impl Session {
    pub(crate) fn new(account: AccountId, high_water: usize) -> Self {
        let high_water = high_water.max(1);
        Self {
            id: Uuid::new_v4(),
            account,
            high_water,
            state: Mutex::new(SessionState {
                phase: Phase::Open,
                buffer: VecDeque::with_capacity(high_water),
                last_seq: HashMap::new(),
                evicted: 0,
            }),
            ready: Notify::new(),
        }
    }

    pub fn push(&self, event: Arc<Event>) -> Result<Pushed, SessionClosed> {
        let mut state = self.lock();
        if state.phase != Phase::Open {
            return Err(SessionClosed);
        }
        match state.last_seq.get(&event.origin) {
            Some(&last) if event.seq <= last => return Ok(Pushed::Stale),
            _ => (),
        }
        state.last_seq.insert(event.origin.clone(), event.seq);

        let evicted = if state.buffer.len() >= self.high_water {
            state.evicted += 1;
            state.buffer.pop_front()
        } else {
            None
        };
        state.buffer.push_back(event);
        drop(state);
        self.ready.notify_one();

        Ok(match evicted {
            Some(oldest) => Pushed::Evicted(oldest),
            None => Pushed::Queued,
        })
    }

    /// The next buffered event, waiting for one if the session is open and empty.
    ///
    /// Returns `None` once the session is closed, or once a draining session has been
    /// flushed (which closes it).
    pub async fn recv(&self) -> Option<Arc<Event>> {
        loop {
            let woken = self.ready.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(event) = state.buffer.pop_front() {
                    return Some(event);
                }
                match state.phase {
                    Phase::Open => (),
                    Phase::Draining => {
                        state.finish();
                        return None;
                    }
                    Phase::Closed => return None,
                }
            }
            woken.await;
        }
    }

    pub fn try_recv(&self) -> Option<Arc<Event>> {
        let mut state = self.lock();
        let event = state.buffer.pop_front();
        if event.is_none() && state.phase == Phase::Draining {
            state.finish();
        }
        event
    }

    /// The client disconnected: stop taking events and let the buffer drain.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Open {
            state.phase = Phase::Draining;
            if state.buffer.is_empty() {
                state.finish();
            }
        }
        drop(state);
        self.ready.notify_waiters();
    }

    /// Close the session and release its buffer.  Returns `false` if it was already
    /// closed.
    pub fn close(&self) -> bool {
        let released = {
            let mut state = self.lock();
            if state.phase == Phase::Closed {
                return false;
            }
            state.finish()
        };
        drop(released);
        self.ready.notify_waiters();
        true
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events this session lost to the drop-oldest policy.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    fn lock(&self) -> MutexGuard<SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::error!("{}", &poisoned);
            poisoned.into_inner()
        })
    }
}

impl SessionState {
    fn finish(&mut self) -> VecDeque<Arc<Event>> {
        self.phase = Phase::Closed;
        self.last_seq = HashMap::new();
        std::mem::take(&mut self.buffer)
    }
}

/// The transport's handle on a session.  Dropping it closes the session.
#[derive(Debug)]
pub struct SessionHandle {
    session: Arc<Session>,
    table: Weak<SessionTable>,
}

impl SessionHandle {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            table: Weak::new(),
        }
    }

    /// Take the session out of `table` when this handle is dropped.
    pub(super) fn listed_in(self, table: Weak<SessionTable>) -> Self {
        let mut handle = self;
        handle.table = table;
        handle
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl std::ops::Deref for SessionHandle {
    type Target = Session;
    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.session.close() {
            log::info!(
                "Stream session {} for account {} dropped",
                self.session.id,
                self.session.account
            );
        }
        if let Some(table) = self.table.upgrade() {
            hub::forget(&table, &self.session);
        }
    }
}
