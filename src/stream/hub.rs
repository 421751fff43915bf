//! Keeps the table of live stream sessions and multicasts events into them.

use super::session::{Pushed, Session, SessionHandle};
use super::Phase;
use crate::event::{AccountId, Event};

use hashbrown::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Open sessions by account.  Handles keep a weak reference so they can take themselves
/// out when dropped.
pub(super) type SessionTable = RwLock<HashMap<AccountId, Vec<Arc<Session>>>>;

#[derive(Debug)]
pub struct Hub {
    sessions: Arc<SessionTable>,
    high_water: usize,
}

impl Hub {
    pub fn new(high_water: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            high_water,
        }
    }

    pub fn subscribe(&self, account: AccountId) -> SessionHandle {
        let session = Arc::new(Session::new(account, self.high_water));
        log::info!("Opened stream session {} for account {}", session.id(), account);
        self.write()
            .entry(account)
            .or_insert_with(Vec::new)
            .push(Arc::clone(&session));
        SessionHandle::new(session).listed_in(Arc::downgrade(&self.sessions))
    }

    pub fn unsubscribe(&self, handle: &SessionHandle) {
        let target = handle.session();
        target.close();
        forget(&self.sessions, target);
        log::info!("Ended stream session {} for account {}", target.id(), target.account());
    }

    /// Push `event` into every open session of every account in `accounts`.  Never waits on
    /// a consumer.  Returns how many sessions took the event.
    pub fn publish(&self, event: &Arc<Event>, accounts: &[AccountId]) -> usize {
        let (mut reached, mut saw_closed) = (0, false);
        {
            let table = self.read();
            for session in accounts.iter().filter_map(|a| table.get(a)).flatten() {
                match session.push(Arc::clone(event)) {
                    Ok(Pushed::Queued) => reached += 1,
                    Ok(Pushed::Evicted(oldest)) => {
                        log::debug!(
                            "Session {} is behind; evicted {} to make room",
                            session.id(),
                            oldest
                        );
                        reached += 1
                    }
                    Ok(Pushed::Stale) => {
                        log::debug!("Session {} already has {}; skipped", session.id(), event)
                    }
                    Err(_closed) => saw_closed |= session.phase() == Phase::Closed,
                }
            }
        }
        if saw_closed {
            self.prune();
        }
        reached
    }

    /// Live sessions across all accounts.
    pub fn count(&self) -> usize {
        self.read()
            .values()
            .flatten()
            .filter(|session| session.phase() != Phase::Closed)
            .count()
    }

    /// Live sessions per account, ordered by account.
    pub fn list(&self) -> Vec<(AccountId, usize)> {
        let mut per_account: Vec<_> = self
            .read()
            .iter()
            .map(|(account, sessions)| {
                let live = sessions.iter().filter(|s| s.phase() != Phase::Closed).count();
                (*account, live)
            })
            .filter(|(_, live)| *live > 0)
            .collect();
        per_account.sort();
        per_account
    }

    fn prune(&self) {
        let mut table = self.write();
        for sessions in table.values_mut() {
            sessions.retain(|session| session.phase() != Phase::Closed);
        }
        table.retain(|_, sessions| !sessions.is_empty());
    }

    fn read(&self) -> RwLockReadGuard<HashMap<AccountId, Vec<Arc<Session>>>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            log::error!("{}", &poisoned);
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<HashMap<AccountId, Vec<Arc<Session>>>> {
        write(&self.sessions)
    }
}

/// Drop `target` from the table, and its account's entry with it once that is empty.
pub(super) fn forget(table: &SessionTable, target: &Session) {
    let mut table = write(table);
    if let Some(sessions) = table.get_mut(&target.account()) {
        sessions.retain(|session| session.id() != target.id());
        if sessions.is_empty() {
            table.remove(&target.account());
        }
    }
}

fn write(table: &SessionTable) -> RwLockWriteGuard<HashMap<AccountId, Vec<Arc<Session>>>> {
    table.write().unwrap_or_else(|poisoned| {
        log::error!("{}", &poisoned);
        poisoned.into_inner()
    })
}
