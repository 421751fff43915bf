use crate::event::AccountId;

use serde::Serialize;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use url::Url;

/// Where one copy of an event goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    RemoteInbox(RemoteInbox),
    LocalStream(AccountId),
}

/// A physical inbox on another server.
///
/// Equality and hashing only look at the endpoint: two recipients behind the same shared
/// inbox are one target, and `audience` lists everyone the payload is addressed to.
#[derive(Serialize, Debug, Clone)]
pub struct RemoteInbox {
    pub endpoint: Url,
    pub shared: bool,
    pub audience: BTreeSet<Url>,
}

impl RemoteInbox {
    pub fn new(endpoint: Url, shared: bool) -> Self {
        Self {
            endpoint,
            shared,
            audience: BTreeSet::new(),
        }
    }
}

impl PartialEq for RemoteInbox {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}
impl Eq for RemoteInbox {}

impl Hash for RemoteInbox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state)
    }
}
