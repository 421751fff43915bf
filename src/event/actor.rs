use super::Id;

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Who an event came from.  Sequence numbers are ordered per `ActorId`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ActorId {
    Local(Id),
    Remote(Url),
}

impl ActorId {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{}", id),
            Self::Remote(uri) => write!(f, "{}", uri),
        }
    }
}

/// An actor on another server, as known to the actor graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteActor {
    pub id: Url,
    pub inbox: Url,
    pub shared_inbox: Option<Url>,
}

/// A recipient: either an account on this server or an actor elsewhere.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActorRef {
    Local(Id),
    Remote(RemoteActor),
}
