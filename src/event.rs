mod actor;
mod id;
mod visibility;

pub use actor::{ActorId, ActorRef, RemoteActor};
pub use id::Id;
pub use visibility::Visibility;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// A local account.  Stream sessions are keyed by the account they were opened for.
pub type AccountId = Id;

/// Something that happened, as handed to the engine by the ingestion boundary.
///
/// Events are immutable once built.  The engine shares them behind an `Arc`, so an event
/// lives exactly as long as the last delivery task or stream buffer that refers to it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    /// Assigned at ingestion; strictly increasing per `origin`.
    pub seq: u64,
    pub kind: EventKind,
    pub origin: ActorId,
    pub payload: PayloadRef,
    pub visibility: Visibility,
    /// Actors the event is addressed to directly (mentions, the followed account, the
    /// author of a liked status, ...).
    #[serde(default)]
    pub addressees: Vec<ActorRef>,
    pub created_at: SystemTime,
}

impl Event {
    pub fn new(seq: u64, kind: EventKind, origin: ActorId, payload: impl Into<PayloadRef>) -> Self {
        Self {
            seq,
            kind,
            origin,
            payload: payload.into(),
            visibility: Visibility::Public,
            addressees: Vec::new(),
            created_at: SystemTime::now(),
        }
    }

    pub fn with_visibility(self, visibility: Visibility) -> Self {
        Self { visibility, ..self }
    }

    pub fn addressed_to(mut self, actor: ActorRef) -> Self {
        self.addressees.push(actor);
        self
    }

    /// Followers of the origin receive the event unless it is addressed privately.
    pub fn reaches_followers(&self) -> bool {
        self.kind.fans_out_to_followers() && self.visibility != Visibility::Direct
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} #{} from {}", self.kind, self.seq, self.origin)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Follow,
    Accept,
    Reject,
    Like,
    Announce,
    Undo,
    Block,
}

impl EventKind {
    pub fn fans_out_to_followers(self) -> bool {
        use EventKind::*;
        matches!(self, Create | Update | Delete | Announce)
    }

    /// The event name a streaming client sees for this kind.
    pub fn stream_name(self) -> &'static str {
        use EventKind::*;
        match self {
            Create | Announce => "update",
            Update => "status.update",
            Delete => "delete",
            Follow | Accept | Reject | Like | Undo | Block => "notification",
        }
    }
}

/// Opaque handle to the rendered payload of an event (a URI or a pre-rendered document).
/// Only the transport and the streaming client ever look inside.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PayloadRef(pub String);

impl From<&str> for PayloadRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
impl From<String> for PayloadRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}
