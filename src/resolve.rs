//! Expands an event into the concrete places it has to go.
//!
//! Resolution is a pure function of the event and the actor graph: the same graph
//! snapshot always yields the same targets, in the same order.
mod err;

pub use err::{GraphErr, ResolutionErr};

use crate::event::{AccountId, ActorId, ActorRef, Event, RemoteActor};
use crate::target::{RemoteInbox, Target};

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use url::Url;

/// Read access to who follows whom, backed by the server's storage.
#[async_trait]
pub trait ActorGraph: Send + Sync {
    async fn followers(&self, actor: &ActorId) -> Result<Vec<ActorRef>, GraphErr>;

    /// Whether deliveries for `actor` may go to its server's shared inbox.
    fn is_inbox_shared(&self, actor: &RemoteActor) -> bool;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Targets {
    /// One entry per physical endpoint, sorted by endpoint.
    pub remote: Vec<RemoteInbox>,
    /// Sorted, without duplicates.
    pub local: Vec<AccountId>,
}

impl Targets {
    pub fn len(&self) -> usize {
        self.remote.len() + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_targets(self) -> Vec<Target> {
        let remote = self.remote.into_iter().map(Target::RemoteInbox);
        let local = self.local.into_iter().map(Target::LocalStream);
        remote.chain(local).collect()
    }
}

pub struct Resolver {
    graph: Arc<dyn ActorGraph>,
}

impl Resolver {
    pub fn new(graph: Arc<dyn ActorGraph>) -> Self {
        Self { graph }
    }

    pub async fn resolve(&self, event: &Event) -> Result<Targets, ResolutionErr> {
        let mut recipients = event.addressees.clone();
        if event.reaches_followers() {
            let followers = self.graph.followers(&event.origin).await.map_err(|cause| {
                ResolutionErr::FollowersUnavailable {
                    actor: event.origin.clone(),
                    cause,
                }
            })?;
            recipients.extend(followers);
        }

        let mut local = BTreeSet::new();
        let mut remote: BTreeMap<Url, RemoteInbox> = BTreeMap::new();

        // a local author sees their own posts on their own stream
        if let ActorId::Local(author) = &event.origin {
            if event.kind.fans_out_to_followers() {
                local.insert(*author);
            }
        }

        for recipient in recipients {
            match recipient {
                ActorRef::Local(account) => {
                    local.insert(account);
                }
                // inbound federation is never re-federated
                ActorRef::Remote(_) if !event.origin.is_local() => (),
                ActorRef::Remote(actor) => {
                    let (endpoint, shared) = self.endpoint_for(&actor);
                    remote
                        .entry(endpoint.clone())
                        .or_insert_with(|| RemoteInbox::new(endpoint, shared))
                        .audience
                        .insert(actor.id);
                }
            }
        }

        let targets = Targets {
            remote: remote.into_values().collect(),
            local: local.into_iter().collect(),
        };
        log::debug!(
            "Resolved {} into {} remote inbox(es) and {} local stream(s)",
            event,
            targets.remote.len(),
            targets.local.len()
        );
        Ok(targets)
    }

    fn endpoint_for(&self, actor: &RemoteActor) -> (Url, bool) {
        match &actor.shared_inbox {
            Some(shared) if self.graph.is_inbox_shared(actor) => (shared.clone(), true),
            _ => (actor.inbox.clone(), false),
        }
    }
}
