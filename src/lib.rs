//! Event fan-out for a federated social server
//!
//!
//! When something happens on the server (a post, a like, a follow) the ingestion layer hands
//! the resulting `Event` to an `Engine`.  The engine works out everyone who should see it and
//! gets it to them: signed HTTP deliveries to other servers' inboxes, and live pushes to the
//! streaming clients of local accounts.
//!
//! # Notes on data flow
//! * **Ingestion → Resolver**:
//! `Engine::submit` asks the `Resolver` for the event's targets.  The resolver reads the
//! follower graph through the `ActorGraph` trait and returns one `RemoteInbox` per physical
//! endpoint (recipients behind a shared inbox collapse into one) plus the local accounts
//! with an interest in the event.
//!
//! * **Resolver → DeliveryQueue**:
//! Every remote inbox becomes a `DeliveryTask` in the bounded `DeliveryQueue`.  Admission is
//! all or nothing per event; a full queue turns into `EngineErr::Busy` before anything has
//! been delivered or streamed.
//!
//! * **DeliveryQueue → Workers → RetryScheduler**:
//! A fixed pool of workers leases tasks from the queue and calls the `Transport` under a
//! deadline.  Transient failures go back to the queue with an exponential backoff; permanent
//! failures, and tasks that run out of attempts, end up in the `DeadLetterStore` until an
//! operator discards or redrives them.
//!
//! * **Resolver → Hub → Session**:
//! Local targets are pushed into every open `Session` of each account.  Publishing never
//! waits for a slow client: a full session buffer drops its oldest event.  The connection's
//! transport drains the session (see `stream::Sse`).

pub mod admin;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod err;
pub mod event;
pub mod resolve;
pub mod stream;
pub mod target;

pub use engine::{Engine, EngineErr, Receipt, Redrive, Stats};
pub use event::{AccountId, ActorId, ActorRef, Event, EventKind, RemoteActor, Visibility};
pub use target::{RemoteInbox, Target};
