//! Live streaming to connected local clients.
//!
//! The `Hub` owns the table of open sessions; each `Session` owns a bounded buffer that the
//! connection's transport drains.  Publishing never blocks: a full buffer drops its oldest
//! event instead.
mod err;
mod hub;
mod session;
mod sse;

pub use err::SessionClosed;
pub use hub::Hub;
pub use session::{Phase, Pushed, Session, SessionHandle};
pub use sse::Sse;
