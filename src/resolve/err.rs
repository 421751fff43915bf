use crate::event::ActorId;

use std::fmt;

/// The actor graph could not answer (storage unavailable, query failed, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct GraphErr(pub String);

/// Targets for an event could not be computed.  The ingestion layer retries the event.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionErr {
    FollowersUnavailable { actor: ActorId, cause: GraphErr },
}

impl std::error::Error for GraphErr {}
impl std::error::Error for ResolutionErr {}

impl fmt::Display for GraphErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ResolutionErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use ResolutionErr::*;
        match self {
            FollowersUnavailable { actor, cause } => {
                write!(f, "could not look up the followers of {}.\n{:7}{}", actor, "", cause)
            }
        }
    }
}
