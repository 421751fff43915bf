use crate::delivery::QueueErr;
use crate::resolve::ResolutionErr;

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineErr {
    /// The delivery queue has no room for this event's remote targets.  Nothing was
    /// delivered or streamed; the caller may retry the whole event later.
    Busy,
    Resolution(ResolutionErr),
    ShuttingDown,
}

impl std::error::Error for EngineErr {}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use EngineErr::*;
        match self {
            Busy => write!(f, "the delivery queue is full; try again later"),
            Resolution(e) => write!(f, "could not resolve the event's targets: {}", e),
            ShuttingDown => write!(f, "the fan-out engine is shutting down"),
        }
    }
}

impl From<QueueErr> for EngineErr {
    fn from(e: QueueErr) -> Self {
        match e {
            QueueErr::Full => Self::Busy,
            QueueErr::Closed => Self::ShuttingDown,
        }
    }
}

impl From<ResolutionErr> for EngineErr {
    fn from(e: ResolutionErr) -> Self {
        Self::Resolution(e)
    }
}
