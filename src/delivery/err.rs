use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A failure that is worth trying again later.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TransientDeliveryErr {
    Status(u16),
    Network(String),
    Timeout(Duration),
    /// The transport panicked mid-attempt.
    Crashed(String),
}

/// The remote server refused the delivery; retrying would not change its answer.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PermanentDeliveryErr {
    Status(u16),
}

/// What a `Transport` reports when no HTTP response came back at all.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportErr(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErr {
    Full,
    Closed,
}

impl std::error::Error for TransientDeliveryErr {}
impl std::error::Error for PermanentDeliveryErr {}
impl std::error::Error for TransportErr {}
impl std::error::Error for QueueErr {}

impl fmt::Display for TransientDeliveryErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use TransientDeliveryErr::*;
        match self {
            Status(code) => write!(f, "remote inbox answered with status {}", code),
            Network(e) => write!(f, "could not reach the remote inbox: {}", e),
            Timeout(after) => write!(f, "delivery attempt timed out after {:?}", after),
            Crashed(msg) => write!(f, "the transport panicked: {}", msg),
        }
    }
}

impl fmt::Display for PermanentDeliveryErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Self::Status(code) => write!(f, "remote inbox rejected the delivery with status {}", code),
        }
    }
}

impl fmt::Display for TransportErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for QueueErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Self::Full => write!(f, "the delivery queue is at capacity"),
            Self::Closed => write!(f, "the delivery queue is closed"),
        }
    }
}

impl From<TransportErr> for TransientDeliveryErr {
    fn from(e: TransportErr) -> Self {
        Self::Network(e.0)
    }
}
