use std::fmt;

/// A push reached a session that is draining or closed.  The publisher ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

impl std::error::Error for SessionClosed {}

impl fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "the stream session no longer accepts events")
    }
}
