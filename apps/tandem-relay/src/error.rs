use thiserror::Error;

/// Structural errors raised while mutating the queue or the session
/// registry. All of them are answered with a direct response to the
/// offending client; none of them tear down the handler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("already waiting in the matchmaking queue")]
    AlreadyQueued,

    #[error("already in an active session")]
    AlreadyInSession,

    #[error("a session requires two distinct participants")]
    InvalidPair,
}
