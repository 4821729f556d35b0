use thiserror::Error;

/// Irrecoverable session failures. Every one of these lands the state
/// machine in `Failed` and is shown to the user with an explanation; an
/// orderly remote hang-up is not among them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera/microphone permission was denied")]
    PermissionDenied,

    #[error("no usable capture device: {0}")]
    DeviceUnavailable(String),

    #[error("timed out waiting for the host's offer")]
    NegotiationTimeout,

    #[error("peer transport failed: {0}")]
    Transport(String),

    #[error("the other participant disconnected")]
    PeerGone,

    #[error("the relay no longer knows this session")]
    SessionNotFound,

    #[error("relay rejected the request: {0}")]
    Relay(String),

    #[error("lost the relay connection before the call was established")]
    RelayLost,
}
