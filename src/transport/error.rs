use std::io;

/// Failure of a single transport operation.
///
/// None of these are fatal to the control loop: a command that fails to go
/// out is superseded by the next tick's decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// A read exceeded its deadline. Expected when the server is quiet.
    Timeout,
    /// The socket reported a hard error, or no connection is currently up.
    Disconnected(String),
    /// The client was shut down.
    Closed,
    /// The message cannot be framed (embedded line break).
    InvalidMessage(String),
}

impl TransportError {
    /// Classify a read error. Timeouts surface as `WouldBlock` on Unix and
    /// `TimedOut` on Windows.
    pub fn from_read(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Disconnected(err.to_string()),
        }
    }

    /// Classify a write error. A timed-out write leaves the stream in an
    /// unknown state, so it is treated as a disconnect.
    pub fn from_write(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                TransportError::Disconnected(format!("send timed out: {}", err))
            }
            _ => TransportError::Disconnected(err.to_string()),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "transport timeout"),
            TransportError::Disconnected(reason) => write!(f, "transport disconnected: {}", reason),
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::InvalidMessage(reason) => write!(f, "invalid message: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}
