use std::io;
use std::num::ParseIntError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates the connection has been shut down.
    #[error("the connection is closed")]
    ErrClosed,

    /// Indicates the owning port went away while an operation was pending.
    #[error("the owning port is gone")]
    ErrPortGone,

    /// Indicates a send was attempted before the transport connected.
    #[error("transport is not connected")]
    ErrNotConnected,

    /// Indicates a send was attempted on a pruned connection.
    #[error("the connection is pruned")]
    ErrPruned,

    /// Indicates an inbound message failed its integrity check.
    #[error("message integrity mismatch")]
    ErrIntegrityMismatch,

    /// Indicates an inbound request carried the wrong username.
    #[error("username mismatch")]
    ErrMismatchUsername,

    /// Indicates the peer and local agent claim the same role.
    #[error("ICE role conflict")]
    ErrRoleConflict,

    #[error("the STUN message type is not handled by a connection")]
    ErrUnhandledStunMessage,

    #[error("remote ufrag is empty")]
    ErrRemoteUfragEmpty,

    #[error("remote pwd is empty")]
    ErrRemotePwdEmpty,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Stun(#[from] stun::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}
