//! Unified error type for the lioncloud client.
//!
//! The original C implementation overloads `-1`/`NULL` for every failure
//! (see the upstream `lcloud_*.c` sources this crate is ported from). This
//! module collapses that into a typed sum distinguishing the five error
//! kinds the protocol and filesystem layer can hit; nothing here retries or
//! recovers — every error aborts the current operation (`Session` methods
//! return `Err` immediately, they never attempt to repair state).

use thiserror::Error;

/// Precondition violations against [`crate::filesystem::Session`] state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("file handle {0} is unknown or not open")]
    UnknownHandle(i32),
    #[error("path {0:?} is already open")]
    AlreadyOpen(String),
    #[error("seek offset {off} exceeds file size {size}")]
    SeekPastEof { off: usize, size: usize },
    #[error("device cluster is powered off")]
    PoweredOff,
    #[error("device cluster is already powered off")]
    AlreadyShutdown,
}

/// Top-level error returned by every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum LcError {
    /// Socket create/connect/read/write failure, short read, unexpected EOF.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response predicate failed, or an echoed opcode/device id didn't match.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Cipher open/setkey/setiv/encrypt/decrypt failure.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// A precondition of the filesystem API was violated.
    #[error("state error: {0}")]
    State(#[from] StateError),
    /// Cache or block-map allocation failure, or cluster exhaustion.
    #[error("resource error: {0}")]
    Resource(String),
}

impl From<std::io::Error> for LcError {
    fn from(e: std::io::Error) -> Self {
        LcError::Transport(e.to_string())
    }
}

pub type LcResult<T> = Result<T, LcError>;
