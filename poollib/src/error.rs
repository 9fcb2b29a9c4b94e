use std::{io, result};
use thiserror;

/// Failures of a single sandboxed execution.
#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("failed to create scratch directory: {0}")]
    ScratchDir(#[source] io::Error),
    #[error("failed to spawn job process: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to collect job output: {0}")]
    Output(#[source] io::Error),
    #[error("sandbox is shut down")]
    Closed,
}

/// Failures reported by the cluster transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("peer {peer} is unreachable: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error("request to {peer} timed out")]
    Timeout { peer: String },
    #[error("peer {peer} failed the request: {message}")]
    Remote { peer: String, message: String },
    #[error("invalid peer address {0:?}")]
    InvalidAddress(String),
    #[error("not joined to a cluster")]
    NotJoined,
    #[error("transport is shut down")]
    Closed,
}

/// Failures of the pool-facing api.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("No workers available")]
    NoWorkersAvailable,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("worker {0} sent a reply that does not match the request")]
    UnexpectedReply(String),
    #[error("membership tracker exited")]
    MembershipClosed,
}

pub type Result<T> = result::Result<T, PoolError>;
