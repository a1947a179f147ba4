use thiserror::Error;

/// Errors produced by the routing and connection layer.
///
/// Variants carry owned strings so a terminal error can be delivered to a
/// request's completion callback and simultaneously returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No routing is installed: the agent is not ready or already torn down.
    #[error("agent has no routing installed (not ready or shut down)")]
    Shutdown,

    /// The target pipeline is saturated; the caller must back off.
    #[error("pipeline queue is full, caller must back off")]
    Overload,

    /// Replica semantics were requested on a scheme without replicas.
    #[error("replica index {0} is not valid for this bucket type")]
    InvalidReplica(i32),

    #[error("internal error: {0}")]
    Internal(String),

    /// The ownership table has no node for this (vbucket, replica) pair.
    #[error("no node owns vbucket {vbucket} at replica {replica}")]
    NoVbucketOwner { vbucket: u16, replica: u32 },

    /// A resolved server index points past the current server list.
    #[error("server index {0} is out of range for the current topology")]
    InvalidServer(usize),

    #[error("dial {address} failed: {reason}")]
    Dial { address: String, reason: String },

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// A topology document that cannot be normalized into a consistent map.
    #[error("invalid topology document: {0}")]
    InvalidConfig(String),

    #[error("i/o error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

impl From<std::io::Error> for RoutingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
