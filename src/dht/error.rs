use thiserror::Error;

/// Errors surfaced by the DHT node.
///
/// Only construction and [`start`](super::DhtNode::start) report errors;
/// once running, the node participates best-effort and logs problems
/// instead of propagating them.
#[derive(Debug, Error)]
pub enum DhtError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid node id: expected 40 hex characters")]
    InvalidNodeId,

    #[error("invalid port: 0 is not a usable port")]
    InvalidPort,

    #[error("node has been stopped and cannot be restarted")]
    Stopped,
}
