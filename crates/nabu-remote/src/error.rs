use thiserror::Error;

use crate::protocol::InstanceId;

/// Failures of remote calls as seen by the caller.
///
/// Engine errors raised on the worker arrive as [`RemoteError::Remote`]
/// carrying the rendered message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("unknown remote instance {0}")]
    UnknownRemoteInstance(InstanceId),

    #[error("unknown remote method {0}")]
    UnknownRemoteMethod(String),

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error("{0}")]
    Remote(String),

    #[error("failed to encode or decode a value: {0}")]
    Encode(String),

    #[error("call cancelled before a reply arrived")]
    Cancelled,

    #[error("worker thread is gone")]
    WorkerGone,
}

impl From<nabu_engine::EngineError> for RemoteError {
    fn from(err: nabu_engine::EngineError) -> Self {
        Self::Remote(err.to_string())
    }
}
