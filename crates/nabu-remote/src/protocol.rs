//! Messages exchanged between callers and the worker thread.

use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use crate::error::RemoteError;
use crate::hooks::FrameHook;

/// Correlates a reply with its request. Unique per worker.
pub type CallId = u64;

/// Result carried by a reply.
pub type Outcome = Result<Value, RemoteError>;

/// Scopes messages to one engine on a shared worker.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller to worker.
pub enum Request<S> {
    /// Moves `surface` to the worker and creates an engine for it.
    Init {
        instance: InstanceId,
        call: CallId,
        surface: S,
    },
    CallMethod {
        instance: InstanceId,
        call: CallId,
        method: String,
        args: Vec<Value>,
        await_reply: bool,
    },
    EvalFn {
        instance: InstanceId,
        call: CallId,
        key: String,
        hook: FrameHook,
        repeat: bool,
        await_reply: bool,
    },
    Dispose {
        instance: InstanceId,
    },
}

impl<S> Request<S> {
    pub fn instance(&self) -> InstanceId {
        match self {
            Self::Init { instance, .. }
            | Self::CallMethod { instance, .. }
            | Self::EvalFn { instance, .. }
            | Self::Dispose { instance } => *instance,
        }
    }

    pub fn call(&self) -> Option<CallId> {
        match self {
            Self::Init { call, .. } | Self::CallMethod { call, .. } | Self::EvalFn { call, .. } => {
                Some(*call)
            }
            Self::Dispose { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::CallMethod { .. } => "CALL_METHOD",
            Self::EvalFn { .. } => "EVAL_FN",
            Self::Dispose { .. } => "DISPOSE",
        }
    }
}

impl<S> fmt::Debug for Request<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.kind());
        s.field("instance", &self.instance());
        if let Some(call) = self.call() {
            s.field("call", &call);
        }
        match self {
            Self::CallMethod { method, await_reply, .. } => {
                s.field("method", method).field("await", await_reply);
            }
            Self::EvalFn { key, repeat, await_reply, .. } => {
                s.field("key", key).field("repeat", repeat).field("await", await_reply);
            }
            Self::Init { .. } | Self::Dispose { .. } => {}
        }
        s.finish_non_exhaustive()
    }
}

/// Worker to caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Reply { call: CallId, outcome: Outcome },
    /// A request could not be routed; `call` is absent for DISPOSE.
    Error {
        call: Option<CallId>,
        error: RemoteError,
    },
}

impl Response {
    pub fn call(&self) -> Option<CallId> {
        match self {
            Self::Reply { call, .. } => Some(*call),
            Self::Error { call, .. } => *call,
        }
    }
}
