//! Awaited calls waiting for their reply.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RemoteError;
use crate::protocol::{CallId, InstanceId, Outcome};

/// Resolvers of in-flight awaited calls, shared by the proxies of one worker
/// and its response router.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    calls: HashMap<CallId, (InstanceId, oneshot::Sender<Outcome>)>,
}

impl PendingTable {
    pub fn register(&mut self, call: CallId, instance: InstanceId) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(call, (instance, tx));
        rx
    }

    /// Resolves `call`. Returns `false` when it is unknown or already settled.
    pub fn settle(&mut self, call: CallId, outcome: Outcome) -> bool {
        let Some((_, tx)) = self.calls.remove(&call) else {
            return false;
        };
        if tx.send(outcome).is_err() {
            log::debug!("reply for call {call} arrived after its caller went away");
        }
        true
    }

    pub fn forget(&mut self, call: CallId) {
        self.calls.remove(&call);
    }

    /// Fails every call of `instance` with [`RemoteError::Cancelled`].
    pub fn cancel_instance(&mut self, instance: InstanceId) -> usize {
        let calls: Vec<CallId> = self
            .calls
            .iter()
            .filter(|(_, (owner, _))| *owner == instance)
            .map(|(call, _)| *call)
            .collect();
        for call in &calls {
            self.settle(*call, Err(RemoteError::Cancelled));
        }
        calls.len()
    }

    pub fn fail_all(&mut self, error: RemoteError) {
        for (_, (_, tx)) in self.calls.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

enum ReplyState {
    Waiting(oneshot::Receiver<Outcome>),
    Done(Option<Outcome>),
}

/// Reply to an awaited call.
///
/// The request is already posted when this value exists; awaiting it only
/// waits for the worker's answer.
pub struct Reply {
    state: ReplyState,
}

impl Reply {
    pub(crate) fn waiting(rx: oneshot::Receiver<Outcome>) -> Self {
        Self {
            state: ReplyState::Waiting(rx),
        }
    }

    pub(crate) fn done(outcome: Outcome) -> Self {
        Self {
            state: ReplyState::Done(Some(outcome)),
        }
    }

    /// Decodes the reply value as `T`.
    pub fn typed<T: DeserializeOwned>(self) -> TypedReply<T> {
        TypedReply {
            reply: self,
            _marker: PhantomData,
        }
    }
}

impl Future for Reply {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        match &mut self.get_mut().state {
            ReplyState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(RemoteError::Cancelled))),
            ReplyState::Done(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(Err(RemoteError::Cancelled)))
            }
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ReplyState::Waiting(_) => "waiting",
            ReplyState::Done(_) => "done",
        };
        f.debug_struct("Reply").field("state", &state).finish()
    }
}

/// [`Reply`] decoded into the operation's result type.
#[derive(Debug)]
pub struct TypedReply<T> {
    reply: Reply,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Future for TypedReply<T> {
    type Output = Result<T, RemoteError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.reply).poll(cx).map(|outcome| {
            outcome.and_then(|value: Value| {
                serde_json::from_value(value).map_err(|e| RemoteError::Encode(e.to_string()))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settles_exactly_once() {
        let mut table = PendingTable::default();
        let instance = InstanceId::new();
        let rx = table.register(7, instance);

        assert!(table.settle(7, Ok(Value::from(1))));
        assert!(!table.settle(7, Ok(Value::from(2))));
        assert_eq!(Reply::waiting(rx).await, Ok(Value::from(1)));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn cancel_only_touches_one_instance() {
        let mut table = PendingTable::default();
        let (a, b) = (InstanceId::new(), InstanceId::new());
        let a1 = table.register(1, a);
        let a2 = table.register(2, a);
        let b1 = table.register(3, b);

        assert_eq!(table.cancel_instance(a), 2);
        assert_eq!(Reply::waiting(a1).await, Err(RemoteError::Cancelled));
        assert_eq!(Reply::waiting(a2).await, Err(RemoteError::Cancelled));

        assert_eq!(table.len(), 1);
        table.fail_all(RemoteError::WorkerGone);
        assert_eq!(Reply::waiting(b1).await, Err(RemoteError::WorkerGone));
    }

    #[tokio::test]
    async fn dropped_resolver_reads_as_cancelled() {
        let mut table = PendingTable::default();
        let rx = table.register(1, InstanceId::new());
        table.forget(1);
        assert_eq!(Reply::waiting(rx).await, Err(RemoteError::Cancelled));
    }

    #[tokio::test]
    async fn typed_reply_decodes() {
        let n: u32 = Reply::done(Ok(Value::from(5))).typed().await.unwrap();
        assert_eq!(n, 5);

        let err = Reply::done(Ok(Value::from("x"))).typed::<u32>().await.unwrap_err();
        assert!(matches!(err, RemoteError::Encode(_)));

        Reply::done(Ok(Value::Null)).typed::<()>().await.unwrap();
    }
}
