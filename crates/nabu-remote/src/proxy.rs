use std::fmt;

use nabu_engine::gfx::Graphics;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::RemoteError;
use crate::hooks::FrameHook;
use crate::ops::{Awaited, Post};
use crate::pending::{Reply, TypedReply};
use crate::protocol::{CallId, InstanceId, Request};
use crate::worker::Worker;

/// Caller-side handle to one engine living on a worker.
///
/// Requests are posted in call order and the worker applies them in that
/// order, whether or not their replies are awaited. Dropping the proxy
/// cancels its pending calls and disposes the engine.
pub struct Proxy<G: Graphics> {
    worker: Worker<G>,
    instance: InstanceId,
    init: Mutex<Option<Reply>>,
}

impl<G: Graphics> Proxy<G> {
    /// Moves `surface` to the worker, which creates the engine for it.
    ///
    /// Construction errors on the worker side are reported by
    /// [`ready`](Self::ready); this only fails when the worker is gone.
    pub fn new(worker: &Worker<G>, surface: G::Surface) -> Result<Self, RemoteError> {
        let instance = InstanceId::new();
        let call = worker.next_call_id();
        let rx = worker.pending().lock().register(call, instance);

        if let Err(err) = worker.send(Request::Init { instance, call, surface }) {
            worker.pending().lock().forget(call);
            return Err(err);
        }

        log::debug!("proxy {instance} created on {}", worker.name());
        Ok(Self {
            worker: worker.clone(),
            instance,
            init: Mutex::new(Some(Reply::waiting(rx))),
        })
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn worker(&self) -> &Worker<G> {
        &self.worker
    }

    /// Resolves once the engine exists, or with its construction error.
    ///
    /// Only the first call observes the outcome; later calls resolve `Ok`.
    pub fn ready(&self) -> TypedReply<()> {
        self.init
            .lock()
            .take()
            .unwrap_or_else(|| Reply::done(Ok(Value::Null)))
            .typed()
    }

    /// Fire-and-forget interface.
    pub fn post(&self) -> Post<'_, G> {
        Post::new(self)
    }

    /// Interface whose calls resolve to the operation's result.
    pub fn awaited(&self) -> Awaited<'_, G> {
        Awaited::new(self)
    }

    /// Posts `method` without waiting for a reply.
    pub fn call_method(&self, method: &str, args: Vec<Value>) -> Result<(), RemoteError> {
        let call = self.worker.next_call_id();
        self.worker.send(Request::CallMethod {
            instance: self.instance,
            call,
            method: method.to_string(),
            args,
            await_reply: false,
        })
    }

    /// Posts `method` and returns its reply.
    pub fn call_method_await(&self, method: &str, args: Vec<Value>) -> Reply {
        self.request_reply(|instance, call| Request::CallMethod {
            instance,
            call,
            method: method.to_string(),
            args,
            await_reply: true,
        })
    }

    /// Runs `hook` on the worker, once or on every frame under `key`.
    ///
    /// A repeating hook replaces any earlier one with the same key.
    pub fn run_arbitrary(
        &self,
        key: impl Into<String>,
        hook: FrameHook,
        repeat: bool,
    ) -> Result<(), RemoteError> {
        let call = self.worker.next_call_id();
        self.worker.send(Request::EvalFn {
            instance: self.instance,
            call,
            key: key.into(),
            hook,
            repeat,
            await_reply: false,
        })
    }

    /// Like [`run_arbitrary`](Self::run_arbitrary); a one-shot hook replies
    /// with its value, a repeating one with `null` once registered.
    pub fn run_arbitrary_await(
        &self,
        key: impl Into<String>,
        hook: FrameHook,
        repeat: bool,
    ) -> Reply {
        let key = key.into();
        self.request_reply(|instance, call| Request::EvalFn {
            instance,
            call,
            key,
            hook,
            repeat,
            await_reply: true,
        })
    }

    fn request_reply(
        &self,
        build: impl FnOnce(InstanceId, CallId) -> Request<G::Surface>,
    ) -> Reply {
        let call = self.worker.next_call_id();
        let rx = self.worker.pending().lock().register(call, self.instance);
        match self.worker.send(build(self.instance, call)) {
            Ok(()) => Reply::waiting(rx),
            Err(err) => {
                self.worker.pending().lock().forget(call);
                Reply::done(Err(err))
            }
        }
    }
}

impl<G: Graphics> Drop for Proxy<G> {
    fn drop(&mut self) {
        let cancelled = self.worker.pending().lock().cancel_instance(self.instance);
        if cancelled > 0 {
            log::debug!("proxy {} dropped with {cancelled} pending call(s)", self.instance);
        }
        if self.worker.send(Request::Dispose { instance: self.instance }).is_err() {
            log::debug!("worker already gone while disposing {}", self.instance);
        }
    }
}

impl<G: Graphics> fmt::Debug for Proxy<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("instance", &self.instance)
            .field("worker", &self.worker.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::worker::WorkerConfig;
    use nabu_engine::gfx::{GfxCall, RecordingGraphics, RecordingSurface};
    use nabu_engine::{FrameState, UniformValue};
    use serde_json::json;

    const VERTEX: &str = "attribute vec3 v_position;";
    const WAVES: &str = "uniform float u_time; // waves";
    const BLUR: &str = "uniform sampler2D u_prev; // blur";
    const GRADE: &str = "uniform float u_time; uniform sampler2D u_prev; // grade";

    fn worker() -> Worker<RecordingGraphics> {
        Worker::spawn(WorkerConfig::default()).expect("spawn worker")
    }

    #[tokio::test]
    async fn renders_groups_through_the_worker() {
        let worker = worker();
        let surface = RecordingSurface::new(32, 32);
        let journal = surface.journal();
        let proxy = worker.proxy(surface).unwrap();
        proxy.ready().await.unwrap();

        let ops = proxy.awaited();
        ops.set_vertex_shader(VERTEX.into()).await.unwrap();
        ops.set_fragment_shader_groups(vec![vec![WAVES.into(), BLUR.into()], vec![GRADE.into()]])
            .await
            .unwrap();
        ops.update_uniform("u_time".into(), UniformValue::Scalar(1.5)).await.unwrap();
        ops.paint().await.unwrap();

        let draws = journal.draws();
        assert_eq!(draws.len(), 3);
        assert!(matches!(draws[2], GfxCall::Draw { target: None, texture: Some(_), .. }));
        assert!(matches!(draws[0], GfxCall::Draw { target: Some(_), .. }));
        assert_eq!(worker.pending_calls(), 0);
    }

    #[tokio::test]
    async fn posted_calls_keep_their_order() {
        let worker = worker();
        let surface = RecordingSurface::new(8, 8);
        let journal = surface.journal();
        let proxy = worker.proxy(surface).unwrap();

        let post = proxy.post();
        post.set_vertex_shader(VERTEX.into()).unwrap();
        post.set_fragment_shaders(vec![WAVES.into()]).unwrap();
        post.use_program().unwrap();
        post.setup_whole_screen_quad().unwrap();
        post.paint().unwrap();
        proxy.awaited().check_vitals().await.unwrap();

        assert_eq!(journal.draws().len(), 1);
        assert!(journal.calls().contains(&GfxCall::Present));
    }

    #[tokio::test]
    async fn construction_errors_reach_ready() {
        let worker = worker();
        let mut surface = RecordingSurface::new(8, 8);
        surface.refuse_context = true;
        let proxy = worker.proxy(surface).unwrap();

        assert_eq!(
            proxy.ready().await,
            Err(RemoteError::Remote("graphics context unavailable".into()))
        );
        assert_eq!(
            proxy.awaited().paint().await,
            Err(RemoteError::UnknownRemoteInstance(proxy.instance()))
        );
    }

    #[tokio::test]
    async fn remote_errors_and_unknown_methods() {
        let worker = worker();
        let proxy = worker.proxy(RecordingSurface::new(8, 8)).unwrap();

        assert_eq!(
            proxy.awaited().use_program().await,
            Err(RemoteError::Remote("no vertex shader has been set".into()))
        );
        assert_eq!(
            proxy.call_method_await("draw_teapot", vec![]).await,
            Err(RemoteError::UnknownRemoteMethod("draw_teapot".into()))
        );

        // the engine keeps serving after failures
        let state: FrameState = proxy.awaited().frame_state().await.unwrap();
        assert_eq!(state.frame, 0);
    }

    #[tokio::test]
    async fn dropping_a_proxy_disposes_its_engine() {
        let worker = worker();
        let surface = RecordingSurface::new(8, 8);
        let journal = surface.journal();
        let doomed = worker.proxy(surface).unwrap();
        let witness = worker.proxy(RecordingSurface::new(8, 8)).unwrap();

        doomed.awaited().set_vertex_shader(VERTEX.into()).await.unwrap();
        assert_eq!(journal.live_shaders(), 1);
        drop(doomed);

        // processed after the DISPOSE posted by the drop
        witness.awaited().check_vitals().await.unwrap();
        assert_eq!(
            (journal.live_shaders(), journal.live_programs(), journal.live_targets()),
            (0, 0, 0)
        );
    }

    #[tokio::test]
    async fn hooks_run_once_or_every_frame() {
        let worker = worker();
        let proxy = worker.proxy(RecordingSurface::new(8, 8)).unwrap();

        let value = proxy
            .run_arbitrary_await("peek", FrameHook::FrameState, false)
            .await
            .unwrap();
        assert_eq!(value, json!({ "frame": 0, "elapsed_ms": 0.0, "fps": null }));

        proxy
            .run_arbitrary("count", FrameHook::FrameUniform { name: "u_frame".into() }, true)
            .unwrap();
        proxy.post().set_frame_rate(200.0).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let state = proxy.awaited().frame_state().await.unwrap();
        assert!(state.frame >= 1, "no frame ticked: {state:?}");
        assert_eq!(state.fps, Some(200.0));
    }
}
