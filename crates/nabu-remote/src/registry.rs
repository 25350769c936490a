use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use nabu_engine::engine::ShaderFetcher;
use nabu_engine::gfx::Graphics;
use nabu_engine::{Engine, EngineConfig};
use serde_json::Value;

use crate::error::RemoteError;
use crate::ops;
use crate::protocol::{InstanceId, Request, Response};

/// Engines owned by one worker, keyed by instance.
pub struct Registry<G: Graphics> {
    engines: HashMap<InstanceId, Engine<G>>,
    config: EngineConfig,
    fetcher: Option<Arc<dyn ShaderFetcher + Sync>>,
}

impl<G: Graphics> Registry<G> {
    pub fn new(config: EngineConfig, fetcher: Option<Arc<dyn ShaderFetcher + Sync>>) -> Self {
        Self {
            engines: HashMap::new(),
            config,
            fetcher,
        }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn contains(&self, instance: InstanceId) -> bool {
        self.engines.contains_key(&instance)
    }

    pub fn engine(&self, instance: InstanceId) -> Option<&Engine<G>> {
        self.engines.get(&instance)
    }

    /// Applies one request. Returns the response to send back, if any.
    ///
    /// INIT always replies. CALL_METHOD and EVAL_FN reply only when awaited.
    /// Requests naming an unknown instance always get an error response.
    pub fn handle(&mut self, request: Request<G::Surface>) -> Option<Response> {
        log::trace!("handling {request:?}");
        match request {
            Request::Init { instance, call, surface } => Some(Response::Reply {
                call,
                outcome: self.init(instance, surface),
            }),

            Request::CallMethod {
                instance,
                call,
                method,
                args,
                await_reply,
            } => {
                let Some(engine) = self.engines.get_mut(&instance) else {
                    return Some(unknown(instance, Some(call)));
                };
                let outcome = ops::dispatch(engine, &method, args);
                if let Err(err) = &outcome {
                    if !await_reply {
                        log::error!("{method} on {instance} failed: {err}");
                    }
                }
                await_reply.then_some(Response::Reply { call, outcome })
            }

            Request::EvalFn {
                instance,
                call,
                key,
                hook,
                repeat,
                await_reply,
            } => {
                let Some(engine) = self.engines.get_mut(&instance) else {
                    return Some(unknown(instance, Some(call)));
                };
                let outcome = engine
                    .run_on_context(key.as_str(), hook.into_callback(), repeat)
                    .map(|value| value.unwrap_or(Value::Null))
                    .map_err(RemoteError::from);
                if let Err(err) = &outcome {
                    if !await_reply {
                        log::error!("hook {key} on {instance} failed: {err}");
                    }
                }
                await_reply.then_some(Response::Reply { call, outcome })
            }

            Request::Dispose { instance } => match self.engines.remove(&instance) {
                Some(mut engine) => {
                    if let Err(err) = engine.destroy() {
                        log::warn!("disposing {instance}: {err}");
                    }
                    log::debug!("disposed {instance}");
                    None
                }
                None => Some(unknown(instance, None)),
            },
        }
    }

    fn init(&mut self, instance: InstanceId, surface: G::Surface) -> Result<Value, RemoteError> {
        if self.engines.contains_key(&instance) {
            return Err(RemoteError::Remote(format!("instance {instance} is already registered")));
        }

        let mut engine = Engine::with_config(surface, self.config.clone())?;
        if let Some(fetcher) = &self.fetcher {
            engine = engine.with_fetcher(Arc::clone(fetcher));
        }
        self.engines.insert(instance, engine);
        log::debug!("registered {instance}");
        Ok(Value::Null)
    }

    /// Earliest frame deadline across all engines.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.engines
            .values()
            .filter_map(Engine::next_frame_deadline)
            .min()
    }

    /// Runs every frame due at `now`. Returns how many engines ticked.
    pub fn tick(&mut self, now: Instant) -> usize {
        self.engines
            .values_mut()
            .filter_map(|engine| engine.tick(now))
            .count()
    }

    /// Destroys every engine.
    pub fn clear(&mut self) {
        for (instance, mut engine) in self.engines.drain() {
            if let Err(err) = engine.destroy() {
                log::warn!("tearing down {instance}: {err}");
            }
        }
    }
}

fn unknown(instance: InstanceId, call: Option<u64>) -> Response {
    log::warn!("request for unknown instance {instance}");
    Response::Error {
        call,
        error: RemoteError::UnknownRemoteInstance(instance),
    }
}

impl<G: Graphics> Drop for Registry<G> {
    fn drop(&mut self) {
        self.clear();
    }
}
