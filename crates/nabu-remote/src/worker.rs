//! The worker thread hosting a [`Registry`] and the caller-side reply router.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use nabu_engine::engine::ShaderFetcher;
use nabu_engine::gfx::Graphics;
use nabu_engine::EngineConfig;
use parking_lot::Mutex;

use crate::error::RemoteError;
use crate::pending::PendingTable;
use crate::protocol::{CallId, Request, Response};
use crate::proxy::Proxy;
use crate::registry::Registry;

/// Worker settings.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Thread name; the router thread appends `-router`.
    pub name: String,
    /// Applied to every engine created on this worker.
    pub engine: EngineConfig,
    /// Replaces the default HTTP fetcher for remote shader sources.
    pub fetcher: Option<Arc<dyn ShaderFetcher + Sync>>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "nabu-worker".to_string(),
            engine: EngineConfig::default(),
            fetcher: None,
        }
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

struct Shared<G: Graphics> {
    name: String,
    requests: Option<mpsc::Sender<Request<G::Surface>>>,
    pending: Arc<Mutex<PendingTable>>,
    next_call: AtomicU64,
    threads: Vec<JoinHandle<()>>,
}

impl<G: Graphics> Drop for Shared<G> {
    fn drop(&mut self) {
        // Closing the request channel stops the worker loop, which drops the
        // response sender and ends the router.
        self.requests.take();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("{} thread panicked", self.name);
            }
        }
        log::debug!("{} shut down", self.name);
    }
}

/// Handle to a worker thread owning the engines of its proxies.
///
/// Cheap to clone. The thread stops once the last handle (proxies hold one)
/// is dropped; its engines are destroyed on the way out.
pub struct Worker<G: Graphics> {
    shared: Arc<Shared<G>>,
}

impl<G: Graphics> Clone for Worker<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G: Graphics> Worker<G> {
    pub fn spawn(config: WorkerConfig) -> io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<Request<G::Surface>>();
        let (response_tx, response_rx) = mpsc::channel::<Response>();
        let pending = Arc::new(Mutex::new(PendingTable::default()));

        let name = config.name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker::<G>(request_rx, response_tx, config))?;

        let router_pending = Arc::clone(&pending);
        let router = thread::Builder::new()
            .name(format!("{name}-router"))
            .spawn(move || route_responses(response_rx, router_pending))?;

        log::debug!("{name} started");
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                requests: Some(request_tx),
                pending,
                next_call: AtomicU64::new(1),
                threads: vec![worker, router],
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Creates a proxy for `surface`; see [`Proxy::new`].
    pub fn proxy(&self, surface: G::Surface) -> Result<Proxy<G>, RemoteError> {
        Proxy::new(self, surface)
    }

    /// Awaited calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub(crate) fn next_call_id(&self) -> CallId {
        self.shared.next_call.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn pending(&self) -> &Mutex<PendingTable> {
        &self.shared.pending
    }

    pub(crate) fn send(&self, request: Request<G::Surface>) -> Result<(), RemoteError> {
        let tx = self.shared.requests.as_ref().ok_or(RemoteError::WorkerGone)?;
        tx.send(request).map_err(|_| RemoteError::WorkerGone)
    }
}

impl<G: Graphics> fmt::Debug for Worker<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.shared.name)
            .field("pending", &self.pending_calls())
            .finish()
    }
}

/// Worker loop: requests in arrival order, frame ticks in between.
///
/// While any engine runs a frame loop, waiting for the next request never
/// extends past the earliest frame deadline.
fn run_worker<G: Graphics>(
    requests: mpsc::Receiver<Request<G::Surface>>,
    responses: mpsc::Sender<Response>,
    config: WorkerConfig,
) {
    let mut registry = Registry::<G>::new(config.engine, config.fetcher);

    loop {
        let received = match registry.next_deadline() {
            None => requests.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(wait) if !wait.is_zero() => requests.recv_timeout(wait),
                _ => Err(RecvTimeoutError::Timeout),
            },
        };

        match received {
            Ok(request) => {
                if let Some(response) = registry.handle(request) {
                    if responses.send(response).is_err() {
                        log::debug!("response router is gone; dropping reply");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        registry.tick(Instant::now());
    }

    log::debug!("worker loop ending with {} engine(s)", registry.len());
    registry.clear();
}

/// Settles pending calls from worker responses until the worker is gone.
fn route_responses(responses: mpsc::Receiver<Response>, pending: Arc<Mutex<PendingTable>>) {
    for response in responses {
        match response {
            Response::Reply { call, outcome } => {
                if !pending.lock().settle(call, outcome) {
                    log::warn!("dropping reply for unknown or settled call {call}");
                }
            }
            Response::Error { call: Some(call), error } => {
                if !pending.lock().settle(call, Err(error.clone())) {
                    log::warn!("worker error for call {call} with no waiter: {error}");
                }
            }
            Response::Error { call: None, error } => log::warn!("worker error: {error}"),
        }
    }
    pending.lock().fail_all(RemoteError::WorkerGone);
}
