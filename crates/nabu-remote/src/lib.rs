//! Off-thread hosting for nabu engines.
//!
//! A [`Worker`] owns a thread on which every engine lives. Callers hold a
//! [`Proxy`] per engine and drive it either fire-and-forget ([`Proxy::post`])
//! or with replies ([`Proxy::awaited`]). Repeating per-frame work is expressed
//! as [`FrameHook`]s.
//!
//! ```ignore
//! let worker = Worker::<WgpuGraphics>::spawn(WorkerConfig::default())?;
//! let proxy = worker.proxy(surface)?;
//! proxy.ready().await?;
//! proxy.awaited().compile_program(vertex, fragments).await?;
//! proxy.run_arbitrary("animate", FrameHook::animate("u_time"), true)?;
//! proxy.post().set_frame_rate(60.0)?;
//! ```

mod error;
pub mod hooks;
mod ops;
mod pending;
pub mod protocol;
mod proxy;
mod registry;
mod worker;

pub use error::RemoteError;
pub use hooks::FrameHook;
pub use ops::{Awaited, OPERATIONS, Post};
pub use pending::{Reply, TypedReply};
pub use protocol::{CallId, InstanceId, Outcome, Request, Response};
pub use proxy::Proxy;
pub use registry::Registry;
pub use worker::{Worker, WorkerConfig};
