//! Remote operation table.
//!
//! Every engine operation reachable through a proxy is listed once in
//! [`remote_operations!`]. The table expands into:
//! - `dispatch`: worker side, decodes JSON arguments, calls the engine and
//!   encodes the result
//! - [`Post`]: fire-and-forget methods, one per operation
//! - [`Awaited`]: methods returning a [`TypedReply`] of the operation's result
//!
//! Arguments travel positionally as a JSON array.

use nabu_engine::gfx::Graphics;
use nabu_engine::{Engine, FrameState, UniformValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RemoteError;
use crate::pending::{Reply, TypedReply};
use crate::proxy::Proxy;

fn encode<T: Serialize>(value: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned>(
    method: &str,
    name: &str,
    value: Option<Value>,
) -> Result<T, RemoteError> {
    serde_json::from_value(value.unwrap_or(Value::Null)).map_err(|e| {
        RemoteError::InvalidArguments {
            method: method.to_string(),
            reason: format!("{name}: {e}"),
        }
    })
}

macro_rules! remote_operations {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty = |$engine:ident| $body:expr;
    )*) => {
        /// Names of every remote operation, in table order.
        pub const OPERATIONS: &[&str] = &[$(stringify!($name)),*];

        /// Runs `method` against `engine` with positional JSON `args`.
        pub(crate) fn dispatch<G: Graphics>(
            engine: &mut Engine<G>,
            method: &str,
            args: Vec<Value>,
        ) -> Result<Value, RemoteError> {
            match method {
                $(stringify!($name) => {
                    let names: &[&str] = &[$(stringify!($arg)),*];
                    if args.len() != names.len() {
                        return Err(RemoteError::InvalidArguments {
                            method: method.to_string(),
                            reason: format!(
                                "expected {} argument(s), got {}",
                                names.len(),
                                args.len()
                            ),
                        });
                    }
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.into_iter();
                    $(let $arg: $ty = decode(method, stringify!($arg), args.next())?;)*
                    let $engine = engine;
                    let out: $ret = $body?;
                    encode(&out)
                })*
                other => Err(RemoteError::UnknownRemoteMethod(other.to_string())),
            }
        }

        /// Fire-and-forget calls; failures on the worker are only logged
        /// there and show up in a later health check.
        pub struct Post<'a, G: Graphics> {
            proxy: &'a Proxy<G>,
        }

        impl<'a, G: Graphics> Post<'a, G> {
            pub(crate) fn new(proxy: &'a Proxy<G>) -> Self {
                Self { proxy }
            }

            $(
                $(#[$meta])*
                pub fn $name(&self, $($arg: $ty),*) -> Result<(), RemoteError> {
                    let args: Vec<Value> = vec![$(encode(&$arg)?),*];
                    self.proxy.call_method(stringify!($name), args)
                }
            )*
        }

        /// Calls whose reply carries the operation's result or error.
        pub struct Awaited<'a, G: Graphics> {
            proxy: &'a Proxy<G>,
        }

        impl<'a, G: Graphics> Awaited<'a, G> {
            pub(crate) fn new(proxy: &'a Proxy<G>) -> Self {
                Self { proxy }
            }

            $(
                $(#[$meta])*
                pub fn $name(&self, $($arg: $ty),*) -> TypedReply<$ret> {
                    let args: Result<Vec<Value>, RemoteError> =
                        (|| Ok(vec![$(encode(&$arg)?),*]))();
                    match args {
                        Ok(args) => self.proxy.call_method_await(stringify!($name), args).typed(),
                        Err(err) => Reply::done(Err(err)).typed(),
                    }
                }
            )*
        }
    };
}

remote_operations! {
    /// Compiles and installs the vertex shader.
    fn set_vertex_shader(source: String) -> () = |engine| engine.set_vertex_shader(&source);

    /// Fetches and installs the vertex shader.
    fn set_remote_vertex_shader(url: String) -> () = |engine| engine.set_remote_vertex_shader(&url);

    /// Compiles the single-program fragment shaders.
    fn set_fragment_shaders(sources: Vec<String>) -> () =
        |engine| engine.set_fragment_shaders(&sources);

    fn set_remote_fragment_shaders(urls: Vec<String>) -> () =
        |engine| engine.set_remote_fragment_shaders(&urls);

    /// Compiles and links one program per fragment shader, grouped.
    fn set_fragment_shader_groups(groups: Vec<Vec<String>>) -> () =
        |engine| engine.set_fragment_shader_groups(&groups);

    fn set_remote_fragment_shader_groups(urls: Vec<Vec<String>>) -> () =
        |engine| engine.set_remote_fragment_shader_groups(&urls);

    /// Compiles a vertex shader and the single-program fragment shaders.
    fn compile_program(vertex: String, fragments: Vec<String>) -> () =
        |engine| engine.compile_program(&vertex, &fragments);

    /// Links the single program and makes it current.
    fn use_program() -> () = |engine| engine.use_program();

    fn setup_whole_screen_quad() -> () = |engine| engine.setup_whole_screen_quad();

    /// Draws one frame.
    fn paint() -> () = |engine| engine.paint();

    /// Resizes the surface and the ping-pong framebuffers.
    fn resize(width: u32, height: u32) -> () = |engine| engine.resize(width, height);

    /// Records a uniform value.
    fn update_uniform(name: String, value: UniformValue) -> () =
        |engine| engine.update_uniform(&name, value);

    /// Fails with the pending graphics error, if any.
    fn check_vitals() -> () = |engine| engine.check_vitals();

    /// (Re)starts the frame loop.
    fn set_frame_rate(fps: f64) -> () = |engine| engine.set_frame_rate(fps);

    fn stop_frame_loop() -> () = |engine| {
        engine.stop_frame_loop();
        Ok::<_, nabu_engine::EngineError>(())
    };

    fn frame_state() -> FrameState =
        |engine| Ok::<_, nabu_engine::EngineError>(engine.frame_state());

    /// Releases every graphics object; the instance stays registered until
    /// the proxy is dropped.
    fn destroy() -> () = |engine| engine.destroy();
}
