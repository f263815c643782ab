//! Server-level lifecycle hooks.
//!
//! [`ServerHooks`] is a plain configuration struct of optional async slots.
//! Every slot receives owned arguments and returns a boxed future, so hooks
//! can capture shared state and outlive the invocation that fired them.
//! Unset slots are no-ops.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use ripple_core::{ConnectionId, RequestContext};
use serde_json::{Value, json};
use tracing::warn;

use crate::errors::HookError;

/// Future returned by a hook slot.
pub type HookFuture<T> = BoxFuture<'static, Result<T, HookError>>;

/// A stored hook: owned arguments in, boxed future out.
pub type HookFn<A, T> = Arc<dyn Fn(A) -> HookFuture<T> + Send + Sync>;

/// Builds the resolver context from `(connection_init_payload, connection_id)`.
pub type ContextFn = Arc<dyn Fn(Option<&Value>, &ConnectionId) -> Value + Send + Sync>;

/// Box a closure returning any `Send` future into a [`HookFn`].
pub fn hook_fn<A, T, F, Fut>(f: F) -> HookFn<A, T>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, HookError>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Arguments for `on_connect` and `on_disconnect`.
#[derive(Clone, Debug)]
pub struct ConnectionArgs {
    /// Session the event belongs to.
    pub connection_id: ConnectionId,
    /// Routing coordinates of the session.
    pub request_context: RequestContext,
}

/// Arguments for `on_connection_init`.
#[derive(Clone, Debug)]
pub struct ConnectionInitArgs {
    /// Session being initialised.
    pub connection_id: ConnectionId,
    /// Routing coordinates of the session.
    pub request_context: RequestContext,
    /// Payload of the `connection_init` message.
    pub payload: Option<Value>,
}

/// Arguments for `on_ping` and `on_pong`.
#[derive(Clone, Debug)]
pub struct PingArgs {
    /// Session that sent the message.
    pub connection_id: ConnectionId,
    /// Optional message payload.
    pub payload: Option<Value>,
}

/// Arguments for `on_error`.
#[derive(Clone, Debug)]
pub struct ErrorArgs {
    /// Rendered error.
    pub error: String,
    /// Where it happened (`{"stage": ..., "connectionId": ...}` and similar).
    pub context: Value,
}

/// Optional server-level hooks.
#[derive(Clone, Default)]
pub struct ServerHooks {
    on_connect: Option<HookFn<ConnectionArgs, ()>>,
    on_disconnect: Option<HookFn<ConnectionArgs, ()>>,
    on_connection_init: Option<HookFn<ConnectionInitArgs, Option<Value>>>,
    on_ping: Option<HookFn<PingArgs, ()>>,
    on_pong: Option<HookFn<PingArgs, ()>>,
    on_error: Option<HookFn<ErrorArgs, ()>>,
    context: Option<ContextFn>,
}

impl fmt::Debug for ServerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHooks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_connection_init", &self.on_connection_init.is_some())
            .field("on_ping", &self.on_ping.is_some())
            .field("on_pong", &self.on_pong.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("context", &self.context.is_some())
            .finish()
    }
}

impl ServerHooks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before a connection record is created. An error refuses the session.
    #[must_use]
    pub fn on_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_connect = Some(hook_fn(f));
        self
    }

    /// Run when a session closes.
    #[must_use]
    pub fn on_disconnect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_disconnect = Some(hook_fn(f));
        self
    }

    /// Validate `connection_init`.
    ///
    /// `Ok(Some(v))` persists `v` as the connection-init payload; `Ok(None)`
    /// persists the client's payload; an error closes the session.
    #[must_use]
    pub fn on_connection_init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionInitArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, HookError>> + Send + 'static,
    {
        self.on_connection_init = Some(hook_fn(f));
        self
    }

    /// Observe client pings.
    #[must_use]
    pub fn on_ping<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PingArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_ping = Some(hook_fn(f));
        self
    }

    /// Observe client pongs.
    #[must_use]
    pub fn on_pong<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PingArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_pong = Some(hook_fn(f));
        self
    }

    /// Receive every error the broker absorbs.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ErrorArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_error = Some(hook_fn(f));
        self
    }

    /// Replace the default resolver-context factory.
    #[must_use]
    pub fn context<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Value>, &ConnectionId) -> Value + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(f));
        self
    }

    pub(crate) async fn connect(&self, args: ConnectionArgs) -> Result<(), HookError> {
        match &self.on_connect {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn disconnect(&self, args: ConnectionArgs) -> Result<(), HookError> {
        match &self.on_disconnect {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn connection_init(
        &self,
        args: ConnectionInitArgs,
    ) -> Result<Option<Value>, HookError> {
        match &self.on_connection_init {
            Some(hook) => hook(args).await,
            None => Ok(None),
        }
    }

    pub(crate) async fn ping(&self, args: PingArgs) -> Result<(), HookError> {
        match &self.on_ping {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn pong(&self, args: PingArgs) -> Result<(), HookError> {
        match &self.on_pong {
            Some(hook) => hook(args).await,
            None => Ok(()),
        }
    }

    /// Report an absorbed error. A failing `on_error` is only logged.
    pub(crate) async fn error(&self, error: &(dyn fmt::Display + Sync), context: Value) {
        let Some(hook) = &self.on_error else {
            return;
        };
        let args = ErrorArgs {
            error: error.to_string(),
            context,
        };
        if let Err(e) = hook(args).await {
            warn!(error = %e, "on_error hook failed");
        }
    }

    /// Resolver context for a connection.
    pub fn build_context(
        &self,
        connection_init_payload: Option<&Value>,
        connection_id: &ConnectionId,
    ) -> Value {
        match &self.context {
            Some(factory) => factory(connection_init_payload, connection_id),
            None => json!({
                "connectionInitPayload": connection_init_payload,
                "connectionId": connection_id,
            }),
        }
    }
}
