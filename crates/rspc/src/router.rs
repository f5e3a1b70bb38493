mod builder;
mod middleware;
mod procedure;
mod resolver;

use std::sync::Arc;

pub use builder::RouterBuilder;
use futures::StreamExt;
pub use middleware::{Middleware, MiddlewareContext};
pub use procedure::ProcedureRoute;
use procedure::ProcedureStore;
pub use resolver::*;
use serde_json::Value;

use crate::{
    Config, ExecError,
    model::{ProcedureKind, Request, RequestInner, Response, ResponseInner},
};

/// An immutable set of procedures, ready to execute requests.
///
/// Build one with [`Router::new`]; share it between transports as
/// `Arc<Router<TCtx>>`.
pub struct Router<TCtx> {
    pub(crate) config: Config,
    pub(crate) queries: ProcedureStore<TCtx>,
    pub(crate) mutations: ProcedureStore<TCtx>,
    pub(crate) subscriptions: ProcedureStore<TCtx>,
}

impl<TCtx> std::fmt::Debug for Router<TCtx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = |store: &ProcedureStore<TCtx>| {
            store.iter().map(|(key, _)| key.to_owned()).collect::<Vec<_>>()
        };
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("queries", &keys(&self.queries))
            .field("mutations", &keys(&self.mutations))
            .field("subscriptions", &keys(&self.subscriptions))
            .finish()
    }
}

impl<TCtx> Router<TCtx>
where
    TCtx: Clone + Send + Sync + 'static,
{
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RouterBuilder<TCtx> {
        RouterBuilder::new()
    }

    pub fn arced(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn store(&self, kind: ProcedureKind) -> &ProcedureStore<TCtx> {
        match kind {
            ProcedureKind::Query => &self.queries,
            ProcedureKind::Mutation => &self.mutations,
            ProcedureKind::Subscription => &self.subscriptions,
        }
    }

    pub(crate) fn store_mut(&mut self, kind: ProcedureKind) -> &mut ProcedureStore<TCtx> {
        match kind {
            ProcedureKind::Query => &mut self.queries,
            ProcedureKind::Mutation => &mut self.mutations,
            ProcedureKind::Subscription => &mut self.subscriptions,
        }
    }

    pub fn has_procedure(&self, kind: ProcedureKind, key: &str) -> bool {
        self.store(kind).contains(key)
    }

    /// Starts a procedure of any kind. A missing input is passed to the
    /// resolver as `null`.
    pub fn stream(
        &self,
        ctx: TCtx,
        kind: ProcedureKind,
        key: &str,
        input: Option<Value>,
    ) -> Result<ProcedureStream, ExecError> {
        let store = self.store(kind);
        let route = store.get(key).ok_or_else(|| {
            tracing::debug!(kind = %store.kind(), key, "procedure not found");
            ExecError::OperationNotFound(key.to_owned())
        })?;
        tracing::debug!(%kind, key, "executing procedure");
        Ok(route.call(ctx, key.into(), input.unwrap_or(Value::Null)))
    }

    /// Executes a query or mutation and waits for its single result.
    pub async fn exec(
        &self,
        ctx: TCtx,
        kind: ProcedureKind,
        key: &str,
        input: Option<Value>,
    ) -> Result<Value, ExecError> {
        if kind == ProcedureKind::Subscription {
            return Err(ExecError::UnsupportedMethod(
                "subscriptions can not be executed as a single request".into(),
            ));
        }
        let mut stream = self.stream(ctx, kind, key, input)?;
        stream.next().await.unwrap_or(Err(ExecError::NoResult))
    }

    pub fn exec_subscription(
        &self,
        ctx: TCtx,
        key: &str,
        input: Option<Value>,
    ) -> Result<ProcedureStream, ExecError> {
        self.stream(ctx, ProcedureKind::Subscription, key, input)
    }

    /// Answers one JSON-RPC request that expects a single response. Used for
    /// transports without a long lived connection, where subscriptions are
    /// rejected.
    pub async fn exec_request(&self, ctx: TCtx, request: Request) -> Response {
        let Request { id, inner, .. } = request;
        let result = match inner {
            RequestInner::Query { path, input } => {
                self.exec(ctx, ProcedureKind::Query, &path, input).await
            }
            RequestInner::Mutation { path, input } => {
                self.exec(ctx, ProcedureKind::Mutation, &path, input).await
            }
            RequestInner::Subscription { .. } => Err(ExecError::UnsupportedMethod(
                "subscription".into(),
            )),
            RequestInner::SubscriptionStop => Err(ExecError::UnsupportedMethod(
                "subscriptionStop".into(),
            )),
        };
        match result {
            Ok(value) => Response::new(id, ResponseInner::Response(value)),
            Err(err) => {
                tracing::debug!(%id, "request failed: {err}");
                Response::error(id, err)
            }
        }
    }
}
