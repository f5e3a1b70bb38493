use std::{future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;

use crate::{Error, model::ProcedureKind};

/// What a middleware sees before the resolver runs. Returning a modified
/// copy changes what the next middleware, and finally the resolver, receive.
#[derive(Debug, Clone)]
pub struct MiddlewareContext<TCtx> {
    pub ctx: TCtx,
    pub input: Value,
    pub key: Arc<str>,
    pub kind: ProcedureKind,
}

impl<TCtx> MiddlewareContext<TCtx> {
    pub fn with_ctx(mut self, ctx: TCtx) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }
}

/// Runs before every procedure registered after it. Returning an error
/// rejects the call; the resolver is not invoked.
pub trait Middleware<TCtx>: Send + Sync + 'static {
    fn handle(
        &self,
        cx: MiddlewareContext<TCtx>,
    ) -> BoxFuture<'static, Result<MiddlewareContext<TCtx>, Error>>;
}

impl<TCtx, F, Fut> Middleware<TCtx> for F
where
    F: Fn(MiddlewareContext<TCtx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<MiddlewareContext<TCtx>, Error>> + Send + 'static,
{
    fn handle(
        &self,
        cx: MiddlewareContext<TCtx>,
    ) -> BoxFuture<'static, Result<MiddlewareContext<TCtx>, Error>> {
        (self)(cx).boxed()
    }
}

pub(crate) type MiddlewareChain<TCtx> = Arc<[Arc<dyn Middleware<TCtx>>]>;

pub(crate) async fn run_chain<TCtx: 'static>(
    chain: &MiddlewareChain<TCtx>,
    mut cx: MiddlewareContext<TCtx>,
) -> Result<MiddlewareContext<TCtx>, Error> {
    for middleware in chain.iter() {
        cx = middleware.handle(cx).await?;
    }
    Ok(cx)
}
