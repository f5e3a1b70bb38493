use std::{collections::BTreeMap, future::ready, sync::Arc};

use futures::{StreamExt, stream};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    middleware::{Middleware, MiddlewareChain, MiddlewareContext, run_chain},
    resolver::{ProcedureStream, ResolverOutput, StreamResolverOutput},
};
use crate::{ExecError, model::ProcedureKind};

pub(crate) type DynResolver<TCtx> = dyn Fn(TCtx, Value) -> ProcedureStream + Send + Sync;

pub(crate) type SchemaFn = fn(&mut SchemaGenerator) -> Schema;

fn schema_of<T: JsonSchema>(generator: &mut SchemaGenerator) -> Schema {
    generator.subschema_for::<T>()
}

fn deserialize_input<TArg: DeserializeOwned>(input: Value) -> Result<TArg, ExecError> {
    serde_json::from_value(input).map_err(ExecError::DeserializingArg)
}

fn error_stream(err: ExecError) -> ProcedureStream {
    stream::once(ready(Err(err))).boxed()
}

/// A registered procedure: the type erased resolver, the middleware that
/// wraps it, and how to describe its types.
pub struct ProcedureRoute<TCtx> {
    pub(crate) kind: ProcedureKind,
    pub(crate) exec: Arc<DynResolver<TCtx>>,
    pub(crate) middleware: MiddlewareChain<TCtx>,
    pub(crate) input_schema: SchemaFn,
    pub(crate) result_schema: SchemaFn,
}

impl<TCtx> std::fmt::Debug for ProcedureRoute<TCtx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureRoute")
            .field("kind", &self.kind)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl<TCtx> Clone for ProcedureRoute<TCtx> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            exec: self.exec.clone(),
            middleware: self.middleware.clone(),
            input_schema: self.input_schema,
            result_schema: self.result_schema,
        }
    }
}

impl<TCtx> ProcedureRoute<TCtx>
where
    TCtx: Send + 'static,
{
    pub(crate) fn new_value<F, TArg, TResult, TMarker>(
        kind: ProcedureKind,
        middleware: MiddlewareChain<TCtx>,
        resolver: F,
    ) -> Self
    where
        F: Fn(TCtx, TArg) -> TResult + Send + Sync + 'static,
        TArg: DeserializeOwned + JsonSchema + 'static,
        TResult: ResolverOutput<TMarker>,
        TMarker: 'static,
    {
        Self {
            kind,
            exec: Arc::new(move |ctx, input| match deserialize_input::<TArg>(input) {
                Ok(arg) => stream::once(resolver(ctx, arg).into_value()).boxed(),
                Err(err) => error_stream(err),
            }),
            middleware,
            input_schema: schema_of::<TArg>,
            result_schema: schema_of::<TResult::Output>,
        }
    }

    pub(crate) fn new_stream<F, TArg, TResult, TMarker>(
        middleware: MiddlewareChain<TCtx>,
        resolver: F,
    ) -> Self
    where
        F: Fn(TCtx, TArg) -> TResult + Send + Sync + 'static,
        TArg: DeserializeOwned + JsonSchema + 'static,
        TResult: StreamResolverOutput<TMarker>,
        TMarker: 'static,
    {
        Self {
            kind: ProcedureKind::Subscription,
            exec: Arc::new(move |ctx, input| match deserialize_input::<TArg>(input) {
                Ok(arg) => resolver(ctx, arg).into_stream(),
                Err(err) => error_stream(err),
            }),
            middleware,
            input_schema: schema_of::<TArg>,
            result_schema: schema_of::<TResult::Item>,
        }
    }

    /// Puts `outer` in front of this route's own middleware.
    pub(crate) fn wrapped_in(mut self, outer: &[Arc<dyn Middleware<TCtx>>]) -> Self {
        if !outer.is_empty() {
            self.middleware = outer
                .iter()
                .chain(self.middleware.iter())
                .cloned()
                .collect();
        }
        self
    }

    pub(crate) fn call(&self, ctx: TCtx, key: Arc<str>, input: Value) -> ProcedureStream {
        if self.middleware.is_empty() {
            return (self.exec)(ctx, input);
        }
        let chain = self.middleware.clone();
        let exec = self.exec.clone();
        let kind = self.kind;
        stream::once(async move {
            let cx = MiddlewareContext {
                ctx,
                input,
                key,
                kind,
            };
            run_chain(&chain, cx)
                .await
                .map(|cx| exec(cx.ctx, cx.input))
                .map_err(ExecError::Middleware)
        })
        .flat_map(|result| match result {
            Ok(stream) => stream,
            Err(err) => error_stream(err),
        })
        .boxed()
    }
}

/// Procedures of one kind, keyed by their full (prefixed) key.
pub(crate) struct ProcedureStore<TCtx> {
    kind: ProcedureKind,
    map: BTreeMap<String, ProcedureRoute<TCtx>>,
}

impl<TCtx> ProcedureStore<TCtx> {
    pub(crate) fn new(kind: ProcedureKind) -> Self {
        Self {
            kind,
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub(crate) fn get(&self, key: &str) -> Option<&ProcedureRoute<TCtx>> {
        self.map.get(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub(crate) fn insert(&mut self, key: String, route: ProcedureRoute<TCtx>) {
        self.map.insert(key, route);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &ProcedureRoute<TCtx>)> {
        self.map.iter().map(|(key, route)| (key.as_str(), route))
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
