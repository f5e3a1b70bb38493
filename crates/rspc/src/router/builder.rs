use std::{future::Future, sync::Arc};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use super::{
    Router,
    middleware::{Middleware, MiddlewareContext},
    procedure::{ProcedureRoute, ProcedureStore},
    resolver::{ResolverOutput, StreamResolverOutput},
};
use crate::{BuildError, Config, Error, model::ProcedureKind};

const RESERVED_PREFIXES: [&str; 2] = ["rpc.", "rspc."];

/// Collects procedures and middleware; [`RouterBuilder::build`] validates
/// the keys and produces the executable [`Router`].
pub struct RouterBuilder<TCtx> {
    config: Config,
    middleware: Vec<Arc<dyn Middleware<TCtx>>>,
    procedures: Vec<(String, ProcedureRoute<TCtx>)>,
}

impl<TCtx> std::fmt::Debug for RouterBuilder<TCtx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("config", &self.config)
            .field("middleware", &self.middleware.len())
            .field(
                "procedures",
                &self
                    .procedures
                    .iter()
                    .map(|(key, route)| (route.kind, key.as_str()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<TCtx> Default for RouterBuilder<TCtx> {
    fn default() -> Self {
        Self {
            config: Config::default(),
            middleware: Vec::new(),
            procedures: Vec::new(),
        }
    }
}

impl<TCtx> RouterBuilder<TCtx>
where
    TCtx: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn query<F, TArg, TResult, TMarker>(self, key: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(TCtx, TArg) -> TResult + Send + Sync + 'static,
        TArg: DeserializeOwned + JsonSchema + 'static,
        TResult: ResolverOutput<TMarker>,
        TMarker: 'static,
    {
        let route = ProcedureRoute::new_value(ProcedureKind::Query, self.chain(), resolver);
        self.with_route(key.into(), route)
    }

    pub fn mutation<F, TArg, TResult, TMarker>(self, key: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(TCtx, TArg) -> TResult + Send + Sync + 'static,
        TArg: DeserializeOwned + JsonSchema + 'static,
        TResult: ResolverOutput<TMarker>,
        TMarker: 'static,
    {
        let route = ProcedureRoute::new_value(ProcedureKind::Mutation, self.chain(), resolver);
        self.with_route(key.into(), route)
    }

    pub fn subscription<F, TArg, TResult, TMarker>(
        self,
        key: impl Into<String>,
        resolver: F,
    ) -> Self
    where
        F: Fn(TCtx, TArg) -> TResult + Send + Sync + 'static,
        TArg: DeserializeOwned + JsonSchema + 'static,
        TResult: StreamResolverOutput<TMarker>,
        TMarker: 'static,
    {
        let route = ProcedureRoute::new_stream(self.chain(), resolver);
        self.with_route(key.into(), route)
    }

    /// Adds an async middleware function. It wraps every procedure registered
    /// after this call, including procedures merged in later.
    pub fn middleware<F, Fut>(self, middleware: F) -> Self
    where
        F: Fn(MiddlewareContext<TCtx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<MiddlewareContext<TCtx>, Error>> + Send + 'static,
    {
        self.layer(middleware)
    }

    /// Like [`RouterBuilder::middleware`] for types implementing [`Middleware`].
    pub fn layer(mut self, middleware: impl Middleware<TCtx>) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Imports every procedure of `router` with `prefix` prepended to its key.
    /// The middleware of `self` registered so far runs before the merged
    /// router's own middleware. The merged router's config is dropped.
    pub fn merge(mut self, prefix: &str, router: RouterBuilder<TCtx>) -> Self {
        for (key, route) in router.procedures {
            let route = route.wrapped_in(&self.middleware);
            self.procedures.push((format!("{prefix}{key}"), route));
        }
        self
    }

    pub fn build(self) -> Result<Router<TCtx>, BuildError> {
        let mut router = Router {
            config: self.config,
            queries: ProcedureStore::new(ProcedureKind::Query),
            mutations: ProcedureStore::new(ProcedureKind::Mutation),
            subscriptions: ProcedureStore::new(ProcedureKind::Subscription),
        };
        for (key, route) in self.procedures {
            let kind = route.kind;
            validate_key(kind, &key)?;
            let store = router.store_mut(kind);
            if store.contains(&key) {
                return Err(BuildError::DuplicateKey { kind, key });
            }
            store.insert(key, route);
        }
        tracing::debug!(
            queries = router.queries.len(),
            mutations = router.mutations.len(),
            subscriptions = router.subscriptions.len(),
            "router built"
        );

        if let Some(path) = router.config.export_bindings_on_build.clone() {
            router.export_ts(&path)?;
            tracing::info!(path = %path.display(), "exported typescript bindings");
        }
        Ok(router)
    }

    fn chain(&self) -> Arc<[Arc<dyn Middleware<TCtx>>]> {
        self.middleware.iter().cloned().collect()
    }

    fn with_route(mut self, key: String, route: ProcedureRoute<TCtx>) -> Self {
        self.procedures.push((key, route));
        self
    }
}

fn validate_key(kind: ProcedureKind, key: &str) -> Result<(), BuildError> {
    let invalid = |reason| BuildError::InvalidKey {
        kind,
        key: key.to_owned(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("keys must not be empty"));
    }
    if key.contains('/') {
        return Err(invalid("keys must not contain '/'"));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(invalid("keys must not contain whitespace"));
    }
    if RESERVED_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(invalid("the 'rpc.' and 'rspc.' prefixes are reserved"));
    }
    Ok(())
}
