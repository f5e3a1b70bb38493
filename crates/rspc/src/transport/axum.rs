//! HTTP server transport.
//!
//! | route | procedure |
//! |-------|-----------|
//! | `GET /{key}?input=<json>` | query |
//! | `POST /{key}` with a JSON body | mutation |
//! | `GET /subscribe/{key}?input=<json>` | subscription, as server sent events |
//! | `POST /` with a JSON array of requests | batch of queries and mutations |
//!
//! Single procedure routes answer with a JSON [`Response`](crate::model::Response)
//! whose id is `null`. Errors use the HTTP status matching their
//! [`ErrorCode`].
//!
//! ```rust,ignore
//! let service = HttpService::new(router, |_parts| Ctx::default(), HttpServerConfig::default());
//! let app = axum::Router::new().nest("/rspc", service.into_router());
//! ```

use std::{io, sync::Arc, time::Duration};

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::{
        IntoResponse, Response as HttpResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use bytes::Bytes;
use futures::{
    StreamExt,
    future::{join_all, ready},
    stream::{self, BoxStream},
};
use http::{StatusCode, request::Parts};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ErrorCode, Router,
    model::{ErrorData, ProcedureKind, Request, RequestId, Response, ResponseInner},
};

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Interval of keep-alive comments on subscription streams; `None`
    /// disables them.
    pub sse_keep_alive: Option<Duration>,
    /// Batches with more requests than this are rejected with `413`.
    pub max_batch_size: usize,
}

impl HttpServerConfig {
    pub const DEFAULT_SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

    pub fn with_sse_keep_alive(mut self, sse_keep_alive: Option<Duration>) -> Self {
        self.sse_keep_alive = sse_keep_alive;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            sse_keep_alive: Some(Self::DEFAULT_SSE_KEEP_ALIVE),
            max_batch_size: Self::DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

type ContextFn<TCtx> = dyn Fn(&Parts) -> TCtx + Send + Sync;

/// Serves a router over HTTP. Every HTTP request gets a fresh context from
/// the context function.
pub struct HttpService<TCtx> {
    router: Arc<Router<TCtx>>,
    context: Arc<ContextFn<TCtx>>,
    config: HttpServerConfig,
}

impl<TCtx> Clone for HttpService<TCtx> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            context: self.context.clone(),
            config: self.config.clone(),
        }
    }
}

impl<TCtx> std::fmt::Debug for HttpService<TCtx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpService")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}

impl<TCtx> HttpService<TCtx>
where
    TCtx: Clone + Send + Sync + 'static,
{
    pub fn new<F>(router: Arc<Router<TCtx>>, context: F, config: HttpServerConfig) -> Self
    where
        F: Fn(&Parts) -> TCtx + Send + Sync + 'static,
    {
        Self {
            router,
            context: Arc::new(context),
            config,
        }
    }

    pub fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    /// The routes of this service, ready to be nested under a prefix such
    /// as `/rspc`.
    pub fn into_router(self) -> axum::Router {
        axum::Router::new()
            .route("/", post(batch_handler::<TCtx>))
            .route("/subscribe/{key}", get(subscription_handler::<TCtx>))
            .route(
                "/{key}",
                get(query_handler::<TCtx>).post(mutation_handler::<TCtx>),
            )
            .with_state(self)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InputQuery {
    pub input: Option<String>,
}

fn query_input(
    query: Result<Query<InputQuery>, QueryRejection>,
) -> Result<Option<Value>, HttpResponse> {
    match query {
        Ok(Query(query)) => parse_input(query.input.as_deref()),
        Err(rejection) => {
            tracing::debug!("malformed query string: {rejection}");
            Err(bad_request(format!("malformed query string: {}", rejection.body_text())))
        }
    }
}

fn parse_input(raw: Option<&str>) -> Result<Option<Value>, HttpResponse> {
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw).map(Some).map_err(|err| {
            tracing::debug!("malformed procedure input: {err}");
            bad_request(format!("malformed procedure input: {err}"))
        }),
    }
}

fn bad_request(message: String) -> HttpResponse {
    json_response(Response::error(
        RequestId::Null,
        ErrorData::new(ErrorCode::BadRequest, message),
    ))
}

fn status_of(response: &Response) -> StatusCode {
    match &response.result {
        ResponseInner::Error(error) => u16::try_from(error.code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        _ => StatusCode::OK,
    }
}

fn json_response(response: Response) -> HttpResponse {
    (status_of(&response), Json(response)).into_response()
}

async fn exec_single<TCtx>(
    service: &HttpService<TCtx>,
    parts: &Parts,
    kind: ProcedureKind,
    key: &str,
    input: Option<Value>,
) -> HttpResponse
where
    TCtx: Clone + Send + Sync + 'static,
{
    tracing::debug!(%kind, key, "http request");
    let ctx = (service.context)(parts);
    let response = match service.router.exec(ctx, kind, key, input).await {
        Ok(value) => Response::new(RequestId::Null, ResponseInner::Response(value)),
        Err(err) => {
            tracing::debug!(%kind, key, "request failed: {err}");
            Response::error(RequestId::Null, err)
        }
    };
    json_response(response)
}

async fn query_handler<TCtx>(
    State(service): State<HttpService<TCtx>>,
    Path(key): Path<String>,
    query: Result<Query<InputQuery>, QueryRejection>,
    parts: Parts,
) -> HttpResponse
where
    TCtx: Clone + Send + Sync + 'static,
{
    match query_input(query) {
        Ok(input) => exec_single(&service, &parts, ProcedureKind::Query, &key, input).await,
        Err(response) => response,
    }
}

async fn mutation_handler<TCtx>(
    State(service): State<HttpService<TCtx>>,
    Path(key): Path<String>,
    parts: Parts,
    body: Bytes,
) -> HttpResponse
where
    TCtx: Clone + Send + Sync + 'static,
{
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(input) => Some(input),
            Err(err) => return bad_request(format!("malformed procedure input: {err}")),
        }
    };
    exec_single(&service, &parts, ProcedureKind::Mutation, &key, input).await
}

async fn subscription_handler<TCtx>(
    State(service): State<HttpService<TCtx>>,
    Path(key): Path<String>,
    query: Result<Query<InputQuery>, QueryRejection>,
    parts: Parts,
) -> HttpResponse
where
    TCtx: Clone + Send + Sync + 'static,
{
    let input = match query_input(query) {
        Ok(input) => input,
        Err(response) => return response,
    };
    tracing::debug!(%key, "http subscription");
    let ctx = (service.context)(&parts);
    let complete = Response::new(RequestId::Null, ResponseInner::Complete);
    let responses: BoxStream<'static, Response> =
        match service.router.exec_subscription(ctx, &key, input) {
            Ok(stream) => stream
                .map(|item| match item {
                    Ok(value) => Response::new(RequestId::Null, ResponseInner::Event(value)),
                    Err(err) => Response::error(RequestId::Null, err),
                })
                .chain(stream::once(ready(complete)))
                .boxed(),
            Err(err) => {
                tracing::debug!(%key, "subscription failed to start: {err}");
                stream::iter([Response::error(RequestId::Null, err), complete]).boxed()
            }
        };
    let events = responses.map(|response| match serde_json::to_string(&response) {
        Ok(data) => Ok::<_, io::Error>(Event::default().data(data)),
        Err(err) => Err(io::Error::new(io::ErrorKind::InvalidData, err)),
    });

    match service.config.sse_keep_alive {
        Some(interval) => Sse::new(events)
            .keep_alive(KeepAlive::new().interval(interval))
            .into_response(),
        None => Sse::new(events).into_response(),
    }
}

async fn batch_handler<TCtx>(
    State(service): State<HttpService<TCtx>>,
    parts: Parts,
    body: Bytes,
) -> Result<Json<Vec<Response>>, HttpResponse>
where
    TCtx: Clone + Send + Sync + 'static,
{
    let batch: Vec<Value> = serde_json::from_slice(&body)
        .map_err(|err| bad_request(format!("batch body must be a JSON array: {err}")))?;
    if batch.len() > service.config.max_batch_size {
        tracing::warn!(
            size = batch.len(),
            max = service.config.max_batch_size,
            "batch rejected"
        );
        return Err(json_response(Response::error(
            RequestId::Null,
            ErrorData::new(
                ErrorCode::PayloadTooLarge,
                format!(
                    "batch of {} requests exceeds the limit of {}",
                    batch.len(),
                    service.config.max_batch_size
                ),
            ),
        )));
    }
    tracing::debug!(size = batch.len(), "http batch");

    let ctx = (service.context)(&parts);
    let router = &service.router;
    let responses = join_all(batch.into_iter().map(|raw| {
        let ctx = ctx.clone();
        async move {
            match serde_json::from_value::<Request>(raw.clone()) {
                Ok(request) => router.exec_request(ctx, request).await,
                Err(err) => {
                    let id = raw
                        .get("id")
                        .and_then(|id| RequestId::deserialize(id).ok())
                        .unwrap_or(RequestId::Null);
                    Response::error(
                        id,
                        ErrorData::new(ErrorCode::BadRequest, format!("invalid request: {err}")),
                    )
                }
            }
        }
    }))
    .await;
    Ok(Json(responses))
}
