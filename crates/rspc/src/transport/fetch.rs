//! HTTP client transport, speaking to an [`HttpService`](super::axum::HttpService)
//! through `reqwest`.
use std::{collections::HashMap, future::ready, sync::Arc};

use futures::{StreamExt, stream, stream::BoxStream};
use http::{HeaderName, HeaderValue};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
pub use sse_stream::Error as SseError;
use sse_stream::SseStream;
use thiserror::Error;
use url::Url;

use super::Transport;
use crate::model::{ProcedureKind, Response, ResponseInner};

const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const JSON_MIME_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("SSE error: {0}")]
    Sse(#[from] SseError),
    #[error("Url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Url '{0}' can not be used as a base for procedure paths")]
    InvalidBaseUrl(Arc<str>),
    #[error("Deserialize error: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("Unexpected content type: {0:?}")]
    UnexpectedContentType(Option<String>),
    #[error("{0}s can not be sent as a single request")]
    UnsupportedKind(ProcedureKind),
}

#[derive(Debug, Clone, Default)]
pub struct FetchTransportConfig {
    /// Where the service is mounted, for example `http://localhost:4000/rspc`.
    pub uri: Arc<str>,
    /// Added to every request, for example an `authorization` header.
    pub custom_headers: HashMap<HeaderName, HeaderValue>,
}

impl FetchTransportConfig {
    pub fn with_uri(uri: impl Into<Arc<str>>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn custom_headers(mut self, custom_headers: HashMap<HeaderName, HeaderValue>) -> Self {
        self.custom_headers = custom_headers;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.custom_headers.insert(name, value);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchTransport {
    client: reqwest::Client,
    config: FetchTransportConfig,
}

impl FetchTransport {
    pub fn new(uri: impl Into<Arc<str>>) -> Self {
        Self::with_client(reqwest::Client::new(), FetchTransportConfig::with_uri(uri))
    }

    pub fn with_client(client: reqwest::Client, config: FetchTransportConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FetchTransportConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str], input: Option<&Value>) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.uri)?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidBaseUrl(self.config.uri.clone()))?
            .pop_if_empty()
            .extend(segments);
        if let Some(input) = input {
            url.query_pairs_mut()
                .append_pair("input", &serde_json::to_string(input)?);
        }
        Ok(url)
    }

    fn with_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.config.custom_headers {
            builder = builder.header(name.clone(), value.clone());
        }
        builder
    }
}

/// Reads a JSON response body. Bodies that are not a response are reported
/// with their status.
async fn read_response(response: reqwest::Response) -> Result<ResponseInner, FetchError> {
    let status = response.status();
    let body = response.bytes().await?;
    match serde_json::from_slice::<Response>(&body) {
        Ok(response) => Ok(response.result),
        Err(err) if status.is_success() => Err(FetchError::Deserialize(err)),
        Err(_) => Err(FetchError::UnexpectedStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        }),
    }
}

impl Transport for FetchTransport {
    type Error = FetchError;

    async fn request(
        &self,
        kind: ProcedureKind,
        key: Arc<str>,
        input: Option<Value>,
    ) -> Result<ResponseInner, FetchError> {
        let builder = match kind {
            ProcedureKind::Query => self.client.get(self.endpoint(&[&*key], input.as_ref())?),
            ProcedureKind::Mutation => {
                let body = match &input {
                    Some(input) => serde_json::to_vec(input)?,
                    None => Vec::new(),
                };
                self.client
                    .post(self.endpoint(&[&*key], None)?)
                    .header(CONTENT_TYPE, JSON_MIME_TYPE)
                    .body(body)
            }
            ProcedureKind::Subscription => return Err(FetchError::UnsupportedKind(kind)),
        };
        tracing::debug!(%kind, key = %key, "sending request");
        let response = self
            .with_headers(builder)
            .header(ACCEPT, JSON_MIME_TYPE)
            .send()
            .await?;
        read_response(response).await
    }

    async fn subscribe(
        &self,
        key: Arc<str>,
        input: Option<Value>,
    ) -> Result<BoxStream<'static, Result<ResponseInner, FetchError>>, FetchError> {
        let url = self.endpoint(&["subscribe", &*key], input.as_ref())?;
        tracing::debug!(key = %key, "opening subscription stream");
        let response = self
            .with_headers(self.client.get(url))
            .header(ACCEPT, EVENT_STREAM_MIME_TYPE)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => {}
            Some(ct) if ct.starts_with(JSON_MIME_TYPE) => {
                // the subscription was rejected before it started
                let result = read_response(response).await?;
                return Ok(stream::iter([Ok(result)]).boxed());
            }
            _ => return Err(FetchError::UnexpectedContentType(content_type)),
        }

        let events = SseStream::from_byte_stream(response.bytes_stream())
            .filter_map(|event| {
                ready(match event {
                    Ok(sse) => sse.data.map(|data| {
                        serde_json::from_str::<Response>(&data)
                            .map(|response| response.result)
                            .map_err(FetchError::from)
                    }),
                    Err(err) => Some(Err(FetchError::Sse(err))),
                })
            })
            .boxed();
        Ok(events)
    }
}
