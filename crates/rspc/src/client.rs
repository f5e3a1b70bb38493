//! Calling procedures from Rust.
//!
//! [`Client`] works with untyped keys, or with descriptors declared through
//! [`procedures!`](crate::procedures) which tie each key to its input and
//! output types at compile time.
//!
//! ```rust,ignore
//! rspc::procedures! {
//!     pub query Version("version"): () => String;
//!     pub subscription Pings("pings"): u32 => String;
//! }
//!
//! let client = Client::new(FetchTransport::new("http://localhost:4000/rspc"));
//! let version = client.execute::<Version>(()).await?;
//! let mut pings = client.subscribe::<Pings>(3).await?;
//! while let Some(ping) = pings.next().await { /* ... */ }
//! ```

mod macros;

use std::{
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll, ready},
};

use futures::{Stream, StreamExt, stream::BoxStream};
use pin_project_lite::pin_project;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use crate::{
    ErrorCode,
    model::{ErrorData, ProcedureKind, ResponseInner},
    transport::Transport,
};

pub mod kind {
    //! Marker types for the kind of a [`Procedure`](super::Procedure).
    use crate::model::ProcedureKind;

    #[derive(Debug, Clone, Copy)]
    pub struct Query;
    #[derive(Debug, Clone, Copy)]
    pub struct Mutation;
    #[derive(Debug, Clone, Copy)]
    pub struct Subscription;

    /// Kinds answered by a single response.
    pub trait RequestKind {
        const KIND: ProcedureKind;
    }

    impl RequestKind for Query {
        const KIND: ProcedureKind = ProcedureKind::Query;
    }

    impl RequestKind for Mutation {
        const KIND: ProcedureKind = ProcedureKind::Mutation;
    }
}

/// A procedure known at compile time, usually declared with
/// [`procedures!`](crate::procedures).
pub trait Procedure {
    const KEY: &'static str;
    /// One of the markers in [`kind`].
    type Kind;
    type Input: Serialize;
    type Output: DeserializeOwned;
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Procedure error: {0}")]
    Procedure(ErrorData),
    #[error("Deserialize error: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    pub fn transport(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(error))
    }

    /// The code of an error reported by the server, if it is one this crate
    /// defines.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Procedure(error) => error.error_code(),
            _ => None,
        }
    }
}

fn encode_input(input: impl Serialize) -> Result<Option<Value>, ClientError> {
    match serde_json::to_value(input).map_err(ClientError::Serialize)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

#[derive(Debug, Clone)]
pub struct Client<T> {
    transport: T,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub async fn query<O: DeserializeOwned>(
        &self,
        key: &str,
        input: impl Serialize,
    ) -> Result<O, ClientError> {
        self.request(ProcedureKind::Query, key, encode_input(input)?)
            .await
    }

    pub async fn mutation<O: DeserializeOwned>(
        &self,
        key: &str,
        input: impl Serialize,
    ) -> Result<O, ClientError> {
        self.request(ProcedureKind::Mutation, key, encode_input(input)?)
            .await
    }

    /// Starts a subscription. The returned stream ends once the server
    /// reports completion; dropping it earlier stops the subscription.
    pub async fn subscription<O: DeserializeOwned>(
        &self,
        key: &str,
        input: impl Serialize,
    ) -> Result<Subscription<O>, ClientError> {
        let input = encode_input(input)?;
        tracing::debug!(key, "starting subscription");
        let stream = self
            .transport
            .subscribe(key.into(), input)
            .await
            .map_err(ClientError::transport)?;
        Ok(Subscription::new(
            stream.map(|item| item.map_err(ClientError::transport)).boxed(),
        ))
    }

    pub async fn execute<P>(&self, input: P::Input) -> Result<P::Output, ClientError>
    where
        P: Procedure,
        P::Kind: kind::RequestKind,
    {
        let kind = <P::Kind as kind::RequestKind>::KIND;
        self.request(kind, P::KEY, encode_input(input)?).await
    }

    pub async fn subscribe<P>(&self, input: P::Input) -> Result<Subscription<P::Output>, ClientError>
    where
        P: Procedure<Kind = kind::Subscription>,
    {
        self.subscription(P::KEY, input).await
    }

    async fn request<O: DeserializeOwned>(
        &self,
        kind: ProcedureKind,
        key: &str,
        input: Option<Value>,
    ) -> Result<O, ClientError> {
        tracing::debug!(%kind, key, "sending request");
        let result = self
            .transport
            .request(kind, key.into(), input)
            .await
            .map_err(ClientError::transport)?;
        match result {
            ResponseInner::Response(value) => {
                serde_json::from_value(value).map_err(ClientError::Deserialize)
            }
            ResponseInner::Error(error) => Err(ClientError::Procedure(error)),
            other => Err(ClientError::UnexpectedResponse(format!(
                "expected a response to {kind} '{key}', got {other:?}"
            ))),
        }
    }
}

pin_project! {
    /// The events of one subscription, decoded as `T`.
    ///
    /// Errors reported by the server are yielded as
    /// [`ClientError::Procedure`] without ending the stream.
    pub struct Subscription<T> {
        #[pin]
        inner: BoxStream<'static, Result<ResponseInner, ClientError>>,
        complete: bool,
        _output: PhantomData<fn() -> T>,
    }
}

impl<T> Subscription<T> {
    fn new(inner: BoxStream<'static, Result<ResponseInner, ClientError>>) -> Self {
        Self {
            inner,
            complete: false,
            _output: PhantomData,
        }
    }

    /// Whether the server reported the end of the subscription.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> Stream for Subscription<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.complete {
            return Poll::Ready(None);
        }
        let item = match ready!(this.inner.poll_next(cx)) {
            None => None,
            Some(Err(err)) => Some(Err(err)),
            Some(Ok(ResponseInner::Event(value))) => {
                Some(serde_json::from_value(value).map_err(ClientError::Deserialize))
            }
            Some(Ok(ResponseInner::Error(error))) => Some(Err(ClientError::Procedure(error))),
            Some(Ok(ResponseInner::Complete)) => {
                *this.complete = true;
                None
            }
            Some(Ok(other @ ResponseInner::Response(_))) => Some(Err(
                ClientError::UnexpectedResponse(format!("expected an event, got {other:?}")),
            )),
        };
        Poll::Ready(item)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::stream;
    use serde_json::json;

    use super::*;

    /// Answers from a script and records what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Mutex<Vec<(ProcedureKind, String, Option<Value>)>>,
        events: Vec<ResponseInner>,
    }

    #[derive(Debug, Error)]
    #[error("scripted failure")]
    struct ScriptedError;

    impl Transport for ScriptedTransport {
        type Error = ScriptedError;

        async fn request(
            &self,
            kind: ProcedureKind,
            key: Arc<str>,
            input: Option<Value>,
        ) -> Result<ResponseInner, ScriptedError> {
            self.sent
                .lock()
                .unwrap()
                .push((kind, key.to_string(), input.clone()));
            match &*key {
                "fail" => Err(ScriptedError),
                "denied" => Ok(ResponseInner::Error(ErrorData::new(
                    ErrorCode::Forbidden,
                    "denied",
                ))),
                _ => Ok(ResponseInner::Response(input.unwrap_or(Value::Null))),
            }
        }

        async fn subscribe(
            &self,
            _key: Arc<str>,
            _input: Option<Value>,
        ) -> Result<BoxStream<'static, Result<ResponseInner, ScriptedError>>, ScriptedError>
        {
            Ok(stream::iter(self.events.clone().into_iter().map(Ok)).boxed())
        }
    }

    crate::procedures! {
        /// Echoes its input.
        query Echo("echo"): u32 => u32;
        mutation Reset("reset"): () => Option<u32>;
        subscription Ticks("ticks"): () => u32;
    }

    #[tokio::test]
    async fn test_unit_input_is_sent_without_input() {
        let client = Client::new(ScriptedTransport::default());
        let result: Option<u32> = client.execute::<Reset>(()).await.unwrap();
        assert_eq!(result, None);
        let echoed = client.execute::<Echo>(5).await.unwrap();
        assert_eq!(echoed, 5);

        let sent = client.transport().sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (ProcedureKind::Mutation, "reset".to_owned(), None),
                (ProcedureKind::Query, "echo".to_owned(), Some(json!(5))),
            ]
        );
    }

    #[tokio::test]
    async fn test_errors() {
        let client = Client::new(ScriptedTransport::default());
        let err = client.query::<()>("denied", ()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Forbidden));

        let err = client.query::<()>("fail", ()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));

        let err = client.query::<String>("echo", 1).await.unwrap_err();
        assert!(matches!(err, ClientError::Deserialize(_)));
    }

    #[tokio::test]
    async fn test_subscription_ends_at_complete() {
        let client = Client::new(ScriptedTransport {
            events: vec![
                ResponseInner::Event(json!(1)),
                ResponseInner::Error(ErrorData::new(ErrorCode::Conflict, "skipped")),
                ResponseInner::Event(json!(2)),
                ResponseInner::Complete,
                ResponseInner::Event(json!(3)),
            ],
            ..Default::default()
        });
        let mut ticks = client.subscribe::<Ticks>(()).await.unwrap();
        assert_eq!(ticks.next().await.unwrap().unwrap(), 1);
        assert_eq!(
            ticks.next().await.unwrap().unwrap_err().code(),
            Some(ErrorCode::Conflict)
        );
        assert_eq!(ticks.next().await.unwrap().unwrap(), 2);
        assert!(ticks.next().await.is_none());
        assert!(ticks.is_complete());
        assert!(ticks.next().await.is_none());
    }

    #[test]
    fn test_procedure_descriptors() {
        assert_eq!(Echo::KEY, "echo");
        assert_eq!(<<Echo as Procedure>::Kind as kind::RequestKind>::KIND, ProcedureKind::Query);
        assert_eq!(<<Reset as Procedure>::Kind as kind::RequestKind>::KIND, ProcedureKind::Mutation);
        assert_eq!(Ticks::KEY, "ticks");
    }
}
