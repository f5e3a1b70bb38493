//! Conversions from whatever a resolver returns into the uniform shapes the
//! router executes.
//!
//! Queries and mutations may return a value, a `Result<_, Error>`, or a
//! future of either. Subscriptions may return a stream, a `Result` of a
//! stream, or a future of either. The marker type parameter only exists so
//! these blanket impls do not overlap; callers never name it.

use std::future::{Future, ready};

use futures::{
    FutureExt, Stream, StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, ExecError};

pub type ProcedureStream = BoxStream<'static, Result<Value, ExecError>>;

/// Output of a query or mutation resolver.
pub trait ResolverOutput<TMarker>: Send + 'static {
    /// The type that ends up in the response, used for bindings.
    type Output: Serialize + JsonSchema;

    fn into_value(self) -> BoxFuture<'static, Result<Value, ExecError>>;
}

/// Output of a subscription resolver.
pub trait StreamResolverOutput<TMarker>: Send + 'static {
    /// The type of each event, used for bindings.
    type Item: Serialize + JsonSchema;

    fn into_stream(self) -> ProcedureStream;
}

fn serialize<T: Serialize>(value: T) -> Result<Value, ExecError> {
    serde_json::to_value(value).map_err(ExecError::SerializingResult)
}

fn failed(err: Error) -> ProcedureStream {
    stream::once(ready(Err(ExecError::Resolver(err)))).boxed()
}

#[doc(hidden)]
pub enum SerializeMarker {}
impl<T> ResolverOutput<SerializeMarker> for T
where
    T: Serialize + JsonSchema + Send + 'static,
{
    type Output = T;

    fn into_value(self) -> BoxFuture<'static, Result<Value, ExecError>> {
        ready(serialize(self)).boxed()
    }
}

#[doc(hidden)]
pub enum ResultMarker {}
impl<T> ResolverOutput<ResultMarker> for Result<T, Error>
where
    T: Serialize + JsonSchema + Send + 'static,
{
    type Output = T;

    fn into_value(self) -> BoxFuture<'static, Result<Value, ExecError>> {
        ready(self.map_err(ExecError::Resolver).and_then(serialize)).boxed()
    }
}

#[doc(hidden)]
pub enum FutureMarker {}
impl<TFut, T> ResolverOutput<FutureMarker> for TFut
where
    TFut: Future<Output = T> + Send + 'static,
    T: Serialize + JsonSchema + Send + 'static,
{
    type Output = T;

    fn into_value(self) -> BoxFuture<'static, Result<Value, ExecError>> {
        self.map(serialize).boxed()
    }
}

#[doc(hidden)]
pub enum FutureResultMarker {}
impl<TFut, T> ResolverOutput<FutureResultMarker> for TFut
where
    TFut: Future<Output = Result<T, Error>> + Send + 'static,
    T: Serialize + JsonSchema + Send + 'static,
{
    type Output = T;

    fn into_value(self) -> BoxFuture<'static, Result<Value, ExecError>> {
        self.map(|result| result.map_err(ExecError::Resolver).and_then(serialize))
            .boxed()
    }
}

#[doc(hidden)]
pub enum StreamMarker {}
impl<TStream, T> StreamResolverOutput<StreamMarker> for TStream
where
    TStream: Stream<Item = T> + Send + 'static,
    T: Serialize + JsonSchema + Send + 'static,
{
    type Item = T;

    fn into_stream(self) -> ProcedureStream {
        self.map(serialize).boxed()
    }
}

#[doc(hidden)]
pub enum ResultStreamMarker {}
impl<TStream, T> StreamResolverOutput<ResultStreamMarker> for Result<TStream, Error>
where
    TStream: Stream<Item = T> + Send + 'static,
    T: Serialize + JsonSchema + Send + 'static,
{
    type Item = T;

    fn into_stream(self) -> ProcedureStream {
        match self {
            Ok(stream) => stream.map(serialize).boxed(),
            Err(err) => failed(err),
        }
    }
}

#[doc(hidden)]
pub enum FutureStreamMarker {}
impl<TFut, TStream, T> StreamResolverOutput<FutureStreamMarker> for TFut
where
    TFut: Future<Output = TStream> + Send + 'static,
    TStream: Stream<Item = T> + Send + 'static,
    T: Serialize + JsonSchema + Send + 'static,
{
    type Item = T;

    fn into_stream(self) -> ProcedureStream {
        self.map(|stream| stream.map(serialize)).flatten_stream().boxed()
    }
}

#[doc(hidden)]
pub enum FutureResultStreamMarker {}
impl<TFut, TStream, T> StreamResolverOutput<FutureResultStreamMarker> for TFut
where
    TFut: Future<Output = Result<TStream, Error>> + Send + 'static,
    TStream: Stream<Item = T> + Send + 'static,
    T: Serialize + JsonSchema + Send + 'static,
{
    type Item = T;

    fn into_stream(self) -> ProcedureStream {
        self.map(|result| match result {
            Ok(stream) => stream.map(serialize).boxed(),
            Err(err) => failed(err),
        })
        .flatten_stream()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::ErrorCode;

    async fn value_of<M, R: ResolverOutput<M>>(output: R) -> Result<Value, ExecError> {
        output.into_value().await
    }

    async fn collect<M, R: StreamResolverOutput<M>>(output: R) -> Vec<Result<Value, ExecError>> {
        output.into_stream().collect().await
    }

    #[tokio::test]
    async fn test_value_outputs() {
        assert_eq!(value_of("plain").await.unwrap(), json!("plain"));
        assert_eq!(
            value_of(Ok::<_, Error>(vec![1, 2])).await.unwrap(),
            json!([1, 2])
        );
        assert_eq!(value_of(async { 5u8 }).await.unwrap(), json!(5));
        assert_eq!(
            value_of(async { Ok::<_, Error>(true) }).await.unwrap(),
            json!(true)
        );
    }

    #[tokio::test]
    async fn test_error_outputs_keep_the_resolver_error() {
        let result = value_of(Err::<u8, _>(Error::new(ErrorCode::Conflict, "taken"))).await;
        match result {
            Err(ExecError::Resolver(err)) => assert_eq!(err.code(), ErrorCode::Conflict),
            other => panic!("Expected resolver error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_outputs() {
        let items = collect(stream::iter([1, 2, 3])).await;
        assert_eq!(items.len(), 3);

        let items = collect(async { stream::iter(["a"]) }).await;
        assert_eq!(items[0].as_ref().unwrap(), &json!("a"));

        let items = collect(Err::<stream::Iter<std::vec::IntoIter<u8>>, _>(Error::new(
            ErrorCode::Unauthorized,
            "log in first",
        )))
        .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ExecError::Resolver(_))));

        let items = collect(async {
            Err::<stream::Empty<u8>, _>(Error::new(ErrorCode::Forbidden, "no"))
        })
        .await;
        assert_eq!(items.len(), 1);
    }
}
