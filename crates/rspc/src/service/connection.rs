use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    ExecError, Router,
    model::{ProcedureKind, Request, RequestId, RequestInner, Response, ResponseInner},
};

type SubscriptionMap = Arc<Mutex<HashMap<RequestId, (u64, CancellationToken)>>>;

/// Executes requests against a router on behalf of one client.
///
/// Queries and mutations run concurrently, each answered by exactly one
/// response. Subscriptions stay active until their stream ends, a
/// `subscriptionStop` with the same id arrives, or the connection is dropped.
pub struct Connection<TCtx> {
    router: Arc<Router<TCtx>>,
    ctx: TCtx,
    tx: mpsc::Sender<Response>,
    subscriptions: SubscriptionMap,
    generation: u64,
    ct: CancellationToken,
}

impl<TCtx> std::fmt::Debug for Connection<TCtx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("subscriptions", &self.subscription_count())
            .field("cancelled", &self.ct.is_cancelled())
            .finish()
    }
}

impl<TCtx> Connection<TCtx>
where
    TCtx: Clone + Send + Sync + 'static,
{
    pub fn new(router: Arc<Router<TCtx>>, ctx: TCtx, tx: mpsc::Sender<Response>) -> Self {
        Self {
            router,
            ctx,
            tx,
            subscriptions: Default::default(),
            generation: 0,
            ct: CancellationToken::new(),
        }
    }

    /// Starts handling `request`. Responses are delivered through the
    /// channel given to [`Connection::new`]; this never waits on it.
    pub fn handle(&mut self, request: Request) {
        let Request { id, inner, .. } = request;
        match inner {
            RequestInner::Query { path, input } => {
                self.exec(id, ProcedureKind::Query, path, input)
            }
            RequestInner::Mutation { path, input } => {
                self.exec(id, ProcedureKind::Mutation, path, input)
            }
            RequestInner::Subscription { path, input } => self.subscribe(id, path, input),
            RequestInner::SubscriptionStop => self.stop(&id),
        }
    }

    fn exec(&self, id: RequestId, kind: ProcedureKind, key: String, input: Option<Value>) {
        tracing::debug!(%id, %kind, %key, "handling request");
        let router = self.router.clone();
        let ctx = self.ctx.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let response = match router.exec(ctx, kind, &key, input).await {
                Ok(value) => Response::new(id, ResponseInner::Response(value)),
                Err(err) => {
                    tracing::debug!(%id, %kind, %key, "request failed: {err}");
                    Response::error(id, err)
                }
            };
            if tx.send(response).await.is_err() {
                tracing::trace!("connection closed before the response was sent");
            }
        });
    }

    fn subscribe(&mut self, id: RequestId, key: String, input: Option<Value>) {
        if id == RequestId::Null {
            tracing::warn!(%key, "subscription started with a null id");
            self.respond([Response::error(id, ExecError::SubscriptionWithNullId)]);
            return;
        }

        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscriptions.contains_key(&id) {
            drop(subscriptions);
            tracing::warn!(%id, %key, "subscription id is already in use");
            self.respond([Response::error(
                id.clone(),
                ExecError::SubscriptionDuplicateId(id),
            )]);
            return;
        }

        let mut stream = match self.router.exec_subscription(self.ctx.clone(), &key, input) {
            Ok(stream) => stream,
            Err(err) => {
                drop(subscriptions);
                tracing::debug!(%id, %key, "subscription failed to start: {err}");
                self.respond([
                    Response::error(id.clone(), err),
                    Response::new(id, ResponseInner::Complete),
                ]);
                return;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let ct = self.ct.child_token();
        subscriptions.insert(id.clone(), (generation, ct.clone()));
        drop(subscriptions);
        tracing::debug!(%id, %key, "subscription started");

        let tx = self.tx.clone();
        let registry = self.subscriptions.clone();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    item = stream.next() => item,
                    _ = ct.cancelled() => {
                        tracing::debug!(%id, %key, "subscription cancelled");
                        break;
                    }
                };
                let (response, finished) = match item {
                    Some(Ok(value)) => (ResponseInner::Event(value), false),
                    Some(Err(err)) => (ResponseInner::Error(err.into()), false),
                    None => (ResponseInner::Complete, true),
                };
                if tx.send(Response::new(id.clone(), response)).await.is_err() {
                    tracing::trace!(%id, "connection closed, dropping subscription");
                    break;
                }
                if finished {
                    tracing::debug!(%id, %key, "subscription complete");
                    break;
                }
            }

            let mut subscriptions = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if subscriptions
                .get(&id)
                .is_some_and(|(active, _)| *active == generation)
            {
                subscriptions.remove(&id);
            }
        });
    }

    fn stop(&self, id: &RequestId) {
        let stopped = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match stopped {
            Some((_, ct)) => {
                tracing::debug!(%id, "stopping subscription");
                ct.cancel();
            }
            None => tracing::trace!(%id, "no running subscription to stop"),
        }
    }

    fn respond<const N: usize>(&self, responses: [Response; N]) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            for response in responses {
                if tx.send(response).await.is_err() {
                    break;
                }
            }
        });
    }
}

impl<TCtx> Connection<TCtx> {
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancels every running subscription. Queries and mutations already
    /// started still deliver their response.
    pub fn shutdown(&self) {
        self.ct.cancel();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<TCtx> Drop for Connection<TCtx> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use serde_json::json;

    use super::*;
    use crate::{ErrorCode, model::ErrorData};

    fn router() -> Arc<Router<()>> {
        Router::<()>::new()
            .query("echo", |_, input: String| input)
            .subscription("count", |_, to: u32| stream::iter(0..to))
            .subscription("forever", |_, _: ()| {
                stream::unfold(0u32, |n| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Some((n, n + 1))
                })
            })
            .build()
            .unwrap()
            .arced()
    }

    fn subscribe(id: impl Into<RequestId>, key: &str, input: Value) -> Request {
        Request::new(
            id,
            RequestInner::Subscription {
                path: key.into(),
                input: Some(input),
            },
        )
    }

    #[tokio::test]
    async fn test_query_gets_one_response() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut connection = Connection::new(router(), (), tx);
        connection.handle(Request::new(
            1,
            RequestInner::Query {
                path: "echo".into(),
                input: Some(json!("hi")),
            },
        ));
        let response = rx.recv().await.unwrap();
        assert_eq!(response.id, RequestId::Number(1));
        assert_eq!(response.result, ResponseInner::Response(json!("hi")));
    }

    #[tokio::test]
    async fn test_subscription_events_then_complete() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut connection = Connection::new(router(), (), tx);
        connection.handle(subscribe(7, "count", json!(2)));
        let mut results = Vec::new();
        for _ in 0..3 {
            results.push(rx.recv().await.unwrap().result);
        }
        assert_eq!(
            results,
            vec![
                ResponseInner::Event(json!(0)),
                ResponseInner::Event(json!(1)),
                ResponseInner::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_null_id_subscription_is_rejected() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut connection = Connection::new(router(), (), tx);
        connection.handle(subscribe(RequestId::Null, "count", json!(1)));
        let response = rx.recv().await.unwrap();
        let ResponseInner::Error(ErrorData { code, .. }) = response.result else {
            panic!("Expected error, got {:?}", response.result);
        };
        assert_eq!(code, ErrorCode::BadRequest.to_status_code() as i32);
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_and_stop() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut connection = Connection::new(router(), (), tx);
        connection.handle(subscribe("a", "forever", json!(null)));
        assert_eq!(rx.recv().await.unwrap().result, ResponseInner::Event(json!(0)));

        connection.handle(subscribe("a", "forever", json!(null)));
        loop {
            let response = rx.recv().await.unwrap();
            if let ResponseInner::Error(error) = response.result {
                assert_eq!(error.code, 400);
                break;
            }
        }

        connection.handle(Request::new("a", RequestInner::SubscriptionStop));
        assert_eq!(connection.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_subscription_errors_then_completes() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut connection = Connection::new(router(), (), tx);
        connection.handle(subscribe(3, "missing", json!(null)));
        let first = rx.recv().await.unwrap();
        assert!(matches!(first.result, ResponseInner::Error(ref e) if e.code == 404));
        assert_eq!(rx.recv().await.unwrap().result, ResponseInner::Complete);
    }

    #[tokio::test]
    async fn test_drop_cancels_subscriptions() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut connection = Connection::new(router(), (), tx);
        connection.handle(subscribe(1, "forever", json!(null)));
        assert!(rx.recv().await.is_some());
        drop(connection);
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "subscription kept running after drop");
    }
}
