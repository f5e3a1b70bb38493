//! Newline delimited JSON-RPC over any `AsyncRead`/`AsyncWrite` pair: stdio
//! of a child process, a TCP or unix socket, or an in memory duplex.
//!
//! Every line is one [`Request`](crate::model::Request) (client to server) or one
//! [`Response`](crate::model::Response) (server to client). Many requests and
//! subscriptions share the stream and are told apart by their id.

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

#[cfg(feature = "client")]
pub use self::client_side::IoTransport;
#[cfg(feature = "server")]
pub use self::server_side::{serve_io, serve_io_with_config};

#[derive(Error, Debug)]
pub enum IoTransportError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] LinesCodecError),
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Transport closed")]
    Closed,
    #[error("{0}s can not be sent as a single request")]
    UnsupportedKind(crate::model::ProcedureKind),
}

#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Longest line accepted from the peer, in bytes. Longer lines are
    /// skipped up to the next newline.
    pub max_line_length: usize,
}

impl IoConfig {
    pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_line_length: Self::DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// [`LinesCodec`] that yields unreadable lines (not UTF-8, too long) as
/// items, so one bad line does not end the stream. Only read errors of the
/// underlying reader are fatal.
#[derive(Debug)]
struct LineDecoder {
    inner: LinesCodec,
}

impl LineDecoder {
    fn lift(
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Result<String, LinesCodecError>>, std::io::Error> {
        match decoded {
            Ok(line) => Ok(line.map(Ok)),
            Err(err) => Ok(Some(Err(err))),
        }
    }
}

impl Decoder for LineDecoder {
    type Item = Result<String, LinesCodecError>;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::lift(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Self::lift(self.inner.decode_eof(buf))
    }
}

type Lines<R> = FramedRead<R, LineDecoder>;
type LinesSink<W> = FramedWrite<W, LinesCodec>;

fn framed<R, W>(reader: R, writer: W, config: &IoConfig) -> (Lines<R>, LinesSink<W>)
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let decoder = LineDecoder {
        inner: LinesCodec::new_with_max_length(config.max_line_length),
    };
    (
        FramedRead::new(reader, decoder),
        FramedWrite::new(writer, LinesCodec::new()),
    )
}

async fn write_line<W, T>(sink: &mut LinesSink<W>, message: &T) -> Result<(), IoTransportError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    sink.send(serde_json::to_string(message)?).await?;
    Ok(())
}

#[cfg(feature = "server")]
mod server_side {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        ErrorCode, Router,
        model::{ErrorData, Request, RequestId, Response},
        service::Connection,
    };

    const RESPONSE_BUFFER: usize = 64;

    /// [`serve_io_with_config`] with the default [`IoConfig`].
    pub async fn serve_io<TCtx, R, W>(
        router: Arc<Router<TCtx>>,
        ctx: TCtx,
        reader: R,
        writer: W,
    ) -> Result<(), IoTransportError>
    where
        TCtx: Clone + Send + Sync + 'static,
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        serve_io_with_config(router, ctx, reader, writer, IoConfig::default()).await
    }

    /// Serves `router` on one reader/writer pair until the reader reaches
    /// EOF and every started query or mutation has been answered.
    ///
    /// Reading and writing run side by side, so a peer that is busy sending
    /// never waits for us to finish writing. Running subscriptions are
    /// cancelled at EOF. Lines that are not a valid request are answered
    /// with an error whose id is `null`.
    pub async fn serve_io_with_config<TCtx, R, W>(
        router: Arc<Router<TCtx>>,
        ctx: TCtx,
        reader: R,
        writer: W,
        config: IoConfig,
    ) -> Result<(), IoTransportError>
    where
        TCtx: Clone + Send + Sync + 'static,
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let connection = Connection::new(router, ctx, tx.clone());
        let (lines, sink) = framed(reader, writer, &config);
        tokio::try_join!(read_requests(lines, connection, tx), write_responses(sink, rx))?;
        tracing::debug!("io transport finished");
        Ok(())
    }

    async fn read_requests<TCtx, R>(
        mut lines: Lines<R>,
        mut connection: Connection<TCtx>,
        tx: mpsc::Sender<Response>,
    ) -> Result<(), IoTransportError>
    where
        TCtx: Clone + Send + Sync + 'static,
        R: AsyncRead + Unpin,
    {
        while let Some(line) = lines.next().await {
            let line = match line? {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!("unreadable request line: {err}");
                    reject(&tx, format!("unreadable request line: {err}")).await;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => connection.handle(request),
                Err(err) => {
                    tracing::warn!("invalid request line: {err}");
                    reject(&tx, format!("invalid request: {err}")).await;
                }
            }
        }
        tracing::debug!("input closed, waiting for pending responses");
        Ok(())
    }

    async fn reject(tx: &mpsc::Sender<Response>, message: String) {
        let response = Response::error(
            RequestId::Null,
            ErrorData::new(ErrorCode::BadRequest, message),
        );
        if tx.send(response).await.is_err() {
            tracing::trace!("output closed, dropping error response");
        }
    }

    async fn write_responses<W>(
        mut sink: LinesSink<W>,
        mut rx: mpsc::Receiver<Response>,
    ) -> Result<(), IoTransportError>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(response) = rx.recv().await {
            write_line(&mut sink, &response).await?;
        }
        Ok(())
    }
}

#[cfg(feature = "client")]
mod client_side {
    use std::{
        collections::HashMap,
        pin::Pin,
        sync::{
            Arc, Mutex, MutexGuard, PoisonError,
            atomic::{AtomicU32, Ordering},
        },
        task::{Context, Poll},
    };

    use futures::{Stream, stream::BoxStream};
    use serde_json::Value;
    use tokio::sync::{mpsc, oneshot};
    use tokio_util::sync::{CancellationToken, DropGuard};

    use super::*;
    use crate::{
        model::{ProcedureKind, Request, RequestId, RequestInner, Response, ResponseInner},
        transport::Transport,
    };

    enum Outgoing {
        Request {
            request: Request,
            responder: oneshot::Sender<ResponseInner>,
        },
        Subscribe {
            request: Request,
            events: mpsc::UnboundedSender<ResponseInner>,
        },
        Stop {
            id: u32,
        },
    }

    /// Client over a reader/writer pair. A background task owns both halves
    /// and routes responses back to their callers by request id.
    ///
    /// Dropping the transport stops the task.
    #[derive(Debug, Clone)]
    pub struct IoTransport {
        tx: mpsc::UnboundedSender<Outgoing>,
        next_id: Arc<AtomicU32>,
        _guard: Arc<DropGuard>,
    }

    impl IoTransport {
        /// [`IoTransport::with_config`] with the default [`IoConfig`].
        pub fn new<R, W>(reader: R, writer: W) -> Self
        where
            R: AsyncRead + Send + Unpin + 'static,
            W: AsyncWrite + Send + Unpin + 'static,
        {
            Self::with_config(reader, writer, IoConfig::default())
        }

        /// Spawns the worker task; must be called within a tokio runtime.
        pub fn with_config<R, W>(reader: R, writer: W, config: IoConfig) -> Self
        where
            R: AsyncRead + Send + Unpin + 'static,
            W: AsyncWrite + Send + Unpin + 'static,
        {
            let (tx, rx) = mpsc::unbounded_channel();
            let ct = CancellationToken::new();
            let (lines, sink) = framed(reader, writer, &config);
            tokio::spawn(run_worker(lines, sink, rx, ct.child_token()));
            Self {
                tx,
                next_id: Arc::new(AtomicU32::new(1)),
                _guard: Arc::new(ct.drop_guard()),
            }
        }

        fn next_id(&self) -> u32 {
            self.next_id.fetch_add(1, Ordering::Relaxed)
        }
    }

    /// Where responses go, by request id.
    #[derive(Default)]
    struct Routes {
        pending: HashMap<u32, oneshot::Sender<ResponseInner>>,
        subscriptions: HashMap<u32, mpsc::UnboundedSender<ResponseInner>>,
    }

    type SharedRoutes = Mutex<Routes>;

    fn lock(routes: &SharedRoutes) -> MutexGuard<'_, Routes> {
        routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_worker<R, W>(
        lines: Lines<R>,
        sink: LinesSink<W>,
        rx: mpsc::UnboundedReceiver<Outgoing>,
        ct: CancellationToken,
    ) where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let routes = SharedRoutes::default();
        let quit_reason = tokio::select! {
            _ = ct.cancelled() => "cancelled",
            reason = write_requests(sink, rx, &routes) => reason,
            reason = read_responses(lines, &routes) => reason,
        };
        let routes = lock(&routes);
        tracing::debug!(
            reason = quit_reason,
            pending = routes.pending.len(),
            subscriptions = routes.subscriptions.len(),
            "io transport worker quit"
        );
    }

    async fn write_requests<W>(
        mut sink: LinesSink<W>,
        mut rx: mpsc::UnboundedReceiver<Outgoing>,
        routes: &SharedRoutes,
    ) -> &'static str
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(outgoing) = rx.recv().await {
            // registered before writing, so the response always finds its route
            let request = {
                let mut routes = lock(routes);
                match outgoing {
                    Outgoing::Request { request, responder } => {
                        if let RequestId::Number(id) = request.id {
                            routes.pending.insert(id, responder);
                        }
                        request
                    }
                    Outgoing::Subscribe { request, events } => {
                        if let RequestId::Number(id) = request.id {
                            routes.subscriptions.insert(id, events);
                        }
                        request
                    }
                    Outgoing::Stop { id } => {
                        if routes.subscriptions.remove(&id).is_none() {
                            continue;
                        }
                        Request::new(id, RequestInner::SubscriptionStop)
                    }
                }
            };
            if let Err(err) = write_line(&mut sink, &request).await {
                tracing::error!("failed to write request: {err}");
                return "write failed";
            }
        }
        "transport dropped"
    }

    async fn read_responses<R>(mut lines: Lines<R>, routes: &SharedRoutes) -> &'static str
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let line = match lines.next().await {
                Some(Ok(Ok(line))) => line,
                Some(Ok(Err(err))) => {
                    tracing::warn!("unreadable server line: {err}");
                    continue;
                }
                Some(Err(err)) => {
                    tracing::error!("failed to read response: {err}");
                    return "read failed";
                }
                None => return "server closed the stream",
            };
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Response>(&line) {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!("failed to deserialize server message: {err}");
                    continue;
                }
            };
            let RequestId::Number(id) = response.id else {
                tracing::warn!(id = %response.id, result = ?response.result, "response without a request");
                continue;
            };
            let mut routes = lock(routes);
            if let Some(responder) = routes.pending.remove(&id) {
                let _ = responder.send(response.result);
            } else if let Some(events) = routes.subscriptions.get(&id) {
                let complete = response.result == ResponseInner::Complete;
                if events.send(response.result).is_err() || complete {
                    routes.subscriptions.remove(&id);
                }
            } else {
                tracing::trace!(id, "response for a finished request");
            }
        }
    }

    /// Receives one subscription's results; dropping it before completion
    /// sends `subscriptionStop`.
    struct SubscriptionReceiver {
        id: u32,
        rx: mpsc::UnboundedReceiver<ResponseInner>,
        tx: mpsc::UnboundedSender<Outgoing>,
        finished: bool,
    }

    impl Stream for SubscriptionReceiver {
        type Item = Result<ResponseInner, IoTransportError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            if self.finished {
                return Poll::Ready(None);
            }
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(result)) => {
                    if result == ResponseInner::Complete {
                        self.finished = true;
                    }
                    Poll::Ready(Some(Ok(result)))
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            }
        }
    }

    impl Drop for SubscriptionReceiver {
        fn drop(&mut self) {
            if !self.finished {
                let _ = self.tx.send(Outgoing::Stop { id: self.id });
            }
        }
    }

    impl Transport for IoTransport {
        type Error = IoTransportError;

        async fn request(
            &self,
            kind: ProcedureKind,
            key: Arc<str>,
            input: Option<Value>,
        ) -> Result<ResponseInner, IoTransportError> {
            if kind == ProcedureKind::Subscription {
                return Err(IoTransportError::UnsupportedKind(kind));
            }
            let id = self.next_id();
            let request = Request::new(id, RequestInner::procedure(kind, &*key, input));
            let (responder, response) = oneshot::channel();
            self.tx
                .send(Outgoing::Request { request, responder })
                .map_err(|_| IoTransportError::Closed)?;
            response.await.map_err(|_| IoTransportError::Closed)
        }

        async fn subscribe(
            &self,
            key: Arc<str>,
            input: Option<Value>,
        ) -> Result<BoxStream<'static, Result<ResponseInner, IoTransportError>>, IoTransportError>
        {
            let id = self.next_id();
            let request = Request::new(
                id,
                RequestInner::procedure(ProcedureKind::Subscription, &*key, input),
            );
            let (events, rx) = mpsc::unbounded_channel();
            self.tx
                .send(Outgoing::Subscribe { request, events })
                .map_err(|_| IoTransportError::Closed)?;
            Ok(SubscriptionReceiver {
                id,
                rx,
                tx: self.tx.clone(),
                finished: false,
            }
            .boxed())
        }
    }
}
