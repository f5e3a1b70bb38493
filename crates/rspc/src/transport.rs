//! Ways to carry requests between a client and a [`Router`](crate::Router).
//!
//! | transport | server side | client side | subscriptions |
//! |-----------|-------------|-------------|---------------|
//! | HTTP | [`axum::HttpService`] | [`fetch::FetchTransport`] | server sent events |
//! | newline delimited JSON over `AsyncRead`/`AsyncWrite` | [`io::serve_io`] | [`io::IoTransport`] | multiplexed by request id |
//!
//! A client transport implements [`Transport`]; the typed API on top of it
//! lives in [`Client`](crate::Client).

#[cfg(feature = "server-side-http")]
#[cfg_attr(docsrs, doc(cfg(feature = "server-side-http")))]
pub mod axum;

#[cfg(feature = "client-reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "client-reqwest")))]
pub mod fetch;

#[cfg(feature = "transport-io")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport-io")))]
pub mod io;

#[cfg(feature = "client")]
mod client_side {
    use std::{future::Future, sync::Arc};

    use futures::stream::BoxStream;
    use serde_json::Value;

    use crate::model::{ProcedureKind, ResponseInner};

    /// The client half of a transport.
    pub trait Transport: Send + Sync + 'static {
        type Error: std::error::Error + Send + Sync + 'static;

        /// Sends a query or mutation and waits for its single result.
        fn request(
            &self,
            kind: ProcedureKind,
            key: Arc<str>,
            input: Option<Value>,
        ) -> impl Future<Output = Result<ResponseInner, Self::Error>> + Send + '_;

        /// Starts a subscription. The stream carries `event`, `error` and
        /// finally `complete` results; dropping it stops the subscription.
        fn subscribe(
            &self,
            key: Arc<str>,
            input: Option<Value>,
        ) -> impl Future<
            Output = Result<BoxStream<'static, Result<ResponseInner, Self::Error>>, Self::Error>,
        > + Send
        + '_;
    }
}

#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub use client_side::Transport;
