use anyhow::Result;
use rspc::{
    Config,
    transport::axum::{HttpServerConfig, HttpService},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod common;
use common::todos::{Todos, router};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:4000";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());

    let router = router()
        .config(Config::new().export_ts_bindings("./demos/bindings.ts"))
        .build()?
        .arced();
    let todos = Todos::new();
    let service = HttpService::new(router, move |_| todos.clone(), HttpServerConfig::default());

    let app = axum::Router::new().nest("/rspc", service.into_router());
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("serving on http://{bind_address}/rspc");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
