use anyhow::Result;
use rspc::transport::io::serve_io;
use tracing_subscriber::EnvFilter;

mod common;
use common::todos::{Todos, router};

/// Serves the todo router over stdin/stdout, one JSON-RPC message per line.
///
/// Try it with:
/// `echo '{"jsonrpc":"2.0","id":1,"method":"query","params":{"path":"version"}}' | cargo run --example server_stdio`
#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("starting rspc stdio server");
    let router = router().build()?.arced();
    serve_io(router, Todos::new(), tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}
