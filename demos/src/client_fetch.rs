use anyhow::Result;
use futures::StreamExt;
use rspc::{Client, transport::fetch::FetchTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod common;
use common::todos::{NewTodo, Todo, TodoChange};

rspc::procedures! {
    query ListTodos("todos.list"): () => Vec<Todo>;
    mutation AddTodo("todos.add"): NewTodo => Todo;
    mutation CompleteTodo("todos.complete"): u32 => Todo;
    subscription TodoChanges("todos.changes"): () => TodoChange;
}

const DEFAULT_URL: &str = "http://127.0.0.1:4000/rspc";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("info,{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = std::env::var("RSPC_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let client = Client::new(FetchTransport::new(url));

    let version: String = client.query("version", ()).await?;
    tracing::info!("connected to server version {version}");

    let mut changes = client.subscribe::<TodoChanges>(()).await?;

    let todo = client
        .execute::<AddTodo>(NewTodo {
            title: "write the bindings".into(),
        })
        .await?;
    client.execute::<CompleteTodo>(todo.id).await?;

    for _ in 0..2 {
        match changes.next().await {
            Some(change) => tracing::info!("change: {:?}", change?),
            None => break,
        }
    }

    let todos = client.execute::<ListTodos>(()).await?;
    tracing::info!("{} todos: {todos:#?}", todos.len());

    match client.execute::<CompleteTodo>(999).await {
        Ok(todo) => tracing::warn!("unexpected success: {todo:?}"),
        Err(err) => tracing::info!(code = ?err.code(), "expected failure: {err}"),
    }
    Ok(())
}
