use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use rspc::{Error, ErrorCode, Router, RouterBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};

/// One entry of the todo list.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Todo {
    pub id: u32,
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NewTodo {
    pub title: String,
}

/// Sent to `todos.changes` subscribers after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TodoChange {
    Added { todo: Todo },
    Completed { id: u32 },
}

#[derive(Clone)]
pub struct Todos {
    items: Arc<Mutex<Vec<Todo>>>,
    changes: broadcast::Sender<TodoChange>,
}

impl Default for Todos {
    fn default() -> Self {
        Self::new()
    }
}

impl Todos {
    pub fn new() -> Self {
        Self {
            items: Default::default(),
            changes: broadcast::channel(16).0,
        }
    }

    async fn list(&self) -> Vec<Todo> {
        self.items.lock().await.clone()
    }

    async fn add(&self, new: NewTodo) -> Result<Todo, Error> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::new(ErrorCode::BadRequest, "title must not be empty"));
        }
        let mut items = self.items.lock().await;
        let todo = Todo {
            id: items.len() as u32 + 1,
            title: title.to_owned(),
            done: false,
        };
        items.push(todo.clone());
        let _ = self.changes.send(TodoChange::Added { todo: todo.clone() });
        Ok(todo)
    }

    async fn complete(&self, id: u32) -> Result<Todo, Error> {
        let mut items = self.items.lock().await;
        let todo = items
            .iter_mut()
            .find(|todo| todo.id == id)
            .ok_or_else(|| Error::new(ErrorCode::NotFound, format!("todo {id} not found")))?;
        todo.done = true;
        let _ = self.changes.send(TodoChange::Completed { id });
        Ok(todo.clone())
    }
}

fn todos() -> RouterBuilder<Todos> {
    Router::<Todos>::new()
        .query("list", |todos: Todos, _: ()| async move { todos.list().await })
        .mutation("add", |todos: Todos, new: NewTodo| async move {
            todos.add(new).await
        })
        .mutation("complete", |todos: Todos, id: u32| async move {
            todos.complete(id).await
        })
        .subscription("changes", |todos: Todos, _: ()| {
            // lagging subscribers skip what they missed
            BroadcastStream::new(todos.changes.subscribe())
                .filter_map(|change| futures::future::ready(change.ok()))
        })
}

pub fn router() -> RouterBuilder<Todos> {
    Router::<Todos>::new()
        .middleware(|cx| async move {
            tracing::info!(key = %cx.key, kind = %cx.kind, "procedure called");
            Ok(cx)
        })
        .query("version", |_, _: ()| env!("CARGO_PKG_VERSION"))
        .subscription("clock", |_, seconds: u64| {
            IntervalStream::new(tokio::time::interval(Duration::from_secs(seconds.max(1))))
                .enumerate()
                .map(|(tick, _)| tick as u64)
        })
        .merge("todos.", todos())
}
