use std::time::Duration;

use futures::stream;
use rspc::{Error, ErrorCode, Router, RouterBuilder, router::MiddlewareContext};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct Ctx {
    pub user: Option<String>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct User {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NewUser {
    pub name: String,
}

async fn require_admin(cx: MiddlewareContext<Ctx>) -> Result<MiddlewareContext<Ctx>, Error> {
    match cx.ctx.user.as_deref() {
        Some("admin") => Ok(cx),
        _ => Err(Error::new(ErrorCode::Unauthorized, "admin only")),
    }
}

fn users() -> RouterBuilder<Ctx> {
    Router::<Ctx>::new()
        .query("get", |_, id: u32| async move {
            if id == 0 {
                Err(Error::new(ErrorCode::NotFound, "no such user"))
            } else {
                Ok(User {
                    id,
                    name: format!("user {id}"),
                })
            }
        })
        .mutation("create", |_, new: NewUser| async move {
            Ok::<_, Error>(User {
                id: 42,
                name: new.name,
            })
        })
}

fn admin() -> RouterBuilder<Ctx> {
    Router::<Ctx>::new()
        .middleware(require_admin)
        .mutation("reset", |_, _: ()| true)
}

pub fn router() -> RouterBuilder<Ctx> {
    Router::<Ctx>::new()
        .query("version", |_, _: ()| "1.0.0")
        .query("whoami", |ctx: Ctx, _: ()| ctx.user)
        .merge("users.", users())
        .merge("admin.", admin())
        .subscription("pings", |_, count: u32| {
            stream::iter((0..count).map(|i| format!("ping {i}")))
        })
        .subscription("ticks", |_, _: ()| {
            stream::unfold(0u32, |n| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Some((n, n + 1))
            })
        })
        .subscription("guarded", |_, allow: bool| async move {
            if allow {
                Ok(stream::iter([1u8, 2]))
            } else {
                Err(Error::new(ErrorCode::Forbidden, "not allowed"))
            }
        })
}
