use rspc::{Config, Router, model::{ProcedureKind, ProceduresDef}};
use serde::{Deserialize, Serialize};
use serde_json::json;

mod common;
use common::{api::router, init};

#[test]
fn test_procedures_document() -> anyhow::Result<()> {
    init();
    let procedures = router().build()?.procedures();

    let keys = |kind| {
        procedures
            .of_kind(kind)
            .iter()
            .map(|def| def.key.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(ProcedureKind::Query), ["users.get", "version", "whoami"]);
    assert_eq!(keys(ProcedureKind::Mutation), ["admin.reset", "users.create"]);
    assert_eq!(keys(ProcedureKind::Subscription), ["guarded", "pings", "ticks"]);

    let get_user = procedures
        .get(ProcedureKind::Query, "users.get")
        .expect("users.get is exported");
    assert_eq!(get_user.input["type"], json!("integer"));
    assert_eq!(get_user.result, json!({ "$ref": "#/$defs/User" }));

    let user = &procedures.definitions["User"];
    assert_eq!(user["description"], json!("A registered user."));
    assert!(procedures.definitions.contains_key("NewUser"));
    Ok(())
}

#[test]
fn test_export_ts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("web/src/bindings.ts");
    let router = router()
        .config(Config::new().set_ts_bindings_header("/* eslint-disable */"))
        .build()?;
    router.export_ts(&path)?;

    let bindings = std::fs::read_to_string(&path)?;
    assert!(bindings.starts_with(
        "// This file was generated by rspc. Do not edit this file manually.\n/* eslint-disable */\n"
    ));
    assert!(bindings.contains("{ key: \"users.get\", input: number, result: User }"));
    assert!(bindings.contains("{ key: \"version\", input: never, result: string }"));
    assert!(bindings.contains("{ key: \"whoami\", input: never, result: string | null }"));
    assert!(bindings.contains("{ key: \"users.create\", input: NewUser, result: User }"));
    assert!(bindings.contains("{ key: \"pings\", input: number, result: string }"));
    assert!(bindings.contains("/** A registered user. */\nexport type User = { id: number; name: string };"));
    assert!(bindings.contains("export type NewUser = { name: string };"));
    Ok(())
}

#[test]
fn test_export_on_build() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bindings.ts");
    Router::<()>::new()
        .config(Config::new().export_ts_bindings(&path))
        .query("version", |_, _: ()| "1")
        .build()?;

    let bindings = std::fs::read_to_string(&path)?;
    assert!(bindings.contains("queries: { key: \"version\", input: never, result: string },"));
    assert!(bindings.contains("mutations: never,"));
    assert!(bindings.contains("subscriptions: never,"));
    Ok(())
}

#[test]
fn test_export_json() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bindings.json");
    let router = router().build()?;
    router.export_json(&path)?;

    let parsed: ProceduresDef = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(parsed, router.procedures());
    Ok(())
}

#[derive(Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type")]
enum Shape {
    Circle { r: f64 },
    Square { side: f64 },
}

#[derive(Serialize, Deserialize, schemars::JsonSchema)]
struct Item {
    id: u32,
    #[serde(flatten)]
    shape: Shape,
}

#[test]
fn test_export_ts_keeps_fields_of_flattened_enums() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bindings.ts");
    Router::<()>::new()
        .query("item", |_, id: u32| Item {
            id,
            shape: Shape::Circle { r: 1.0 },
        })
        .build()?
        .export_ts(&path)?;

    let bindings = std::fs::read_to_string(&path)?;
    let item = bindings
        .lines()
        .find(|line| line.starts_with("export type Item = "))
        .expect("Item is exported");
    assert!(item.starts_with("export type Item = { id: number } & ("), "{item}");
    assert!(item.contains("type: \"Circle\""), "{item}");
    assert!(item.contains("type: \"Square\""), "{item}");
    Ok(())
}
