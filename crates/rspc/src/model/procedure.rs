use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcedureKind {
    Query,
    Mutation,
    Subscription,
}

impl ProcedureKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProcedureKind::Query => "query",
            ProcedureKind::Mutation => "mutation",
            ProcedureKind::Subscription => "subscription",
        }
    }
}

impl Display for ProcedureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One procedure in an exported bindings document. `input` and `result` are
/// JSON Schemas whose `$ref`s point into [`ProceduresDef::definitions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDef {
    pub key: String,
    pub kind: ProcedureKind,
    pub input: Value,
    pub result: Value,
}

/// The language neutral type bindings of a router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProceduresDef {
    pub queries: Vec<ProcedureDef>,
    pub mutations: Vec<ProcedureDef>,
    pub subscriptions: Vec<ProcedureDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, Value>,
}

impl ProceduresDef {
    pub fn of_kind(&self, kind: ProcedureKind) -> &[ProcedureDef] {
        match kind {
            ProcedureKind::Query => &self.queries,
            ProcedureKind::Mutation => &self.mutations,
            ProcedureKind::Subscription => &self.subscriptions,
        }
    }

    pub fn get(&self, kind: ProcedureKind, key: &str) -> Option<&ProcedureDef> {
        self.of_kind(kind).iter().find(|def| def.key == key)
    }
}
