//! Type bindings: a description of every procedure's input and result that
//! clients use for compile-time typing only.
//!
//! [`Router::procedures`] produces the language neutral document, a set of
//! JSON Schemas (draft 2020-12) sharing one `$defs` table.
//! [`Router::export_ts`] renders it as TypeScript through [`typescript`].

pub mod typescript;

use std::path::Path;

use schemars::generate::SchemaSettings;

use crate::{
    ExportError, Router,
    model::{ProcedureDef, ProceduresDef},
    router::ProcedureRoute,
};

impl<TCtx> Router<TCtx> {
    /// Describes every registered procedure, sorted by key within each kind.
    pub fn procedures(&self) -> ProceduresDef {
        let mut generator = SchemaSettings::draft2020_12().into_generator();
        let mut describe = |key: &str, route: &ProcedureRoute<TCtx>| ProcedureDef {
            key: key.to_owned(),
            kind: route.kind,
            input: (route.input_schema)(&mut generator).to_value(),
            result: (route.result_schema)(&mut generator).to_value(),
        };
        let queries = self.queries.iter().map(|(k, r)| describe(k, r)).collect();
        let mutations = self.mutations.iter().map(|(k, r)| describe(k, r)).collect();
        let subscriptions = self
            .subscriptions
            .iter()
            .map(|(k, r)| describe(k, r))
            .collect();
        let definitions = generator
            .definitions()
            .iter()
            .map(|(name, schema)| (name.clone(), schema.clone()))
            .collect();
        ProceduresDef {
            queries,
            mutations,
            subscriptions,
            definitions,
        }
    }

    /// Writes the TypeScript bindings to `path`, creating parent directories.
    pub fn export_ts(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let contents = typescript::render(&self.procedures(), self.config.bindings_header.as_deref());
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Writes the JSON bindings document to `path`.
    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(&self.procedures())?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
