use std::{borrow::Cow, path::PathBuf};

/// Router wide settings, applied when the router is built.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// When set, [`RouterBuilder::build`](crate::RouterBuilder::build) writes
    /// the TypeScript bindings to this path.
    pub export_bindings_on_build: Option<PathBuf>,
    /// Extra line placed below the generated-file notice in the bindings.
    pub bindings_header: Option<Cow<'static, str>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export_ts_bindings(mut self, export_path: impl Into<PathBuf>) -> Self {
        self.export_bindings_on_build = Some(export_path.into());
        self
    }

    pub fn set_ts_bindings_header(mut self, header: impl Into<Cow<'static, str>>) -> Self {
        self.bindings_header = Some(header.into());
        self
    }
}
