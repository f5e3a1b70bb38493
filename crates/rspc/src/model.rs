mod jsonrpc;
mod procedure;

pub use jsonrpc::*;
pub use procedure::*;

pub type JsonObject<F = serde_json::Value> = serde_json::Map<String, F>;
