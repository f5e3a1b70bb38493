#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]
#![doc = include_str!("../README.md")]

mod error;
pub use error::{BuildError, Error, ErrorCode, ErrorData, ExecError, ExportError};

/// Wire types shared by every transport
pub mod model;

#[cfg(feature = "server")]
mod config;
#[cfg(feature = "server")]
pub use config::Config;
#[cfg(feature = "server")]
pub mod export;
#[cfg(feature = "server")]
pub mod router;
#[cfg(feature = "server")]
pub use router::{Router, RouterBuilder};
#[cfg(feature = "server")]
pub mod service;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub use client::{Client, ClientError};

pub mod transport;

// re-export
#[cfg(feature = "server")]
pub use schemars;
pub use serde;
pub use serde_json;
