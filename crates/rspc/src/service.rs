//! Long lived execution of JSON-RPC requests for one client.
//!
//! Transports that keep a connection open (such as [`crate::transport::io`])
//! feed every decoded [`Request`](crate::model::Request) into a
//! [`Connection`] and write whatever arrives on its response channel.

mod connection;
pub use connection::Connection;
