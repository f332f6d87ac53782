//! lanbeam daemon internals: application state, HTTP routes, the sender
//! engine, TLS provisioning and webhook notifications. The binary in
//! `main.rs` wires these together; integration tests drive the same
//! router over a loopback listener.

pub mod routes;
pub mod sender;
pub mod state;
pub mod tls;
pub mod webhook;
