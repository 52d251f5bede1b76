//! HTTP transport for the agent relay.
//!
//! Exposes the relay handler over axum and provides the redacting log writer
//! used by the binary.
#![deny(missing_docs)]

pub mod logging;
pub mod routes;
