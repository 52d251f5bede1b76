#![deny(missing_docs)]
//! Agent relay core library.
//!
//! Webhook parsing, the agent client, reply delivery, conversation storage
//! and the request orchestrator that ties them together.

/// Agent client and runtimes.
pub mod agent;
/// Configuration management.
pub mod config;
/// Request orchestration.
pub mod handler;
/// Reply delivery to the messaging platform.
pub mod reply;
/// Conversation storage (DynamoDB).
pub mod storage;
/// Inbound webhook parsing.
pub mod webhook;

#[cfg(test)]
pub mod testing;
