//! Storage layer for conversation records
//!
//! Conversations are written to a DynamoDB table whose native TTL attribute
//! (`ttl`, epoch seconds) evicts them after thirty days.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::RelaySettings;

/// How long a conversation record lives before TTL eviction (30 days)
pub const CONVERSATION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Partition key read by the connection check. UUID v4 ids never collide with it.
pub const CONNECTION_CHECK_KEY: &str = "__connection_check__";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error writing an item to DynamoDB
    #[error("DynamoDB put error: {0}")]
    DynamoPut(String),
    /// Error reading from the conversation table during a connection check
    #[error("DynamoDB connection check error: {0}")]
    DynamoProbe(String),
}

/// One exchange to record, borrowed from the request being handled
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    /// Agent session the exchange belongs to
    pub session_id: &'a str,
    /// Text the user sent
    pub user_message: &'a str,
    /// Text the agent answered
    pub agent_response: &'a str,
    /// ISO-8601 time the message was received
    pub timestamp: &'a str,
    /// Sender's username
    pub user_name: Option<&'a str>,
    /// Chat the exchange happened in
    pub chat_id: Option<i64>,
}

/// A stored conversation exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Unique record ID (partition key)
    pub conversation_id: String,
    /// Agent session ID (the user's ID as a string)
    pub session_id: String,
    /// ISO-8601 time the message was received
    pub timestamp: String,
    /// Text the user sent
    pub user_message: String,
    /// Text the agent answered
    pub agent_response: String,
    /// Absolute expiry in epoch seconds
    pub ttl: i64,
    /// Sender's username, omitted when unknown
    pub user_name: Option<String>,
    /// Chat ID as a string, omitted when unknown
    pub chat_id: Option<String>,
}

impl ConversationRecord {
    /// Build a record for `exchange` created at `now`, with a fresh ID.
    #[must_use]
    pub fn from_exchange(exchange: &Exchange<'_>, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            session_id: exchange.session_id.to_string(),
            timestamp: exchange.timestamp.to_string(),
            user_message: exchange.user_message.to_string(),
            agent_response: exchange.agent_response.to_string(),
            ttl: expiry_at(now),
            user_name: exchange
                .user_name
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            chat_id: exchange.chat_id.map(|id| id.to_string()),
        }
    }

    /// DynamoDB item for this record; optional fields are left out when absent.
    #[must_use]
    pub fn to_item(&self) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::from([
            (
                "conversation_id".to_string(),
                AttributeValue::S(self.conversation_id.clone()),
            ),
            (
                "session_id".to_string(),
                AttributeValue::S(self.session_id.clone()),
            ),
            (
                "timestamp".to_string(),
                AttributeValue::S(self.timestamp.clone()),
            ),
            (
                "user_message".to_string(),
                AttributeValue::S(self.user_message.clone()),
            ),
            (
                "agent_response".to_string(),
                AttributeValue::S(self.agent_response.clone()),
            ),
            ("ttl".to_string(), AttributeValue::N(self.ttl.to_string())),
        ]);

        if let Some(user_name) = &self.user_name {
            item.insert("user_name".to_string(), AttributeValue::S(user_name.clone()));
        }
        if let Some(chat_id) = &self.chat_id {
            item.insert("chat_id".to_string(), AttributeValue::S(chat_id.clone()));
        }

        item
    }
}

/// Expiry, in epoch seconds, for a record created at `now`
#[must_use]
pub fn expiry_at(now: DateTime<Utc>) -> i64 {
    now.timestamp() + CONVERSATION_TTL_SECS
}

/// Interface for conversation stores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a conversation record
    async fn put_conversation(&self, record: &ConversationRecord) -> Result<(), StorageError>;
    /// Check connection to the store
    async fn check_connection(&self) -> Result<(), StorageError>;
}

/// DynamoDB-backed conversation store
pub struct DynamoConversationStore {
    client: Client,
    table: String,
}

impl DynamoConversationStore {
    /// Create a store writing to `table`
    #[must_use]
    pub fn new(client: Client, table: String) -> Self {
        Self { client, table }
    }

    /// Create a store from relay settings and a loaded SDK config
    #[must_use]
    pub fn from_settings(settings: &RelaySettings, sdk_config: &SdkConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);
        if let Some(endpoint_url) = &settings.dynamodb_endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        Self::new(
            Client::from_conf(builder.build()),
            settings.dynamodb_table_name.clone(),
        )
    }
}

#[async_trait]
impl ConversationStore for DynamoConversationStore {
    async fn put_conversation(&self, record: &ConversationRecord) -> Result<(), StorageError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record.to_item()))
            .send()
            .await
            .map_err(|e| StorageError::DynamoPut(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    async fn check_connection(&self) -> Result<(), StorageError> {
        // GetItem on a key that is never written: needs only read access
        self.client
            .get_item()
            .table_name(&self.table)
            .key(
                "conversation_id",
                AttributeValue::S(CONNECTION_CHECK_KEY.to_string()),
            )
            .projection_expression("conversation_id")
            .send()
            .await
            .map_err(|e| StorageError::DynamoProbe(DisplayErrorContext(&e).to_string()))?;

        info!(table = %self.table, "Successfully connected to DynamoDB.");
        Ok(())
    }
}

/// Best-effort conversation recorder
#[derive(Clone)]
pub struct ConversationRecorder {
    store: Arc<dyn ConversationStore>,
}

impl ConversationRecorder {
    /// Create a recorder over the given store
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Record `exchange`. Storage failures are logged and swallowed.
    pub async fn record(&self, exchange: &Exchange<'_>) {
        let record = ConversationRecord::from_exchange(exchange, Utc::now());

        match self.store.put_conversation(&record).await {
            Ok(()) => info!(
                conversation_id = %record.conversation_id,
                session_id = %record.session_id,
                "Conversation stored"
            ),
            Err(e) => error!(
                conversation_id = %record.conversation_id,
                error = %e,
                "Error storing conversation"
            ),
        }
    }

    /// Check connection to the underlying store
    ///
    /// # Errors
    ///
    /// Returns the store's error if it cannot be reached.
    pub async fn check_connection(&self) -> Result<(), StorageError> {
        self.store.check_connection().await
    }
}
