//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables and
//! builds the shared AWS SDK configuration.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;
use aws_types::region::Region;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Default Telegram Bot API base URL
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Default timeout for outbound HTTP calls to the messaging platform
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default listen address for the webhook server
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Relay settings, read once at process start
#[derive(Deserialize, Clone)]
pub struct RelaySettings {
    /// Telegram Bot API token
    pub bot_token: String,
    /// Bedrock agent identifier
    pub agent_id: String,
    /// Bedrock agent alias identifier
    pub agent_alias_id: String,
    /// AWS region for the agent and the conversation table
    pub region: String,
    /// DynamoDB table that receives conversation records
    pub dynamodb_table_name: String,

    /// Telegram Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    /// Timeout for the `sendMessage` call, in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Address the webhook server listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// DynamoDB endpoint override (local DynamoDB, testing)
    pub dynamodb_endpoint_url: Option<String>,
    /// Static AWS access key ID; the default provider chain is used when absent
    pub aws_access_key_id: Option<String>,
    /// Static AWS secret access key
    pub aws_secret_access_key: Option<String>,
    /// Optional AWS session token for temporary credentials
    pub aws_session_token: Option<String>,
}

fn default_telegram_api_url() -> String {
    DEFAULT_TELEGRAM_API_URL.to_string()
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

/// Build the layered configuration: config files first, environment last.
///
/// # Errors
///
/// Returns a `ConfigError` if a present config file cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // BOT_TOKEN -> bot_token; empty variables count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl RelaySettings {
    /// Load settings from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is missing.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(build_config()?)
    }

    /// Deserialize and validate settings from an already built `Config`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a required value is missing or blank.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("BOT_TOKEN", &self.bot_token),
            ("AGENT_ID", &self.agent_id),
            ("AGENT_ALIAS_ID", &self.agent_alias_id),
            ("REGION", &self.region),
            ("DYNAMODB_TABLE_NAME", &self.dynamodb_table_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{name} is missing")));
            }
        }

        if self.aws_access_key_id.is_some() != self.aws_secret_access_key.is_some() {
            return Err(ConfigError::Message(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".into(),
            ));
        }

        Ok(())
    }

    /// Static credentials, when both key halves are configured
    #[must_use]
    pub fn static_credentials(&self) -> Option<Credentials> {
        let access_key = self.aws_access_key_id.as_ref()?;
        let secret_key = self.aws_secret_access_key.as_ref()?;
        Some(Credentials::new(
            access_key,
            secret_key,
            self.aws_session_token.clone(),
            None,
            "agent-relay-settings",
        ))
    }
}

/// Load the AWS SDK configuration shared by the Bedrock and DynamoDB clients.
pub async fn load_aws_config(settings: &RelaySettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()));

    if let Some(credentials) = settings.static_credentials() {
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}
