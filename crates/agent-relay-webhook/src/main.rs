use std::process;
use std::sync::Arc;

use agent_relay_core::config::RelaySettings;
use agent_relay_core::handler::RelayContext;
use agent_relay_webhook::logging::{init_logging, Redactor};
use agent_relay_webhook::routes::router;
use anyhow::Context;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Masking must be in place before the first log line.
    let redactor = Arc::new(Redactor::new().map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);
    init_logging(redactor);

    info!("Starting agent relay...");

    let settings = init_settings();
    let ctx = Arc::new(RelayContext::from_settings(&settings).await);

    match ctx.check_storage().await {
        Ok(()) => info!(table = %settings.dynamodb_table_name, "Conversation store reachable"),
        Err(e) => error!(error = %e, "Conversation store check failed, continuing"),
    }

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "Relay is listening");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Relay stopped");
    Ok(())
}

fn init_settings() -> RelaySettings {
    match RelaySettings::new() {
        Ok(settings) => {
            info!(
                region = %settings.region,
                agent_id = %settings.agent_id,
                "Configuration loaded"
            );
            settings
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
