use anyhow::Result;
use std::sync::Arc;

use saferide_api::run as run_api;
use saferide_core::{AppContext, Config};
use saferide_delivery::{FcmPush, TwilioSms};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting SafeRide Alert Relay");

    // Load configuration and assemble the application context
    let config = Config::from_env();
    let push = Arc::new(FcmPush::new(&config.delivery)?);
    let sms = Arc::new(TwilioSms::new(&config.delivery)?);
    let ctx = AppContext::new(config, push, sms);

    tracing::info!("Application context initialized");

    run_api(ctx).await?;

    Ok(())
}
