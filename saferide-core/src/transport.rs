use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Push-notification channel. Any error is treated uniformly as a failed
/// delivery attempt by the dispatcher.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<()>;
}

/// SMS channel.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, phone_number: &str, text: &str) -> Result<()>;
}
