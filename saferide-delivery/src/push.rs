use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing;

use saferide_core::config::DeliveryConfig;
use saferide_core::transport::PushTransport;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    sound: &'a str,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    to: &'a str,
    priority: &'a str,
    notification: FcmNotification<'a>,
    data: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    failure: i64,
}

pub struct FcmPush {
    client: Option<Client>,
    server_key: Option<String>,
}

impl FcmPush {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let (client, server_key) = if let Some(key) = &config.fcm_server_key {
            tracing::info!("Initializing FCM client");

            let client = Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

            tracing::info!("FCM client initialized successfully");
            (Some(client), Some(key.clone()))
        } else {
            tracing::warn!("FCM delivery disabled (missing configuration)");
            (None, None)
        };

        Ok(Self { client, server_key })
    }
}

#[async_trait]
impl PushTransport for FcmPush {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<()> {
        let (client, server_key) = match (&self.client, &self.server_key) {
            (Some(c), Some(k)) => (c, k),
            // Unconfigured sends must fail so delivery records stay honest.
            _ => return Err(anyhow!("FCM transport is not configured")),
        };

        let message = FcmMessage {
            to: token,
            priority: "high",
            notification: FcmNotification {
                title,
                body,
                sound: "default",
            },
            data,
        };

        let response = client
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={}", server_key))
            .json(&message)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send HTTP request to FCM: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "FCM returned error status {}: {}",
                status,
                error_text
            ));
        }

        let outcome: FcmResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse FCM response: {}", e))?;
        if outcome.failure > 0 {
            return Err(anyhow!("FCM rejected the message for this device token"));
        }

        tracing::debug!("FCM notification sent");
        Ok(())
    }
}
