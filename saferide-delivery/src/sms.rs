use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing;

use saferide_core::config::DeliveryConfig;
use saferide_core::transport::SmsTransport;

struct TwilioCredentials {
    account_sid: String,
    auth_token: String,
    from_number: String,
}

pub struct TwilioSms {
    client: Option<Client>,
    credentials: Option<TwilioCredentials>,
}

impl TwilioSms {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let (client, credentials) = if let (Some(sid), Some(token), Some(from)) = (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from_number,
        ) {
            tracing::info!("Initializing Twilio SMS client");

            let client = Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

            tracing::info!("Twilio SMS client initialized successfully");
            (
                Some(client),
                Some(TwilioCredentials {
                    account_sid: sid.clone(),
                    auth_token: token.clone(),
                    from_number: from.clone(),
                }),
            )
        } else {
            tracing::warn!("SMS delivery disabled (missing Twilio configuration)");
            (None, None)
        };

        Ok(Self { client, credentials })
    }
}

#[async_trait]
impl SmsTransport for TwilioSms {
    async fn send(&self, phone_number: &str, text: &str) -> Result<()> {
        let (client, credentials) = match (&self.client, &self.credentials) {
            (Some(c), Some(k)) => (c, k),
            // Unconfigured sends must fail so delivery records stay honest.
            _ => return Err(anyhow!("SMS transport is not configured")),
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            credentials.account_sid
        );
        let params = [
            ("To", phone_number),
            ("From", credentials.from_number.as_str()),
            ("Body", text),
        ];

        let response = client
            .post(&url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send HTTP request to Twilio: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Twilio returned error status {}: {}",
                status,
                error_text
            ));
        }

        tracing::debug!("SMS sent to {}", phone_number);
        Ok(())
    }
}
