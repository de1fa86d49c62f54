use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use saferide_core::config::{AlertConfig, Config, DeliveryConfig, ServerConfig};
use saferide_core::transport::{PushTransport, SmsTransport};
use saferide_core::AppContext;

#[derive(Default)]
pub struct MockPush {
    pub fail: AtomicBool,
    /// Device tokens the mock "delivered" to.
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl PushTransport for MockPush {
    async fn send(
        &self,
        token: &str,
        _title: &str,
        _body: &str,
        _data: &HashMap<String, String>,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("push transport down"));
        }
        self.sent.lock().unwrap().push(token.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSms {
    pub fail: AtomicBool,
    /// (recipient, text) pairs the mock "delivered".
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SmsTransport for MockSms {
    async fn send(&self, phone_number: &str, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("sms transport down"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone_number.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            api_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_expire_days: 7,
        },
        delivery: DeliveryConfig {
            fcm_server_key: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
        },
        alerts: AlertConfig {
            default_countdown_secs: 15,
            max_emergency_contacts: 5,
        },
    }
}

pub fn test_context(push: Arc<MockPush>, sms: Arc<MockSms>) -> AppContext {
    AppContext::new(test_config(), push, sms)
}
