use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Incident seriousness, derived from the reported impact magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
    Critical,
}

impl Severity {
    pub fn from_magnitude(magnitude: f64) -> Self {
        if magnitude >= 80.0 {
            Severity::Critical
        } else if magnitude >= 60.0 {
            Severity::Severe
        } else if magnitude >= 40.0 {
            Severity::Moderate
        } else {
            Severity::Minor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Cancelled,
    Sent,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Cancelled => "cancelled",
            AlertStatus::Sent => "sent",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Location updates are rejected once the alert is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, AlertStatus::Cancelled | AlertStatus::Resolved)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel(s) a delivery attempt went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMethod {
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "sms")]
    Sms,
    #[serde(rename = "push+sms")]
    PushSms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

/// Outcome of notifying one emergency contact for one alert. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub contact_phone_number: String,
    pub method: Option<DeliveryMethod>,
    pub status: DeliveryStatus,
    pub sent_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub phone_number: String,
    pub name: String,
    pub relationship: String,
    pub is_primary: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSettings {
    pub auto_send_alert: bool,
    pub alert_countdown: u64,
    pub share_location: bool,
    pub sms_fallback: bool,
}

impl Default for AccountSettings {
    fn default() -> Self {
        AccountSettings {
            auto_send_alert: true,
            alert_countdown: 15,
            share_location: true,
            sms_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub phone_number: String,
    pub name: String,
    pub push_token: Option<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub settings: AccountSettings,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(phone_number: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            phone_number: phone_number.into(),
            name: name.into(),
            push_token: None,
            emergency_contacts: Vec::new(),
            settings: AccountSettings::default(),
            is_online: false,
            last_seen: now,
            created_at: now,
        }
    }

    /// Adds a contact; at most one contact stays primary.
    pub fn add_emergency_contact(&mut self, mut contact: EmergencyContact) {
        if contact.is_primary {
            for existing in &mut self.emergency_contacts {
                existing.is_primary = false;
            }
        }
        contact.added_at = Utc::now();
        self.emergency_contacts.push(contact);
    }

    pub fn has_contact(&self, phone_number: &str) -> bool {
        self.emergency_contacts
            .iter()
            .any(|c| c.phone_number == phone_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}

/// Free-form device/sensor context captured with the crash report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub device_info: Option<String>,
    pub bluetooth_device: Option<String>,
    pub raw_sensor_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Denormalized so history survives later account changes.
    pub owner_phone_number: String,
    pub severity: Severity,
    pub magnitude: f64,
    pub location: GeoLocation,
    pub status: AlertStatus,
    pub countdown_started_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub notifications_sent: Vec<DeliveryRecord>,
    pub metadata: AlertMetadata,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        owner: &Account,
        magnitude: f64,
        latitude: f64,
        longitude: f64,
        address: String,
        metadata: AlertMetadata,
    ) -> Self {
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            owner_phone_number: owner.phone_number.clone(),
            severity: Severity::from_magnitude(magnitude),
            magnitude,
            location: GeoLocation {
                latitude,
                longitude,
                address,
                timestamp: now,
            },
            status: AlertStatus::Pending,
            countdown_started_at: now,
            cancelled_at: None,
            sent_at: None,
            acknowledged_at: None,
            notifications_sent: Vec::new(),
            metadata,
            created_at: now,
        }
    }
}

/// Events pushed to a live connection. Serialized as
/// `{"event": "...", "data": {...}}` text frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    CountdownStarted {
        alert_id: Uuid,
        countdown: u64,
    },
    AlertSent {
        alert_id: Uuid,
        notifications_sent: usize,
    },
    EmergencyAlert {
        alert_id: Uuid,
        severity: Severity,
        magnitude: f64,
        latitude: f64,
        longitude: f64,
        owner_phone_number: String,
        owner_name: String,
    },
    AlertCancelled {
        alert_id: Uuid,
        owner_name: String,
    },
    AlertAcknowledged {
        alert_id: Uuid,
        acknowledged_by: String,
    },
    LocationUpdate {
        alert_id: Option<Uuid>,
        owner_phone_number: String,
        owner_name: String,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    },
}

/// E.164: optional leading `+`, a non-zero first digit, at most 15 digits.
pub fn is_valid_phone_number(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.len() < 2 || digits.len() > 15 {
        return false;
    }
    let mut chars = digits.chars();
    matches!(chars.next(), Some('1'..='9')) && chars.all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_magnitude(0.0), Severity::Minor);
        assert_eq!(Severity::from_magnitude(39.9), Severity::Minor);
        assert_eq!(Severity::from_magnitude(40.0), Severity::Moderate);
        assert_eq!(Severity::from_magnitude(59.9), Severity::Moderate);
        assert_eq!(Severity::from_magnitude(60.0), Severity::Severe);
        assert_eq!(Severity::from_magnitude(79.9), Severity::Severe);
        assert_eq!(Severity::from_magnitude(80.0), Severity::Critical);
        assert_eq!(Severity::from_magnitude(200.0), Severity::Critical);
    }

    #[test]
    fn test_phone_number_validation() {
        assert!(is_valid_phone_number("+14155550101"));
        assert!(is_valid_phone_number("919876543210"));
        assert!(!is_valid_phone_number("+0123456"));
        assert!(!is_valid_phone_number("+1415555a101"));
        assert!(!is_valid_phone_number("7"));
        assert!(!is_valid_phone_number("+1234567890123456"));
        assert!(!is_valid_phone_number(""));
    }

    #[test]
    fn test_single_primary_contact() {
        let mut account = Account::new("+14155550101", "Asha");
        let contact = |phone: &str, primary: bool| EmergencyContact {
            phone_number: phone.to_string(),
            name: String::new(),
            relationship: String::new(),
            is_primary: primary,
            added_at: Utc::now(),
        };
        account.add_emergency_contact(contact("+14155550102", true));
        account.add_emergency_contact(contact("+14155550103", true));

        let primaries: Vec<_> = account
            .emergency_contacts
            .iter()
            .filter(|c| c.is_primary)
            .collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].phone_number, "+14155550103");
    }
}
