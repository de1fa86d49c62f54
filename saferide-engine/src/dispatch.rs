use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use tracing;

use saferide_core::types::{
    Account, Alert, DeliveryMethod, DeliveryRecord, DeliveryStatus, EmergencyContact, LiveEvent,
};
use saferide_core::AppContext;

/// Fans one alert out to every emergency contact. The owner's own number
/// never produces a delivery record; everything else does, success or not.
/// Contacts are dispatched concurrently and the batch always completes.
pub async fn notify_contacts(
    ctx: &AppContext,
    alert: &Alert,
    owner: &Account,
) -> Vec<DeliveryRecord> {
    let attempts = owner
        .emergency_contacts
        .iter()
        .filter(|contact| contact.phone_number != owner.phone_number)
        .map(|contact| dispatch_contact(ctx, contact, alert, owner));
    join_all(attempts).await
}

/// Delivers one alert to one contact over both channels. Push and SMS are
/// parallel redundant paths: each failure is caught independently and a
/// problem on one never suppresses the other.
pub async fn dispatch_contact(
    ctx: &AppContext,
    contact: &EmergencyContact,
    alert: &Alert,
    owner: &Account,
) -> DeliveryRecord {
    let mut record = DeliveryRecord {
        contact_phone_number: contact.phone_number.clone(),
        method: None,
        status: DeliveryStatus::Failed,
        sent_at: Utc::now(),
        error: None,
    };

    if contact.phone_number == owner.phone_number {
        record.status = DeliveryStatus::Skipped;
        record.error = Some("contact is the alert owner".to_string());
        return record;
    }

    let resolved = match ctx.directory.resolve(&contact.phone_number).await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!(
                "Contact lookup failed for {}: {:#}",
                contact.phone_number,
                e
            );
            None
        }
    };

    // A different number can still resolve to the owner's own account.
    if let Some(account) = &resolved {
        if account.id == owner.id {
            record.status = DeliveryStatus::Skipped;
            record.error = Some("contact resolves to the alert owner".to_string());
            return record;
        }
    }

    let push_token = resolved.as_ref().and_then(|a| a.push_token.clone());

    let mut push_ok = false;
    let mut sms_ok = false;
    let mut push_error = None;
    let mut sms_error = None;

    if let Some(token) = &push_token {
        let (title, body) = alert_push_content(owner);
        match ctx
            .push
            .send(token, &title, &body, &alert_push_data(alert, owner))
            .await
        {
            Ok(()) => {
                push_ok = true;
                tracing::debug!("Push notification sent to {}", contact.phone_number);
            }
            Err(e) => {
                tracing::warn!("Push failed for {}: {:#}", contact.phone_number, e);
                push_error = Some(e.to_string());
            }
        }
    }

    match ctx
        .sms
        .send(&contact.phone_number, &alert_sms_text(alert, owner))
        .await
    {
        Ok(()) => {
            sms_ok = true;
            tracing::debug!("SMS sent to {}", contact.phone_number);
        }
        Err(e) => {
            tracing::warn!("SMS failed for {}: {:#}", contact.phone_number, e);
            sms_error = Some(e.to_string());
        }
    }

    // Supplementary to push/SMS, never a substitute.
    if let Some(account) = &resolved {
        ctx.presence
            .emit(
                account.id,
                &LiveEvent::EmergencyAlert {
                    alert_id: alert.id,
                    severity: alert.severity,
                    magnitude: alert.magnitude,
                    latitude: alert.location.latitude,
                    longitude: alert.location.longitude,
                    owner_phone_number: owner.phone_number.clone(),
                    owner_name: owner.name.clone(),
                },
            )
            .await;
    }

    match (push_ok, sms_ok) {
        (true, true) => {
            record.method = Some(DeliveryMethod::PushSms);
            record.status = DeliveryStatus::Sent;
        }
        (true, false) => {
            record.method = Some(DeliveryMethod::Push);
            record.status = DeliveryStatus::Sent;
        }
        (false, true) => {
            record.method = Some(DeliveryMethod::Sms);
            record.status = DeliveryStatus::Sent;
        }
        (false, false) => {
            record.method = Some(if push_token.is_some() {
                DeliveryMethod::Push
            } else {
                DeliveryMethod::Sms
            });
            record.status = DeliveryStatus::Failed;
            record.error = Some(match (push_error, sms_error) {
                (Some(push), Some(sms)) => format!("push: {}; sms: {}", push, sms),
                (Some(push), None) => push,
                (None, Some(sms)) => sms,
                (None, None) => "no delivery channel available".to_string(),
            });
        }
    }

    record
}

/// Tells every contact the alert was called off, over whatever channel is
/// available. Best-effort: failures are logged, never propagated.
pub async fn notify_cancelled(ctx: &AppContext, alert: &Alert, owner: &Account) {
    for contact in &owner.emergency_contacts {
        if contact.phone_number == owner.phone_number {
            continue;
        }
        let resolved = match ctx.directory.resolve(&contact.phone_number).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(
                    "Contact lookup failed for {}: {:#}",
                    contact.phone_number,
                    e
                );
                continue;
            }
        };
        let Some(account) = resolved else { continue };
        if account.id == owner.id {
            continue;
        }

        if let Some(token) = &account.push_token {
            let (title, body) = cancelled_push_content(owner);
            let data = HashMap::from([
                ("type".to_string(), "alert_cancelled".to_string()),
                ("alert_id".to_string(), alert.id.to_string()),
            ]);
            if let Err(e) = ctx.push.send(token, &title, &body, &data).await {
                tracing::warn!(
                    "Failed to send cancellation push to {}: {:#}",
                    contact.phone_number,
                    e
                );
            }
        }

        ctx.presence
            .emit(
                account.id,
                &LiveEvent::AlertCancelled {
                    alert_id: alert.id,
                    owner_name: owner.name.clone(),
                },
            )
            .await;
    }
}

fn display_name(owner: &Account) -> &str {
    if owner.name.is_empty() {
        "Someone"
    } else {
        &owner.name
    }
}

fn alert_push_content(owner: &Account) -> (String, String) {
    (
        "EMERGENCY ALERT".to_string(),
        format!(
            "{} may have been in an accident. Immediate assistance needed!",
            display_name(owner)
        ),
    )
}

fn cancelled_push_content(owner: &Account) -> (String, String) {
    (
        "Alert Cancelled".to_string(),
        format!(
            "{} has cancelled the emergency alert. They are safe.",
            display_name(owner)
        ),
    )
}

fn alert_push_data(alert: &Alert, owner: &Account) -> HashMap<String, String> {
    HashMap::from([
        ("type".to_string(), "emergency_alert".to_string()),
        ("alert_id".to_string(), alert.id.to_string()),
        ("severity".to_string(), alert.severity.as_str().to_string()),
        ("magnitude".to_string(), alert.magnitude.to_string()),
        ("latitude".to_string(), alert.location.latitude.to_string()),
        ("longitude".to_string(), alert.location.longitude.to_string()),
        ("owner_phone_number".to_string(), owner.phone_number.clone()),
        ("owner_name".to_string(), owner.name.clone()),
    ])
}

fn alert_sms_text(alert: &Alert, owner: &Account) -> String {
    let maps_link = format!(
        "https://maps.google.com/?q={},{}",
        alert.location.latitude, alert.location.longitude
    );
    format!(
        "EMERGENCY ALERT!\n\n{} may have been in an accident!\n\nSeverity: {}\nLocation: {}\n\nPlease check on them immediately!\n\n- SafeRide Alert",
        display_name(owner),
        alert.severity.as_str(),
        maps_link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_context, MockPush, MockSms};
    use saferide_core::types::AlertMetadata;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn contact(phone: &str) -> EmergencyContact {
        EmergencyContact {
            phone_number: phone.to_string(),
            name: "Dev".to_string(),
            relationship: "friend".to_string(),
            is_primary: false,
            added_at: Utc::now(),
        }
    }

    fn owner_and_alert() -> (Account, Alert) {
        let owner = Account::new("+14155550101", "Asha");
        let alert = Alert::new(
            &owner,
            72.0,
            12.9716,
            77.5946,
            String::new(),
            AlertMetadata::default(),
        );
        (owner, alert)
    }

    async fn registered_contact(
        ctx: &saferide_core::AppContext,
        phone: &str,
        token: Option<&str>,
    ) -> Account {
        let mut account = Account::new(phone, "Dev");
        account.push_token = token.map(|t| t.to_string());
        ctx.accounts.insert(&account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_both_channels_succeed() {
        let push = Arc::new(MockPush::default());
        let sms = Arc::new(MockSms::default());
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();
        registered_contact(&ctx, "+14155550102", Some("dev-token")).await;

        let record = dispatch_contact(&ctx, &contact("+14155550102"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.method, Some(DeliveryMethod::PushSms));
        assert!(record.error.is_none());
        assert_eq!(push.sent.lock().unwrap().as_slice(), ["dev-token"]);
        assert_eq!(sms.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sms_failure_degrades_to_push() {
        let push = Arc::new(MockPush::default());
        let sms = Arc::new(MockSms::default());
        sms.fail.store(true, Ordering::SeqCst);
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();
        registered_contact(&ctx, "+14155550102", Some("dev-token")).await;

        let record = dispatch_contact(&ctx, &contact("+14155550102"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.method, Some(DeliveryMethod::Push));
    }

    #[tokio::test]
    async fn test_push_failure_still_sends_sms() {
        let push = Arc::new(MockPush::default());
        push.fail.store(true, Ordering::SeqCst);
        let sms = Arc::new(MockSms::default());
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();
        registered_contact(&ctx, "+14155550102", Some("dev-token")).await;

        let record = dispatch_contact(&ctx, &contact("+14155550102"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.method, Some(DeliveryMethod::Sms));
        assert_eq!(sms.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_both_channels_fail() {
        let push = Arc::new(MockPush::default());
        push.fail.store(true, Ordering::SeqCst);
        let sms = Arc::new(MockSms::default());
        sms.fail.store(true, Ordering::SeqCst);
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();
        registered_contact(&ctx, "+14155550102", Some("dev-token")).await;

        let record = dispatch_contact(&ctx, &contact("+14155550102"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.method, Some(DeliveryMethod::Push));
        let error = record.error.unwrap();
        assert!(error.contains("push:"));
        assert!(error.contains("sms:"));
    }

    #[tokio::test]
    async fn test_unregistered_contact_goes_sms_only() {
        let push = Arc::new(MockPush::default());
        let sms = Arc::new(MockSms::default());
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();

        let record = dispatch_contact(&ctx, &contact("+14155550199"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert_eq!(record.method, Some(DeliveryMethod::Sms));
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_own_phone_number_is_skipped() {
        let push = Arc::new(MockPush::default());
        let sms = Arc::new(MockSms::default());
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();

        let record = dispatch_contact(&ctx, &contact("+14155550101"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Skipped);
        assert!(record.method.is_none());
        assert!(sms.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contact_resolving_to_owner_account_is_skipped() {
        let push = Arc::new(MockPush::default());
        let sms = Arc::new(MockSms::default());
        let ctx = test_context(push.clone(), sms.clone());
        let (owner, alert) = owner_and_alert();
        ctx.accounts.insert(&owner).await.unwrap();

        // A second number that resolves to the owner's own account.
        let mut alias = owner.clone();
        alias.phone_number = "+14155550177".to_string();
        ctx.accounts.insert(&alias).await.unwrap();

        let record = dispatch_contact(&ctx, &contact("+14155550177"), &alert, &owner).await;
        assert_eq!(record.status, DeliveryStatus::Skipped);
        assert!(sms.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_never_records_owner_number() {
        let push = Arc::new(MockPush::default());
        let sms = Arc::new(MockSms::default());
        let ctx = test_context(push.clone(), sms.clone());
        let (mut owner, alert) = owner_and_alert();
        owner.emergency_contacts.push(contact("+14155550101"));
        owner.emergency_contacts.push(contact("+14155550102"));

        let records = notify_contacts(&ctx, &alert, &owner).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].contact_phone_number, "+14155550102");
    }
}
