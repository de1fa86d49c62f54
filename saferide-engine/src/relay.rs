use chrono::Utc;
use tracing;
use uuid::Uuid;

use saferide_core::types::{Account, LiveEvent};
use saferide_core::AppContext;

/// Forwards a rider's location sample to every currently-connected
/// emergency contact. Pure fan-out: no persistence, no retry; a contact
/// without a live connection simply misses the sample.
pub async fn broadcast_location(
    ctx: &AppContext,
    owner: &Account,
    alert_id: Option<Uuid>,
    latitude: f64,
    longitude: f64,
) {
    let event = LiveEvent::LocationUpdate {
        alert_id,
        owner_phone_number: owner.phone_number.clone(),
        owner_name: owner.name.clone(),
        latitude,
        longitude,
        timestamp: Utc::now(),
    };

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
        if !ctx.presence.emit(account.id, &event).await {
            tracing::debug!(
                "Contact {} has no live connection, dropping location update",
                contact.phone_number
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_context, MockPush, MockSms};
    use saferide_core::types::EmergencyContact;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_broadcast_reaches_connected_contacts_only() {
        let ctx = test_context(Arc::new(MockPush::default()), Arc::new(MockSms::default()));

        let mut owner = Account::new("+14155550101", "Asha");
        for phone in ["+14155550102", "+14155550103", "+14155550101"] {
            owner.emergency_contacts.push(EmergencyContact {
                phone_number: phone.to_string(),
                name: String::new(),
                relationship: String::new(),
                is_primary: false,
                added_at: Utc::now(),
            });
        }
        ctx.accounts.insert(&owner).await.unwrap();

        let connected = Account::new("+14155550102", "Dev");
        let offline = Account::new("+14155550103", "Mira");
        ctx.accounts.insert(&connected).await.unwrap();
        ctx.accounts.insert(&offline).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.presence.attach(connected.id, tx).await.unwrap();

        broadcast_location(&ctx, &owner, None, 12.98, 77.60).await;

        let event = rx.try_recv().expect("connected contact gets the sample");
        match event {
            LiveEvent::LocationUpdate {
                latitude,
                longitude,
                owner_phone_number,
                ..
            } => {
                assert_eq!(latitude, 12.98);
                assert_eq!(longitude, 77.60);
                assert_eq!(owner_phone_number, "+14155550101");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
