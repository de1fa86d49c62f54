use anyhow::anyhow;
use chrono::Utc;
use std::time::Duration;
use tracing;
use uuid::Uuid;

use saferide_core::error::{AlertError, AlertResult};
use saferide_core::types::{Alert, AlertMetadata, AlertStatus, LiveEvent};
use saferide_core::AppContext;

use crate::{dispatch, relay};

#[derive(Debug, Clone)]
pub struct CreateAlertRequest {
    pub magnitude: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub metadata: AlertMetadata,
}

/// Owns the alert state machine: creation, countdown, the
/// cancel-or-send race, acknowledgment, resolution and live location.
///
/// The countdown is not cancelled when the alert is; both the timer and
/// `cancel_alert` funnel through one conditional status write, so whichever
/// loses the race observes a no-op.
#[derive(Clone)]
pub struct AlertService {
    ctx: AppContext,
}

impl AlertService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Persists a new pending alert, tells the rider's own live connection
    /// the countdown is running, and arms the deferred send. Returns
    /// immediately; the send path runs after the grace period.
    pub async fn create_alert(
        &self,
        owner_id: Uuid,
        request: CreateAlertRequest,
    ) -> AlertResult<Alert> {
        let (latitude, longitude) = match (request.latitude, request.longitude) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(AlertError::Validation("location is required".to_string()));
            }
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(AlertError::Validation(
                "location is out of range".to_string(),
            ));
        }

        let owner = self
            .ctx
            .accounts
            .find(owner_id)
            .await?
            .ok_or(AlertError::NotFound("account"))?;

        let alert = Alert::new(
            &owner,
            request.magnitude,
            latitude,
            longitude,
            request.address.unwrap_or_default(),
            request.metadata,
        );
        self.ctx.alerts.insert(&alert).await?;

        let countdown = owner.settings.alert_countdown;
        self.ctx
            .presence
            .emit(
                owner.id,
                &LiveEvent::CountdownStarted {
                    alert_id: alert.id,
                    countdown,
                },
            )
            .await;

        tracing::info!(
            "Alert {} created for {} ({}), countdown {}s",
            alert.id,
            owner.phone_number,
            alert.severity.as_str(),
            countdown
        );

        let service = self.clone();
        let alert_id = alert.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(countdown)).await;
            if let Err(e) = service.expire_countdown(alert_id).await {
                tracing::error!("Countdown processing failed for alert {}: {:#}", alert_id, e);
            }
        });

        Ok(alert)
    }

    /// Runs when the grace period elapses. The conditional transition is
    /// the race guard: if the alert already left `pending`, this is a
    /// no-op. On the send path all delivery records are persisted before
    /// the rider hears "alert sent".
    async fn expire_countdown(&self, alert_id: Uuid) -> anyhow::Result<()> {
        let sent = self
            .ctx
            .alerts
            .transition_if_pending(alert_id, AlertStatus::Sent, Utc::now())
            .await?;
        let Some(mut alert) = sent else {
            tracing::debug!(
                "Alert {} already left pending, skipping countdown send",
                alert_id
            );
            return Ok(());
        };

        let owner = self
            .ctx
            .accounts
            .find(alert.owner_id)
            .await?
            .ok_or_else(|| anyhow!("owner account {} missing for alert {}", alert.owner_id, alert_id))?;

        let records = dispatch::notify_contacts(&self.ctx, &alert, &owner).await;
        let attempted = records.len();
        alert.notifications_sent = records;
        self.ctx.alerts.update(&alert).await?;

        self.ctx
            .presence
            .emit(
                owner.id,
                &LiveEvent::AlertSent {
                    alert_id,
                    notifications_sent: attempted,
                },
            )
            .await;

        tracing::info!(
            "Emergency alert {} sent, {} notification(s) attempted",
            alert_id,
            attempted
        );
        Ok(())
    }

    /// Owner-initiated cancellation during the grace period. Contacts get
    /// a best-effort all-clear in the background; the caller never waits
    /// on it.
    pub async fn cancel_alert(&self, alert_id: Uuid, requester_id: Uuid) -> AlertResult<Alert> {
        self.ctx
            .alerts
            .find(alert_id)
            .await?
            .filter(|alert| alert.owner_id == requester_id)
            .ok_or(AlertError::NotFound("alert"))?;

        let cancelled = self
            .ctx
            .alerts
            .transition_if_pending(alert_id, AlertStatus::Cancelled, Utc::now())
            .await?;
        let Some(alert) = cancelled else {
            // Lost the race against the countdown (or the alert was already
            // terminal); report the state it is actually in.
            let status = self
                .ctx
                .alerts
                .find(alert_id)
                .await?
                .map(|a| a.status)
                .ok_or(AlertError::NotFound("alert"))?;
            return Err(AlertError::InvalidState(status));
        };

        tracing::info!("Alert {} cancelled by its owner", alert_id);

        let ctx = self.ctx.clone();
        let cancelled_alert = alert.clone();
        tokio::spawn(async move {
            match ctx.accounts.find(cancelled_alert.owner_id).await {
                Ok(Some(owner)) => {
                    dispatch::notify_cancelled(&ctx, &cancelled_alert, &owner).await;
                }
                Ok(None) => tracing::warn!(
                    "Owner {} missing, skipping cancellation notices",
                    cancelled_alert.owner_id
                ),
                Err(e) => {
                    tracing::error!("Owner lookup failed for cancellation notices: {:#}", e)
                }
            }
        });

        Ok(alert)
    }

    /// A contact confirms they are responding. Strict policy: only `sent`
    /// alerts can be acknowledged (an already-acknowledged alert is
    /// returned unchanged), and the acknowledger must be one of the
    /// owner's registered emergency contacts.
    pub async fn acknowledge_alert(
        &self,
        alert_id: Uuid,
        acknowledger_phone: &str,
    ) -> AlertResult<Alert> {
        let mut alert = self
            .ctx
            .alerts
            .find(alert_id)
            .await?
            .ok_or(AlertError::NotFound("alert"))?;

        match alert.status {
            AlertStatus::Acknowledged => return Ok(alert),
            AlertStatus::Sent => {}
            other => return Err(AlertError::InvalidState(other)),
        }

        let owner = self
            .ctx
            .accounts
            .find(alert.owner_id)
            .await?
            .ok_or(AlertError::NotFound("account"))?;
        if !owner.has_contact(acknowledger_phone) {
            return Err(AlertError::Validation(
                "acknowledger is not a registered emergency contact of the alert owner"
                    .to_string(),
            ));
        }

        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_at = Some(Utc::now());
        self.ctx.alerts.update(&alert).await?;

        self.ctx
            .presence
            .emit(
                owner.id,
                &LiveEvent::AlertAcknowledged {
                    alert_id,
                    acknowledged_by: acknowledger_phone.to_string(),
                },
            )
            .await;

        tracing::info!("Alert {} acknowledged by {}", alert_id, acknowledger_phone);
        Ok(alert)
    }

    /// External closure by the owner once the incident is over. Valid from
    /// `sent` or `acknowledged`; idempotent on `resolved`.
    pub async fn resolve_alert(&self, alert_id: Uuid, requester_id: Uuid) -> AlertResult<Alert> {
        let mut alert = self
            .ctx
            .alerts
            .find(alert_id)
            .await?
            .filter(|alert| alert.owner_id == requester_id)
            .ok_or(AlertError::NotFound("alert"))?;

        match alert.status {
            AlertStatus::Resolved => return Ok(alert),
            AlertStatus::Sent | AlertStatus::Acknowledged => {}
            other => return Err(AlertError::InvalidState(other)),
        }

        alert.status = AlertStatus::Resolved;
        self.ctx.alerts.update(&alert).await?;
        tracing::info!("Alert {} resolved", alert_id);
        Ok(alert)
    }

    /// Overwrites the alert's location while it is active and fans the
    /// sample out to connected contacts. Silently a no-op once the alert
    /// is cancelled or resolved; callers racing a cancellation are not
    /// told off for it.
    pub async fn update_alert_location(
        &self,
        alert_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> AlertResult<Alert> {
        let mut alert = self
            .ctx
            .alerts
            .find(alert_id)
            .await?
            .ok_or(AlertError::NotFound("alert"))?;

        if alert.status.is_closed() {
            return Ok(alert);
        }

        alert.location.latitude = latitude;
        alert.location.longitude = longitude;
        alert.location.timestamp = Utc::now();
        self.ctx.alerts.update(&alert).await?;

        match self.ctx.accounts.find(alert.owner_id).await? {
            Some(owner) => {
                relay::broadcast_location(&self.ctx, &owner, Some(alert.id), latitude, longitude)
                    .await;
            }
            None => tracing::warn!(
                "Owner {} missing for alert {}, skipping location relay",
                alert.owner_id,
                alert_id
            ),
        }

        Ok(alert)
    }
}
