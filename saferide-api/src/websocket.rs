use anyhow::anyhow;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use saferide_core::AppContext;
use saferide_engine::{relay, AlertService};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing;
use uuid::Uuid;

use crate::auth;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Messages a rider's device sends over the live connection.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    LocationUpdate {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        alert_id: Option<Uuid>,
    },
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(ctx): Extension<AppContext>,
    Extension(service): Extension<AlertService>,
) -> Response {
    let claims = match auth::verify_token(&query.token, &ctx.config.server.jwt_secret) {
        Ok(claims) => claims,
        Err(status) => return status.into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, ctx, service))
}

async fn handle_socket(socket: WebSocket, account_id: Uuid, ctx: AppContext, service: AlertService) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let connection_id = match ctx.presence.attach(account_id, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to register live connection: {:#}", e);
            return;
        }
    };
    tracing::info!("WebSocket connection established for account {}", account_id);

    // Forward live events to the socket until the channel or socket closes.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("Failed to serialize live event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let ctx_recv = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Err(e) =
                        handle_client_message(&ctx_recv, &service, account_id, &text).await
                    {
                        tracing::warn!("Ignoring bad client message: {:#}", e);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = ctx.presence.detach(account_id, connection_id).await {
        tracing::error!("Failed to detach live connection: {:#}", e);
    }
    tracing::info!("WebSocket connection closed for account {}", account_id);
}

async fn handle_client_message(
    ctx: &AppContext,
    service: &AlertService,
    account_id: Uuid,
    text: &str,
) -> anyhow::Result<()> {
    let message: ClientMessage = serde_json::from_str(text)?;
    match message {
        ClientMessage::LocationUpdate {
            latitude,
            longitude,
            alert_id,
        } => {
            if let Some(alert_id) = alert_id {
                if let Err(e) = service
                    .update_alert_location(alert_id, latitude, longitude)
                    .await
                {
                    tracing::warn!("Location update rejected for alert {}: {}", alert_id, e);
                }
            } else {
                let owner = ctx
                    .accounts
                    .find(account_id)
                    .await?
                    .ok_or_else(|| anyhow!("account {} missing", account_id))?;
                // Ambient ride-tracking samples respect the sharing setting;
                // samples tied to an active alert always go out.
                if owner.settings.share_location {
                    relay::broadcast_location(ctx, &owner, None, latitude, longitude).await;
                }
            }
        }
    }
    Ok(())
}
