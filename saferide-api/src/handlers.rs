use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use saferide_core::types::{
    is_valid_phone_number, Account, AlertMetadata, EmergencyContact,
};
use saferide_core::{AlertError, AppContext};
use saferide_engine::{AlertService, CreateAlertRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing;
use uuid::Uuid;

use crate::auth::{self, AuthenticatedUser};

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

fn reject(error: AlertError) -> ApiError {
    let status = match &error {
        AlertError::Validation(_) => StatusCode::BAD_REQUEST,
        AlertError::NotFound(_) => StatusCode::NOT_FOUND,
        AlertError::InvalidState(_) => StatusCode::CONFLICT,
        AlertError::Delivery(_) => StatusCode::BAD_GATEWAY,
        AlertError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() })))
}

fn internal(error: anyhow::Error) -> ApiError {
    tracing::error!("Storage error: {:#}", error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

fn account_json(account: &Account) -> Value {
    json!({
        "id": account.id,
        "phone_number": account.phone_number,
        "name": account.name,
        "emergency_contacts": account.emergency_contacts,
        "settings": account.settings,
        "is_online": account.is_online,
        "last_seen": account.last_seen,
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "saferide-api"
    }))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
}

/// Find-or-create by phone number; first authentication creates the account.
pub async fn register(
    Extension(ctx): Extension<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult {
    if !is_valid_phone_number(&req.phone_number) {
        return Err(bad_request("phone number must be E.164"));
    }

    let existing = ctx
        .accounts
        .find_by_phone(&req.phone_number)
        .await
        .map_err(internal)?;

    let account = match existing {
        Some(mut account) => {
            if let Some(name) = req.name {
                account.name = name;
            }
            if let Some(token) = req.push_token {
                account.push_token = Some(token);
            }
            account.last_seen = Utc::now();
            ctx.accounts.update(&account).await.map_err(internal)?;
            account
        }
        None => {
            let mut account = Account::new(req.phone_number, req.name.unwrap_or_default());
            account.push_token = req.push_token;
            account.settings.alert_countdown = ctx.config.alerts.default_countdown_secs;
            ctx.accounts.insert(&account).await.map_err(internal)?;
            tracing::info!("Registered new account {}", account.phone_number);
            account
        }
    };

    let token = auth::generate_token(
        account.id,
        &account.phone_number,
        &ctx.config.server.jwt_secret,
        ctx.config.server.jwt_expire_days,
    )
    .map_err(|status| (status, Json(json!({ "error": "token generation failed" }))))?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "account": account_json(&account),
    })))
}

async fn load_account(ctx: &AppContext, user: &AuthenticatedUser) -> Result<Account, ApiError> {
    ctx.accounts
        .find(user.account_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("account not found"))
}

pub async fn get_profile(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult {
    let account = load_account(&ctx, &user).await?;
    Ok(Json(json!({ "success": true, "account": account_json(&account) })))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
}

pub async fn update_profile(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult {
    let mut account = load_account(&ctx, &user).await?;
    if let Some(name) = req.name {
        account.name = name;
    }
    if let Some(token) = req.push_token {
        account.push_token = Some(token);
    }
    ctx.accounts.update(&account).await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "account": account_json(&account) })))
}

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub auto_send_alert: Option<bool>,
    #[serde(default)]
    pub alert_countdown: Option<u64>,
    #[serde(default)]
    pub share_location: Option<bool>,
    #[serde(default)]
    pub sms_fallback: Option<bool>,
}

pub async fn update_settings(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult {
    let mut account = load_account(&ctx, &user).await?;
    if let Some(auto_send_alert) = req.auto_send_alert {
        account.settings.auto_send_alert = auto_send_alert;
    }
    if let Some(alert_countdown) = req.alert_countdown {
        account.settings.alert_countdown = alert_countdown;
    }
    if let Some(share_location) = req.share_location {
        account.settings.share_location = share_location;
    }
    if let Some(sms_fallback) = req.sms_fallback {
        account.settings.sms_fallback = sms_fallback;
    }
    ctx.accounts.update(&account).await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "settings": account.settings })))
}

#[derive(Deserialize)]
pub struct AddContactRequest {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

pub async fn add_contact(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<AddContactRequest>,
) -> ApiResult {
    if !is_valid_phone_number(&req.phone_number) {
        return Err(bad_request("phone number must be E.164"));
    }

    let mut account = load_account(&ctx, &user).await?;
    if account.has_contact(&req.phone_number) {
        return Err(bad_request("contact already exists"));
    }
    if account.emergency_contacts.len() >= ctx.config.alerts.max_emergency_contacts {
        return Err(bad_request("emergency contact limit reached"));
    }

    account.add_emergency_contact(EmergencyContact {
        phone_number: req.phone_number,
        name: req.name.unwrap_or_default(),
        relationship: req.relationship.unwrap_or_default(),
        is_primary: req.is_primary,
        added_at: Utc::now(),
    });
    ctx.accounts.update(&account).await.map_err(internal)?;

    Ok(Json(json!({
        "success": true,
        "emergency_contacts": account.emergency_contacts,
    })))
}

pub async fn remove_contact(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(phone_number): Path<String>,
) -> ApiResult {
    let mut account = load_account(&ctx, &user).await?;
    let before = account.emergency_contacts.len();
    account
        .emergency_contacts
        .retain(|c| c.phone_number != phone_number);
    if account.emergency_contacts.len() == before {
        return Err(not_found("contact not found"));
    }
    ctx.accounts.update(&account).await.map_err(internal)?;

    Ok(Json(json!({
        "success": true,
        "emergency_contacts": account.emergency_contacts,
    })))
}

#[derive(Deserialize)]
pub struct CreateAlertBody {
    #[serde(default)]
    pub magnitude: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub bluetooth_device: Option<String>,
    #[serde(default)]
    pub raw_sensor_data: Option<Value>,
}

pub async fn create_alert(
    Extension(ctx): Extension<AppContext>,
    Extension(service): Extension<AlertService>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateAlertBody>,
) -> ApiResult {
    let account = load_account(&ctx, &user).await?;

    let alert = service
        .create_alert(
            user.account_id,
            CreateAlertRequest {
                magnitude: body.magnitude,
                latitude: body.latitude,
                longitude: body.longitude,
                address: body.address,
                metadata: AlertMetadata {
                    device_info: body.device_info,
                    bluetooth_device: body.bluetooth_device,
                    raw_sensor_data: body.raw_sensor_data,
                },
            },
        )
        .await
        .map_err(reject)?;

    Ok(Json(json!({
        "success": true,
        "alert": {
            "id": alert.id,
            "severity": alert.severity,
            "status": alert.status,
            "countdown": account.settings.alert_countdown,
        },
    })))
}

pub async fn cancel_alert(
    Extension(service): Extension<AlertService>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult {
    let alert = service
        .cancel_alert(alert_id, user.account_id)
        .await
        .map_err(reject)?;
    Ok(Json(json!({
        "success": true,
        "alert": { "id": alert.id, "status": alert.status },
    })))
}

pub async fn acknowledge_alert(
    Extension(service): Extension<AlertService>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult {
    let alert = service
        .acknowledge_alert(alert_id, &user.phone_number)
        .await
        .map_err(reject)?;
    Ok(Json(json!({ "success": true, "alert": alert })))
}

pub async fn resolve_alert(
    Extension(service): Extension<AlertService>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult {
    let alert = service
        .resolve_alert(alert_id, user.account_id)
        .await
        .map_err(reject)?;
    Ok(Json(json!({
        "success": true,
        "alert": { "id": alert.id, "status": alert.status },
    })))
}

#[derive(Deserialize)]
pub struct UpdateLocationBody {
    pub latitude: f64,
    pub longitude: f64,
}

pub async fn update_alert_location(
    Extension(service): Extension<AlertService>,
    Path(alert_id): Path<Uuid>,
    Json(body): Json<UpdateLocationBody>,
) -> ApiResult {
    let alert = service
        .update_alert_location(alert_id, body.latitude, body.longitude)
        .await
        .map_err(reject)?;
    Ok(Json(json!({ "success": true, "location": alert.location })))
}

pub async fn get_alert(
    Extension(ctx): Extension<AppContext>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult {
    let alert = ctx
        .alerts
        .find(alert_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("alert not found"))?;
    Ok(Json(json!({ "success": true, "alert": alert })))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn alert_history(
    Extension(ctx): Extension<AppContext>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let page = params.page.unwrap_or(1).max(1);

    let alerts = ctx
        .alerts
        .list_by_owner(user.account_id)
        .await
        .map_err(internal)?;
    let total = alerts.len();
    let page_alerts: Vec<_> = alerts
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(Json(json!({
        "success": true,
        "alerts": page_alerts,
        "total": total,
        "total_pages": total.div_ceil(limit),
        "current_page": page,
    })))
}
