//! Payment webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deposit::{Deposit, DepositOutcome};
use crate::error::ApiError;
use crate::state::AppState;

/// Stripe webhook payload (simplified).
#[derive(Debug, Deserialize)]
pub struct StripeWebhook {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event ID.
    pub id: String,
    /// Event data.
    pub data: StripeEventData,
}

/// Stripe event data container.
#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    /// Event object.
    pub object: Value,
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// New and replayed deliveries are both acknowledged; a replay credits nothing.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhook: StripeWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.id,
        "Received Stripe webhook"
    );

    match webhook.event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&state, &webhook.id, &webhook.data.object)?;
        }
        _ => {
            tracing::debug!(event_type = %webhook.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

fn handle_checkout_completed(
    state: &AppState,
    event_id: &str,
    session: &Value,
) -> Result<(), ApiError> {
    let payment_status = session.get("payment_status").and_then(Value::as_str);
    if let Some(status) = payment_status.filter(|s| *s != "paid") {
        tracing::info!(event_id = %event_id, payment_status = %status, "Checkout not paid yet, skipping");
        return Ok(());
    }

    let deposit = Deposit::from_checkout_session(event_id, session).map_err(|e| {
        tracing::warn!(event_id = %event_id, error = %e, "Unusable checkout session");
        ApiError::BadRequest(e.to_string())
    })?;

    if let DepositOutcome::Duplicate = state.deposits.apply(deposit)? {
        tracing::debug!(event_id = %event_id, "Replayed checkout acknowledged");
    }

    Ok(())
}
