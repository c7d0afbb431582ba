// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::Value;

use crate::{
    error::ApiError,
    models::WebhookAck,
    reconciler::{verify_signature, ReconcileOutcome, SIGNATURE_HEADER},
    state::AppState,
};

/// Receive a transfer lifecycle event from the custody provider.
///
/// Every delivery is acknowledged so the provider stops retrying; events
/// that cannot be applied are logged and dropped. When a webhook secret is
/// configured, unsigned or mis-signed deliveries are rejected.
#[utoipa::path(
    post,
    path = "/v1/webhooks/custody",
    tag = "Webhooks",
    request_body = Value,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 401, description = "Invalid webhook signature")
    )
)]
pub async fn custody_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            tracing::warn!("Rejected custody webhook with invalid signature");
            return Err(ApiError::unauthorized("invalid webhook signature"));
        }
    }

    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Custody webhook body is not JSON");
            return Ok(Json(WebhookAck::ok()));
        }
    };

    match state.reconciler.on_event(&event) {
        Ok(ReconcileOutcome::Invalid(reason)) => {
            tracing::warn!(%reason, "Custody webhook could not be applied");
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Failed to reconcile custody webhook"),
    }

    Ok(Json(WebhookAck::ok()))
}
