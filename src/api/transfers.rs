// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Two-phase asset transfer endpoints.
//!
//! `init` issues one challenge for the fund leg and one for the fee leg.
//! The client signs both and submits them to `finalize`, which broadcasts
//! each leg independently through the custody provider.

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::{transfer_status, ApiError},
    models::{FinalizeTransferRequest, FinalizeTransferResponse, InitTransferResponse},
    state::AppState,
    transfer::TransferRequest,
};

/// Request signing challenges for a transfer and its fee.
#[utoipa::path(
    post,
    path = "/v1/transfers/init",
    tag = "Transfers",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Challenges issued", body = InitTransferResponse),
        (status = 400, description = "Unsupported asset or malformed amount"),
        (status = 403, description = "Sender is not active"),
        (status = 404, description = "Sender, receiver or wallet not found"),
        (status = 502, description = "Custody provider error")
    )
)]
pub async fn init_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<InitTransferResponse>, ApiError> {
    let challenge = state.coordinator.initiate(request).await?;
    Ok(Json(InitTransferResponse { challenge }))
}

/// Broadcast the signed transfer legs.
///
/// Returns 200 only when every submitted challenge was broadcast. Otherwise
/// the status reflects the first failed challenge and the body lists every
/// failure alongside the legs that did succeed; failed legs may be retried
/// unless their challenge expired.
#[utoipa::path(
    post,
    path = "/v1/transfers/finalize",
    tag = "Transfers",
    request_body = FinalizeTransferRequest,
    responses(
        (status = 200, description = "All legs broadcast", body = FinalizeTransferResponse),
        (status = 400, description = "No credentials supplied"),
        (status = 404, description = "Unknown or already consumed challenge", body = FinalizeTransferResponse),
        (status = 410, description = "Challenge expired", body = FinalizeTransferResponse),
        (status = 502, description = "Custody provider error", body = FinalizeTransferResponse)
    )
)]
pub async fn finalize_transfer(
    State(state): State<AppState>,
    Json(request): Json<FinalizeTransferRequest>,
) -> Result<(StatusCode, Json<FinalizeTransferResponse>), ApiError> {
    let report = state.coordinator.finalize(request.credentials).await?;

    let status = report
        .failures
        .values()
        .next()
        .map(transfer_status)
        .unwrap_or(StatusCode::OK);

    Ok((status, Json(FinalizeTransferResponse::from(report))))
}
