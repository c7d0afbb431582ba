// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    models::{CreateWalletsRequest, WalletAddresses},
    state::AppState,
};

/// Provision a wallet on every configured network.
///
/// Idempotent: networks that already have a wallet return the stored address.
#[utoipa::path(
    post,
    path = "/v1/wallets",
    tag = "Wallets",
    request_body = CreateWalletsRequest,
    responses(
        (status = 200, description = "Wallet addresses by network", body = WalletAddresses),
        (status = 403, description = "User is not active"),
        (status = 404, description = "User not found"),
        (status = 502, description = "Custody provider error")
    )
)]
pub async fn create_wallets(
    State(state): State<AppState>,
    Json(request): Json<CreateWalletsRequest>,
) -> Result<Json<WalletAddresses>, ApiError> {
    let addresses = state.onboarding.create_wallets(&request.user_id).await?;
    Ok(Json(WalletAddresses {
        user_id: request.user_id,
        addresses,
    }))
}
