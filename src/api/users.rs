// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User onboarding endpoints.
//!
//! Registration is a two-step ceremony: `register` returns the provider's
//! registration challenge, and `activate` completes it with the credentials
//! the user's authenticators produced.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    models::ActivateUserRequest,
    onboarding::{ActivatedUser, RegisterRequest, RegistrationChallenge},
    state::AppState,
};

/// Register a user with the custody provider.
///
/// An inactive user that registers again gets a fresh challenge.
#[utoipa::path(
    post,
    path = "/v1/users/register",
    tag = "Users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration challenge issued", body = RegistrationChallenge),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "User is already active"),
        (status = 502, description = "Custody provider error")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegistrationChallenge>), ApiError> {
    let challenge = state.onboarding.register(request).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

/// Complete registration and activate the user.
#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/activate",
    tag = "Users",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = ActivateUserRequest,
    responses(
        (status = 200, description = "User activated", body = ActivatedUser),
        (status = 400, description = "Missing credential"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User is already active"),
        (status = 502, description = "Custody provider error")
    )
)]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ActivateUserRequest>,
) -> Result<Json<ActivatedUser>, ApiError> {
    let activated = state
        .onboarding
        .activate(&user_id, &request.credential_info)
        .await?;
    Ok(Json(activated))
}
