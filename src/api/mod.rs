// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        ActivateUserRequest, CreateWalletsRequest, FinalizeTransferRequest,
        FinalizeTransferResponse, InitTransferResponse, WalletAddresses, WebhookAck,
    },
    onboarding::{ActivatedUser, RegisterRequest, RegistrationChallenge},
    providers::{AuthFactor, CredentialAssertion, CredentialInfo, SignedCredential},
    state::AppState,
    transfer::{InitiatedTransfer, SettledLeg, TransferReceipt, TransferRequest},
};

pub mod health;
pub mod transfers;
pub mod users;
pub mod wallets;
pub mod webhooks;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/users/register", post(users::register_user))
        .route("/users/{user_id}/activate", post(users::activate_user))
        .route("/wallets", post(wallets::create_wallets))
        .route("/transfers/init", post(transfers::init_transfer))
        .route("/transfers/finalize", post(transfers::finalize_transfer))
        .route("/webhooks/custody", post(webhooks::custody_webhook))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::register_user,
        users::activate_user,
        wallets::create_wallets,
        transfers::init_transfer,
        transfers::finalize_transfer,
        webhooks::custody_webhook
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            RegisterRequest,
            RegistrationChallenge,
            ActivateUserRequest,
            ActivatedUser,
            CredentialInfo,
            CreateWalletsRequest,
            WalletAddresses,
            TransferRequest,
            InitiatedTransfer,
            InitTransferResponse,
            FinalizeTransferRequest,
            FinalizeTransferResponse,
            SignedCredential,
            AuthFactor,
            CredentialAssertion,
            TransferReceipt,
            SettledLeg,
            WebhookAck
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Users", description = "Custodial user registration and activation"),
        (name = "Wallets", description = "Wallet provisioning"),
        (name = "Transfers", description = "Challenge-signed asset transfers"),
        (name = "Webhooks", description = "Custody provider event delivery")
    )
)]
struct ApiDoc;
