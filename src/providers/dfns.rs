// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DFNS custody API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    BroadcastReceipt, CreateWalletRequest, CredentialInfo, CustodyGateway, GatewayError,
    SignedCredential, TransferPayload, UserActionChallenge, UserActionRequest,
};
use crate::config::{CustodyConfig, GATEWAY_TIMEOUT_SECS};

const DELEGATED_REGISTRATION_PATH: &str = "/auth/registration/delegated";
const DELEGATED_REGISTRATION_RESTART_PATH: &str = "/auth/registration/delegated/restart";
const COMPLETE_REGISTRATION_PATH: &str = "/auth/registration";
const DELEGATED_LOGIN_PATH: &str = "/auth/login/delegated";
const USER_ACTION_INIT_PATH: &str = "/auth/action/init";
const USER_ACTION_PATH: &str = "/auth/action";
const WALLETS_PATH: &str = "/wallets";
const WEBHOOKS_PATH: &str = "/webhooks";

/// Path a wallet's transfers are posted to.
pub fn transfer_path(provider_wallet_id: &str) -> String {
    format!("{WALLETS_PATH}/{provider_wallet_id}/transfers")
}

/// Which credential authenticates a request.
enum Auth<'a> {
    /// Service account token from configuration
    Service,
    /// End-user session token
    User(&'a str),
    /// End-user session token plus a signed user action
    UserAction { token: &'a str, user_action: &'a str },
}

#[derive(Debug, Clone)]
pub struct DfnsClient {
    base_url: String,
    app_id: String,
    service_token: String,
    http: Client,
}

impl DfnsClient {
    pub fn new(config: &CustodyConfig) -> Result<Self, GatewayError> {
        if config.app_id.is_empty() {
            return Err(GatewayError::MissingConfig("DFNS_APP_ID".to_string()));
        }
        if config.auth_token.is_empty() {
            return Err(GatewayError::MissingConfig("DFNS_AUTH_TOKEN".to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            service_token: config.auth_token.clone(),
            http,
        })
    }

    fn authorize(&self, builder: RequestBuilder, path: &str, auth: Auth<'_>) -> RequestBuilder {
        let builder = builder
            .header("X-DFNS-APPID", &self.app_id)
            .header("Content-Type", "application/json");

        let builder = match auth {
            Auth::Service => builder.bearer_auth(&self.service_token),
            Auth::User(token) => builder.bearer_auth(token),
            Auth::UserAction { token, user_action } => builder
                .bearer_auth(token)
                .header("X-DFNS-USERACTION", user_action),
        };

        // Challenge and registration endpoints are themselves part of the
        // user-action flow and must not demand one.
        if is_user_action_flow_path(path) {
            builder.header("X-DFNS-USERACTION", "false")
        } else {
            builder
        }
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        auth: Auth<'_>,
    ) -> Result<Value, GatewayError> {
        let request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);

        let response = self
            .authorize(request, path, auth)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("POST {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status,
                path: path.to_string(),
                body,
            });
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("POST {path}: {e}")))?;
        debug!(path, "Custody provider call succeeded");
        Ok(value)
    }
}

fn is_user_action_flow_path(path: &str) -> bool {
    matches!(
        path,
        COMPLETE_REGISTRATION_PATH | USER_ACTION_INIT_PATH | USER_ACTION_PATH
    )
}

fn required_str(value: &Value, field: &str, path: &str) -> Result<String, GatewayError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("missing {field} in {path} response")))
}

#[async_trait]
impl CustodyGateway for DfnsClient {
    async fn delegated_login(&self, username: &str) -> Result<String, GatewayError> {
        let response = self
            .post_json(
                DELEGATED_LOGIN_PATH,
                &json!({ "username": username }),
                Auth::Service,
            )
            .await?;
        required_str(&response, "token", DELEGATED_LOGIN_PATH)
    }

    async fn init_user_action(
        &self,
        session_token: &str,
        action: &UserActionRequest,
    ) -> Result<UserActionChallenge, GatewayError> {
        let response = self
            .post_json(USER_ACTION_INIT_PATH, action, Auth::User(session_token))
            .await?;
        Ok(UserActionChallenge {
            challenge: required_str(&response, "challenge", USER_ACTION_INIT_PATH)?,
            challenge_identifier: required_str(
                &response,
                "challengeIdentifier",
                USER_ACTION_INIT_PATH,
            )?,
            raw: response,
        })
    }

    async fn sign_user_action(
        &self,
        session_token: &str,
        challenge_identifier: &str,
        credential: &SignedCredential,
    ) -> Result<String, GatewayError> {
        let mut body = serde_json::to_value(credential)
            .map_err(|e| GatewayError::Request(format!("serialize credential failed: {e}")))?;
        body["challengeIdentifier"] = Value::String(challenge_identifier.to_string());

        let response = self
            .post_json(USER_ACTION_PATH, &body, Auth::User(session_token))
            .await?;
        required_str(&response, "userAction", USER_ACTION_PATH)
    }

    async fn broadcast_transfer(
        &self,
        session_token: &str,
        user_action: &str,
        path: &str,
        payload: &TransferPayload,
    ) -> Result<BroadcastReceipt, GatewayError> {
        let response = self
            .post_json(
                path,
                payload,
                Auth::UserAction {
                    token: session_token,
                    user_action,
                },
            )
            .await?;

        let mut receipt: BroadcastReceipt = serde_json::from_value(response.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("POST {path}: {e}")))?;
        receipt.raw = response;
        Ok(receipt)
    }

    async fn register_user(&self, username: &str) -> Result<Value, GatewayError> {
        self.post_json(
            DELEGATED_REGISTRATION_PATH,
            &json!({ "kind": "EndUser", "email": username }),
            Auth::Service,
        )
        .await
    }

    async fn restart_registration(&self, username: &str) -> Result<Value, GatewayError> {
        self.post_json(
            DELEGATED_REGISTRATION_RESTART_PATH,
            &json!({ "kind": "EndUser", "email": username }),
            Auth::Service,
        )
        .await
    }

    async fn complete_registration(
        &self,
        temporary_token: &str,
        fido2: &CredentialInfo,
        key: &CredentialInfo,
    ) -> Result<Value, GatewayError> {
        let body = json!({
            "firstFactorCredential": {
                "credentialKind": "Fido2",
                "credentialInfo": fido2,
            },
            "secondFactorCredential": {
                "credentialKind": "Key",
                "credentialInfo": key,
            },
        });
        self.post_json(COMPLETE_REGISTRATION_PATH, &body, Auth::User(temporary_token))
            .await
    }

    async fn create_wallet(&self, request: &CreateWalletRequest) -> Result<Value, GatewayError> {
        self.post_json(WALLETS_PATH, request, Auth::Service).await
    }

    async fn register_webhook(&self, url: &str, events: &[&str]) -> Result<Value, GatewayError> {
        let body = json!({
            "url": url,
            "description": "Transfer lifecycle events",
            "events": events,
        });
        self.post_json(WEBHOOKS_PATH, &body, Auth::Service).await
    }
}
