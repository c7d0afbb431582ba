// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody provider integration.
//!
//! The [`CustodyGateway`] trait is the seam between the transfer saga and the
//! external provider that holds keys, issues user-action challenges and
//! broadcasts transactions. [`dfns::DfnsClient`] is the HTTP implementation.

pub mod dfns;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

pub use dfns::DfnsClient;

/// Provider identifier stored on users, wallets and transactions.
pub const PROVIDER_DFNS: &str = "dfns";

/// Transfer events the service subscribes to.
pub const TRANSFER_EVENTS: [&str; 5] = [
    "wallet.transfer.requested",
    "wallet.transfer.failed",
    "wallet.transfer.rejected",
    "wallet.transfer.broadcasted",
    "wallet.transfer.confirmed",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("custody provider configuration missing: {0}")]
    MissingConfig(String),

    #[error("custody provider request failed: {0}")]
    Request(String),

    #[error("custody provider returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("custody provider response was invalid: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Wire types
// =============================================================================

/// Chain-specific transfer body, already in the asset's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TransferPayload {
    /// The network's native asset
    Native { to: String, amount: String },
    /// ERC-20 token on an EVM network
    Erc20 {
        contract: String,
        to: String,
        amount: String,
    },
    /// SPL token on Solana
    Spl {
        mint: String,
        to: String,
        amount: String,
        #[serde(rename = "createDestinationAccount")]
        create_destination_account: bool,
    },
}

impl TransferPayload {
    pub fn to(&self) -> &str {
        match self {
            TransferPayload::Native { to, .. }
            | TransferPayload::Erc20 { to, .. }
            | TransferPayload::Spl { to, .. } => to,
        }
    }

    pub fn amount(&self) -> &str {
        match self {
            TransferPayload::Native { amount, .. }
            | TransferPayload::Erc20 { amount, .. }
            | TransferPayload::Spl { amount, .. } => amount,
        }
    }
}

/// Action the user will be asked to sign.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionRequest {
    /// JSON-encoded body of the request being signed
    pub user_action_payload: String,
    pub user_action_http_method: String,
    pub user_action_http_path: String,
}

/// Challenge issued for a [`UserActionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionChallenge {
    pub challenge: String,
    pub challenge_identifier: String,
    /// Full provider response (supported credential kinds, allowed credentials, ...)
    #[serde(skip)]
    pub raw: Value,
}

/// Client-side assertion over a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAssertion {
    pub cred_id: String,
    pub client_data: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthFactor {
    /// Credential kind, e.g. `Fido2` or `Key`
    pub kind: String,
    pub credential_assertion: CredentialAssertion,
}

/// Signed credential authorising one challenged transfer leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignedCredential {
    pub first_factor: AuthFactor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_factor: Option<AuthFactor>,
}

/// Registration attestation for one credential kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    pub cred_id: String,
    pub client_data: String,
    pub attestation_data: String,
}

/// Destination echoed back by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRequestBody {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub amount: String,
}

/// Provider response to a transfer broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    /// Provider transfer id
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub request_body: BroadcastRequestBody,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl BroadcastReceipt {
    /// Key used to correlate webhooks: the chain hash, or the provider
    /// transfer id when the provider has not assigned a hash yet.
    pub fn correlation_key(&self) -> Option<&str> {
        self.tx_hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .or(Some(self.id.as_str()).filter(|id| !id.is_empty()))
    }
}

/// Wallet creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    pub network: String,
    pub name: String,
    /// Provider-side end-user id the wallet is delegated to
    pub delegate_to: String,
}

// =============================================================================
// Gateway trait
// =============================================================================

#[async_trait]
pub trait CustodyGateway: Send + Sync {
    /// Obtain a short-lived session token for an end user.
    async fn delegated_login(&self, username: &str) -> Result<String, GatewayError>;

    /// Request a signature challenge for an action.
    async fn init_user_action(
        &self,
        session_token: &str,
        action: &UserActionRequest,
    ) -> Result<UserActionChallenge, GatewayError>;

    /// Exchange a signed credential for a user-action token.
    async fn sign_user_action(
        &self,
        session_token: &str,
        challenge_identifier: &str,
        credential: &SignedCredential,
    ) -> Result<String, GatewayError>;

    /// Broadcast a transfer at `path`, authorised by a user-action token.
    async fn broadcast_transfer(
        &self,
        session_token: &str,
        user_action: &str,
        path: &str,
        payload: &TransferPayload,
    ) -> Result<BroadcastReceipt, GatewayError>;

    /// Start delegated registration of a new end user.
    async fn register_user(&self, username: &str) -> Result<Value, GatewayError>;

    /// Re-issue the registration challenge for an end user that never activated.
    async fn restart_registration(&self, username: &str) -> Result<Value, GatewayError>;

    /// Complete registration with the user's first and second factor credentials.
    async fn complete_registration(
        &self,
        temporary_token: &str,
        fido2: &CredentialInfo,
        key: &CredentialInfo,
    ) -> Result<Value, GatewayError>;

    async fn create_wallet(&self, request: &CreateWalletRequest) -> Result<Value, GatewayError>;

    /// Subscribe a URL to provider events.
    async fn register_webhook(&self, url: &str, events: &[&str]) -> Result<Value, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spl_payload_wire_shape() {
        let payload = TransferPayload::Spl {
            mint: "EPjF".to_string(),
            to: "0xBBB".to_string(),
            amount: "10000000".to_string(),
            create_destination_account: true,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "kind": "Spl",
                "mint": "EPjF",
                "to": "0xBBB",
                "amount": "10000000",
                "createDestinationAccount": true
            })
        );
        assert_eq!(payload.to(), "0xBBB");
    }

    #[test]
    fn broadcast_receipt_tolerates_missing_fields() {
        let receipt: BroadcastReceipt = serde_json::from_value(json!({
            "id": "xfr-1",
            "status": "Pending",
            "requestBody": {"kind": "Spl", "to": "0xBBB"}
        }))
        .unwrap();
        assert_eq!(receipt.tx_hash, None);
        assert_eq!(receipt.request_body.to, "0xBBB");
        assert_eq!(receipt.correlation_key(), Some("xfr-1"));
    }

    #[test]
    fn correlation_prefers_tx_hash() {
        let receipt = BroadcastReceipt {
            id: "xfr-1".to_string(),
            tx_hash: Some("0xhash".to_string()),
            ..Default::default()
        };
        assert_eq!(receipt.correlation_key(), Some("0xhash"));
        assert_eq!(BroadcastReceipt::default().correlation_key(), None);
    }
}
