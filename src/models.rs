// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request and response bodies for the HTTP API.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::providers::{CredentialInfo, SignedCredential};
use crate::transfer::{FinalizeReport, InitiatedTransfer, SettledLeg, TransferReceipt};

// =============================================================================
// User Models
// =============================================================================

/// Credentials produced by the user's authenticators during registration.
///
/// Keyed by credential kind; both `Fido2` and `Key` are required.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivateUserRequest {
    pub credential_info: HashMap<String, CredentialInfo>,
}

// =============================================================================
// Wallet Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletsRequest {
    pub user_id: String,
}

/// Provisioned wallet addresses, one per configured network.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddresses {
    pub user_id: String,
    /// Network name to on-chain address
    pub addresses: BTreeMap<String, String>,
}

// =============================================================================
// Transfer Models
// =============================================================================

/// Challenges the client must sign to authorise both transfer legs.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InitTransferResponse {
    pub challenge: InitiatedTransfer,
}

/// One signed credential per challenge returned by `/v1/transfers/init`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FinalizeTransferRequest {
    pub credentials: BTreeMap<String, SignedCredential>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinalizeTransferResponse {
    /// Present when the fund leg was broadcast by this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransferReceipt>,
    pub legs: Vec<SettledLeg>,
    /// Challenge to error message for legs that did not broadcast
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
}

impl From<FinalizeReport> for FinalizeTransferResponse {
    fn from(report: FinalizeReport) -> Self {
        Self {
            receipt: report.receipt,
            legs: report.settled,
            failures: report
                .failures
                .into_iter()
                .map(|(challenge, err)| (challenge, err.to_string()))
                .collect(),
        }
    }
}

// =============================================================================
// Webhook Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{LegKind, TransferError};

    #[test]
    fn finalize_response_flattens_failures_to_messages() {
        let mut report = FinalizeReport::default();
        report.settled.push(SettledLeg {
            challenge: "ch-1".into(),
            leg: LegKind::Fee,
            tx_hash: "0xtx1".into(),
            utr: "UTR-1".into(),
        });
        report
            .failures
            .insert("ch-2".into(), TransferError::ChallengeNotFound("ch-2".into()));

        let body = serde_json::to_value(FinalizeTransferResponse::from(report)).unwrap();
        assert!(body.get("receipt").is_none());
        assert_eq!(body["legs"][0]["leg"], "fee");
        assert_eq!(body["legs"][0]["txHash"], "0xtx1");
        assert!(body["failures"]["ch-2"]
            .as_str()
            .unwrap()
            .contains("ch-2"));
    }

    #[test]
    fn activate_request_accepts_credential_map() {
        let body = r#"{
            "credentialInfo": {
                "Fido2": {"credId": "a", "clientData": "b", "attestationData": "c"},
                "Key": {"credId": "d", "clientData": "e", "attestationData": "f"}
            }
        }"#;
        let parsed: ActivateUserRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.credential_info.len(), 2);
        assert_eq!(parsed.credential_info["Key"].cred_id, "d");
    }
}
