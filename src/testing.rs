// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared test fixtures: an in-process custody gateway and sample records.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::config::TransferSettings;
use crate::providers::{
    AuthFactor, BroadcastReceipt, BroadcastRequestBody, CreateWalletRequest, CredentialAssertion,
    CredentialInfo, CustodyGateway, GatewayError, SignedCredential, TransferPayload,
    UserActionChallenge, UserActionRequest, PROVIDER_DFNS,
};
use crate::storage::{InFlightTransfer, LedgerStore, UnconfirmedTransaction, User, Wallet};
use crate::transfer::{LegKind, TransferContext, TransferRequest};

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Status(u16),
    Request,
}

impl Failure {
    fn into_error(self, method: &str) -> GatewayError {
        match self {
            Failure::Status(status) => GatewayError::Status {
                status,
                path: method.to_string(),
                body: "scripted failure".to_string(),
            },
            Failure::Request => GatewayError::Request(format!("{method}: connection reset")),
        }
    }
}

#[derive(Default)]
struct FakeState {
    calls: HashMap<&'static str, usize>,
    failures: HashMap<(&'static str, usize), Failure>,
    challenges: Vec<String>,
}

/// Scriptable [`CustodyGateway`] that records every call.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    sign_delay: Option<Duration>,
    omit_tx_hash: bool,
}

impl FakeGateway {
    /// Fail the `n`th (1-based) call of `method`.
    pub fn fail_nth(self, method: &'static str, n: usize, failure: Failure) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((method, n), failure);
        self
    }

    pub fn with_sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = Some(delay);
        self
    }

    /// Broadcast responses carry only the provider transfer id.
    pub fn without_tx_hash(mut self) -> Self {
        self.omit_tx_hash = true;
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn issued_challenges(&self) -> Vec<String> {
        self.state.lock().unwrap().challenges.clone()
    }

    /// Count the call and return its 1-based sequence number.
    fn record(&self, method: &'static str) -> Result<usize, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let count = state.calls.entry(method).or_insert(0);
        *count += 1;
        let n = *count;
        match state.failures.get(&(method, n)) {
            Some(failure) => Err(failure.into_error(method)),
            None => Ok(n),
        }
    }
}

#[async_trait]
impl CustodyGateway for FakeGateway {
    async fn delegated_login(&self, username: &str) -> Result<String, GatewayError> {
        self.record("delegated_login")?;
        Ok(format!("session-{username}"))
    }

    async fn init_user_action(
        &self,
        _session_token: &str,
        action: &UserActionRequest,
    ) -> Result<UserActionChallenge, GatewayError> {
        let n = self.record("init_user_action")?;
        let challenge = format!("ch-{n}-{}", uuid::Uuid::new_v4().simple());
        self.state.lock().unwrap().challenges.push(challenge.clone());
        Ok(UserActionChallenge {
            challenge: challenge.clone(),
            challenge_identifier: format!("ci-{n}"),
            raw: json!({
                "challenge": challenge,
                "challengeIdentifier": format!("ci-{n}"),
                "userActionHttpPath": action.user_action_http_path,
            }),
        })
    }

    async fn sign_user_action(
        &self,
        _session_token: &str,
        challenge_identifier: &str,
        _credential: &SignedCredential,
    ) -> Result<String, GatewayError> {
        if let Some(delay) = self.sign_delay {
            tokio::time::sleep(delay).await;
        }
        self.record("sign_user_action")?;
        Ok(format!("ua-{challenge_identifier}"))
    }

    async fn broadcast_transfer(
        &self,
        _session_token: &str,
        _user_action: &str,
        _path: &str,
        payload: &TransferPayload,
    ) -> Result<BroadcastReceipt, GatewayError> {
        let n = self.record("broadcast_transfer")?;
        let tx_hash = (!self.omit_tx_hash).then(|| format!("0xtx{n}"));
        let raw = json!({
            "id": format!("xfr-{n}"),
            "network": "Solana",
            "status": "Broadcasted",
            "txHash": tx_hash,
            "requestBody": payload,
        });
        Ok(BroadcastReceipt {
            id: format!("xfr-{n}"),
            tx_hash,
            network: "Solana".to_string(),
            status: "Broadcasted".to_string(),
            request_body: BroadcastRequestBody {
                to: payload.to().to_string(),
                amount: payload.amount().to_string(),
            },
            fee: None,
            raw,
        })
    }

    async fn register_user(&self, username: &str) -> Result<Value, GatewayError> {
        self.record("register_user")?;
        Ok(registration(username, "reg-challenge"))
    }

    async fn restart_registration(&self, username: &str) -> Result<Value, GatewayError> {
        self.record("restart_registration")?;
        Ok(registration(username, "reg-challenge-restarted"))
    }

    async fn complete_registration(
        &self,
        _temporary_token: &str,
        _fido2: &CredentialInfo,
        _key: &CredentialInfo,
    ) -> Result<Value, GatewayError> {
        self.record("complete_registration")?;
        Ok(json!({
            "credential": { "uuid": "cr-1", "credentialKind": "Fido2" },
            "authentication": { "token": "auth-token" },
        }))
    }

    async fn create_wallet(&self, request: &CreateWalletRequest) -> Result<Value, GatewayError> {
        let n = self.record("create_wallet")?;
        Ok(json!({
            "id": format!("dfns-wa-{n}"),
            "network": request.network,
            "name": request.name,
            "address": format!("0xW{n}"),
            "status": "Active",
        }))
    }

    async fn register_webhook(&self, url: &str, events: &[&str]) -> Result<Value, GatewayError> {
        self.record("register_webhook")?;
        Ok(json!({ "id": "wh-1", "url": url, "events": events }))
    }
}

fn registration(username: &str, challenge: &str) -> Value {
    json!({
        "user": { "id": format!("dfns-{username}"), "name": username },
        "challenge": challenge,
        "temporaryAuthenticationToken": format!("temp-{username}"),
    })
}

// =============================================================================
// Sample records
// =============================================================================

pub fn settings() -> TransferSettings {
    TransferSettings {
        primary_network: "Solana".to_string(),
        fee_address: "0xFEE".to_string(),
        token_contracts: HashMap::from([(
            "USDC".to_string(),
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
        )]),
        challenge_ttl: chrono::Duration::seconds(900),
        claim_lease: chrono::Duration::seconds(60),
    }
}

pub fn credential() -> SignedCredential {
    SignedCredential {
        first_factor: AuthFactor {
            kind: "Fido2".to_string(),
            credential_assertion: CredentialAssertion {
                cred_id: "cred-1".to_string(),
                client_data: "Y2xpZW50".to_string(),
                authenticator_data: "YXV0aA".to_string(),
                signature: "c2ln".to_string(),
                user_handle: None,
            },
        },
        second_factor: None,
    }
}

pub fn credential_info() -> CredentialInfo {
    CredentialInfo {
        cred_id: "cred-1".to_string(),
        client_data: "Y2xpZW50".to_string(),
        attestation_data: "YXR0ZXN0".to_string(),
    }
}

pub fn sample_user(id: &str, name: &str, active: bool) -> User {
    let now = Utc::now();
    User {
        id: id.to_string(),
        name: name.to_string(),
        provider: PROVIDER_DFNS.to_string(),
        is_active: active,
        metadata: registration(name, "reg-challenge"),
        auth_token: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_wallet(user_id: &str, username: &str, network: &str, address: &str) -> Wallet {
    let now = Utc::now();
    Wallet {
        id: format!("wa-{username}-{network}"),
        user_id: user_id.to_string(),
        username: username.to_string(),
        provider: PROVIDER_DFNS.to_string(),
        network: network.to_string(),
        name: format!("{username}-{network}-wallet"),
        address: address.to_string(),
        is_active: true,
        metadata: json!({ "id": format!("dfns-wa-{username}"), "address": address }),
        created_at: now,
        updated_at: now,
    }
}

/// Alice (`0xAAA`) and Bob (`0xBBB`) with Solana wallets.
pub fn seed_transfer_parties(ledger: &LedgerStore, alice_active: bool) {
    ledger
        .create_user(&sample_user("us-alice", "alice", alice_active))
        .unwrap();
    ledger.create_user(&sample_user("us-bob", "bob", true)).unwrap();
    ledger
        .create_wallet(&sample_wallet("us-alice", "alice", "Solana", "0xAAA"))
        .unwrap();
    ledger
        .create_wallet(&sample_wallet("us-bob", "bob", "Solana", "0xBBB"))
        .unwrap();
}

pub fn sample_inflight(challenge: &str, expires_at: DateTime<Utc>) -> InFlightTransfer {
    InFlightTransfer {
        challenge: challenge.to_string(),
        challenge_identifier: format!("ci-{challenge}"),
        target_path: "/wallets/dfns-wa-alice/transfers".to_string(),
        session_token: "session-alice".to_string(),
        context: TransferContext {
            leg: LegKind::Fund,
            request: TransferRequest {
                user_id: "us-alice".to_string(),
                to_account: "bob".to_string(),
                amount: "10.0".to_string(),
                fee: "0.5".to_string(),
                denom: "USDC".to_string(),
                memo: None,
            },
            payload: TransferPayload::Native {
                to: "0xBBB".to_string(),
                amount: "10000000".to_string(),
            },
            sender_wallet: sample_wallet("us-alice", "alice", "Solana", "0xAAA"),
            receiver_name: "bob".to_string(),
            receiver_address: "0xBBB".to_string(),
            challenge_response: json!({}),
        },
        attempts: 0,
        claimed_at: None,
        created_at: Utc::now(),
        expires_at,
        deleted_at: None,
        tombstone_reason: None,
    }
}

pub fn sample_unconfirmed(tx_hash: &str, fee: bool) -> UnconfirmedTransaction {
    UnconfirmedTransaction {
        tx_hash: tx_hash.to_string(),
        transfer_id: None,
        sender_name: "alice".to_string(),
        sender_address: "0xAAA".to_string(),
        receiver_name: if fee { "fees" } else { "bob" }.to_string(),
        receiver_address: if fee { "0xFEE" } else { "0xBBB" }.to_string(),
        amount: if fee { "0.5" } else { "10.0" }.to_string(),
        denom: "USDC".to_string(),
        provider: PROVIDER_DFNS.to_string(),
        network: "Solana".to_string(),
        fee_type: fee,
        status: "Broadcasted".to_string(),
        utr: "UTR-TEST".to_string(),
        retries: 0,
        metadata: json!({}),
        created_at: Utc::now(),
    }
}
