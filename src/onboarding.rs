// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User registration, activation and wallet provisioning.
//!
//! Registration is delegated: the custody provider issues a WebAuthn-style
//! challenge that the client answers with a `Fido2` and a `Key` credential.
//! A user becomes active exactly once, after which wallets can be created.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::providers::{
    CreateWalletRequest, CredentialInfo, CustodyGateway, GatewayError, PROVIDER_DFNS,
    TRANSFER_EVENTS,
};
use crate::storage::{LedgerError, LedgerStore, User, Wallet};

pub const USER_ID_PREFIX: &str = "us-";
pub const WALLET_ID_PREFIX: &str = "wa-";

const FIDO2_CREDENTIAL: &str = "Fido2";
const KEY_CREDENTIAL: &str = "Key";

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("user {0} is already active")]
    AlreadyActive(String),

    #[error("username {0} is already registered")]
    UsernameTaken(String),

    #[error("user {0} is not activated")]
    UserInactive(String),

    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stored provider metadata is incomplete: {0}")]
    InvalidMetadata(String),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("ledger error: {0}")]
    Persistence(#[from] LedgerError),
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Optional caller-chosen id; `us-` is prepended when missing
    #[serde(default)]
    pub user_id: Option<String>,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationChallenge {
    pub user_id: String,
    pub challenge: String,
    pub temporary_authentication_token: String,
    /// Full provider registration options for the client authenticator
    pub registration: Value,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedUser {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

pub struct Onboarding {
    ledger: Arc<LedgerStore>,
    gateway: Arc<dyn CustodyGateway>,
    networks: Vec<String>,
}

impl Onboarding {
    pub fn new(
        ledger: Arc<LedgerStore>,
        gateway: Arc<dyn CustodyGateway>,
        networks: Vec<String>,
    ) -> Self {
        Self {
            ledger,
            gateway,
            networks,
        }
    }

    /// Register a new user, or restart registration for one that never activated.
    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<RegistrationChallenge, OnboardingError> {
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(OnboardingError::InvalidRequest(
                "username must not be empty".to_string(),
            ));
        }
        let user_id = normalize_user_id(request.user_id.as_deref());
        let now = Utc::now();

        let registration = match self.ledger.find_user(&user_id)? {
            Some(user) if user.is_active => return Err(OnboardingError::AlreadyActive(user.id)),
            Some(mut user) => {
                let registration = self.gateway.restart_registration(&user.name).await?;
                user.metadata = registration.clone();
                user.updated_at = now;
                self.ledger.update_user(&user)?;
                info!(user_id = %user.id, "Registration restarted");
                registration
            }
            None => {
                if self.ledger.find_user_by_username(&username)?.is_some() {
                    return Err(OnboardingError::UsernameTaken(username));
                }
                let registration = self.gateway.register_user(&username).await?;
                let created = self.ledger.create_user(&User {
                    id: user_id.clone(),
                    name: username.clone(),
                    provider: PROVIDER_DFNS.to_string(),
                    is_active: false,
                    metadata: registration.clone(),
                    auth_token: None,
                    created_at: now,
                    updated_at: now,
                });
                match created {
                    Ok(()) => {}
                    // Lost a race with a concurrent registration
                    Err(LedgerError::AlreadyExists(_)) => {
                        return Err(OnboardingError::UsernameTaken(username));
                    }
                    Err(e) => return Err(e.into()),
                }
                info!(user_id = %user_id, "User registered, activation pending");
                registration
            }
        };

        Ok(RegistrationChallenge {
            user_id,
            challenge: metadata_str(&registration, &["challenge"])?,
            temporary_authentication_token: metadata_str(
                &registration,
                &["temporaryAuthenticationToken"],
            )?,
            registration,
        })
    }

    /// Complete registration with the user's credentials and mark them active.
    pub async fn activate(
        &self,
        user_id: &str,
        credentials: &HashMap<String, CredentialInfo>,
    ) -> Result<ActivatedUser, OnboardingError> {
        let mut user = self
            .ledger
            .find_user(user_id)?
            .ok_or_else(|| OnboardingError::UserNotFound(user_id.to_string()))?;
        if user.is_active {
            return Err(OnboardingError::AlreadyActive(user.id));
        }

        let fido2 = credentials
            .get(FIDO2_CREDENTIAL)
            .ok_or(OnboardingError::MissingCredential(FIDO2_CREDENTIAL))?;
        let key = credentials
            .get(KEY_CREDENTIAL)
            .ok_or(OnboardingError::MissingCredential(KEY_CREDENTIAL))?;
        let temporary_token = metadata_str(&user.metadata, &["temporaryAuthenticationToken"])?;

        let completed = self
            .gateway
            .complete_registration(&temporary_token, fido2, key)
            .await?;

        user.is_active = true;
        user.auth_token = completed
            .pointer("/authentication/token")
            .and_then(Value::as_str)
            .map(str::to_string);
        user.updated_at = Utc::now();
        self.ledger.update_user(&user)?;

        info!(user_id = %user.id, "User activated");
        Ok(ActivatedUser {
            user_id: user.id,
            username: user.name,
            is_active: true,
        })
    }

    /// Ensure the user has a wallet on every configured network.
    ///
    /// Returns `network → address`.
    pub async fn create_wallets(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, String>, OnboardingError> {
        let user = self
            .ledger
            .find_user(user_id)?
            .ok_or_else(|| OnboardingError::UserNotFound(user_id.to_string()))?;
        if !user.is_active {
            return Err(OnboardingError::UserInactive(user.id));
        }

        let mut addresses = BTreeMap::new();
        for network in &self.networks {
            let wallet = self.create_or_fetch_wallet(&user, network).await?;
            addresses.insert(network.clone(), wallet.address);
        }
        Ok(addresses)
    }

    async fn create_or_fetch_wallet(
        &self,
        user: &User,
        network: &str,
    ) -> Result<Wallet, OnboardingError> {
        if let Some(wallet) = self.ledger.find_wallet(&user.id, PROVIDER_DFNS, network)? {
            return Ok(wallet);
        }

        let delegate_to = metadata_str(&user.metadata, &["user", "id"])?;
        let response = self
            .gateway
            .create_wallet(&CreateWalletRequest {
                network: network.to_string(),
                name: format!("{}-{}-wallet", user.name, network),
                delegate_to,
            })
            .await?;

        let now = Utc::now();
        let wallet = Wallet {
            id: format!("{WALLET_ID_PREFIX}{}", Uuid::new_v4()),
            user_id: user.id.clone(),
            username: user.name.clone(),
            provider: PROVIDER_DFNS.to_string(),
            network: network.to_string(),
            name: metadata_str(&response, &["name"])?,
            address: metadata_str(&response, &["address"])?,
            is_active: response.get("status").and_then(Value::as_str) == Some("Active"),
            metadata: response,
            created_at: now,
            updated_at: now,
        };

        match self.ledger.create_wallet(&wallet) {
            Ok(()) => {
                info!(user_id = %user.id, network, address = %wallet.address, "Wallet created");
                Ok(wallet)
            }
            // Lost a race with a concurrent request for the same network
            Err(LedgerError::AlreadyExists(_)) => self
                .ledger
                .find_wallet(&user.id, PROVIDER_DFNS, network)?
                .ok_or_else(|| OnboardingError::InvalidMetadata(format!("wallet on {network}"))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Subscribe `url` to transfer lifecycle events. Failures are logged only.
pub async fn subscribe_transfer_events(gateway: &dyn CustodyGateway, url: &str) {
    match gateway.register_webhook(url, &TRANSFER_EVENTS).await {
        Ok(response) => info!(
            url,
            webhook_id = ?response.get("id"),
            "Subscribed to custody transfer events"
        ),
        Err(e) => warn!(url, error = %e, "Custody webhook subscription failed"),
    }
}

fn normalize_user_id(user_id: Option<&str>) -> String {
    match user_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) if id.starts_with(USER_ID_PREFIX) => id.to_string(),
        Some(id) => format!("{USER_ID_PREFIX}{id}"),
        None => format!("{USER_ID_PREFIX}{}", Uuid::new_v4()),
    }
}

fn metadata_str(value: &Value, path: &[&str]) -> Result<String, OnboardingError> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OnboardingError::InvalidMetadata(path.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{credential_info, FakeGateway, Failure};

    fn setup(gateway: FakeGateway) -> (Onboarding, Arc<LedgerStore>, Arc<FakeGateway>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerStore::open(&dir.path().join("ledger.redb")).unwrap());
        let gateway = Arc::new(gateway);
        let onboarding = Onboarding::new(
            ledger.clone(),
            gateway.clone(),
            vec!["Solana".to_string(), "EthereumSepolia".to_string()],
        );
        (onboarding, ledger, gateway, dir)
    }

    fn register(user_id: &str) -> RegisterRequest {
        RegisterRequest {
            user_id: Some(user_id.to_string()),
            username: "alice@example.com".to_string(),
        }
    }

    fn both_credentials() -> HashMap<String, CredentialInfo> {
        HashMap::from([
            ("Fido2".to_string(), credential_info()),
            ("Key".to_string(), credential_info()),
        ])
    }

    #[test]
    fn normalizes_user_ids() {
        assert_eq!(normalize_user_id(Some("abc")), "us-abc");
        assert_eq!(normalize_user_id(Some("us-abc")), "us-abc");
        assert!(normalize_user_id(None).starts_with("us-"));
        assert!(normalize_user_id(Some("  ")).starts_with("us-"));
    }

    #[tokio::test]
    async fn register_then_restart_then_activate() {
        let (onboarding, ledger, gateway, _dir) = setup(FakeGateway::default());

        let first = onboarding.register(register("alice")).await.unwrap();
        assert_eq!(first.user_id, "us-alice");
        assert!(!first.temporary_authentication_token.is_empty());
        assert!(!ledger.find_user("us-alice").unwrap().unwrap().is_active);

        onboarding.register(register("alice")).await.unwrap();
        assert_eq!(gateway.calls("register_user"), 1);
        assert_eq!(gateway.calls("restart_registration"), 1);

        let activated = onboarding
            .activate("us-alice", &both_credentials())
            .await
            .unwrap();
        assert!(activated.is_active);
        let user = ledger.find_user("us-alice").unwrap().unwrap();
        assert!(user.is_active);
        assert_eq!(user.auth_token.as_deref(), Some("auth-token"));

        assert!(matches!(
            onboarding.register(register("alice")).await,
            Err(OnboardingError::AlreadyActive(_))
        ));
        assert!(matches!(
            onboarding.activate("us-alice", &both_credentials()).await,
            Err(OnboardingError::AlreadyActive(_))
        ));
    }

    #[tokio::test]
    async fn activation_requires_both_credentials() {
        let (onboarding, _ledger, gateway, _dir) = setup(FakeGateway::default());
        onboarding.register(register("alice")).await.unwrap();

        let only_fido = HashMap::from([("Fido2".to_string(), credential_info())]);
        assert!(matches!(
            onboarding.activate("us-alice", &only_fido).await,
            Err(OnboardingError::MissingCredential("Key"))
        ));
        assert_eq!(gateway.calls("complete_registration"), 0);
    }

    #[tokio::test]
    async fn wallets_are_created_once_per_network() {
        let (onboarding, ledger, gateway, _dir) = setup(FakeGateway::default());
        onboarding.register(register("alice")).await.unwrap();

        assert!(matches!(
            onboarding.create_wallets("us-alice").await,
            Err(OnboardingError::UserInactive(_))
        ));

        onboarding
            .activate("us-alice", &both_credentials())
            .await
            .unwrap();
        let first = onboarding.create_wallets("us-alice").await.unwrap();
        assert_eq!(first.len(), 2);
        let second = onboarding.create_wallets("us-alice").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(gateway.calls("create_wallet"), 2);

        let wallet = ledger
            .find_wallet_by_username("alice@example.com", PROVIDER_DFNS, "Solana")
            .unwrap()
            .unwrap();
        assert_eq!(wallet.name, "alice@example.com-Solana-wallet");
        assert!(wallet.id.starts_with("wa-"));
        assert!(wallet.provider_wallet_id().is_some());
    }

    #[tokio::test]
    async fn second_user_cannot_claim_an_existing_username() {
        let (onboarding, ledger, gateway, _dir) = setup(FakeGateway::default());
        onboarding.register(register("us-one")).await.unwrap();
        onboarding
            .activate("us-one", &both_credentials())
            .await
            .unwrap();
        onboarding.create_wallets("us-one").await.unwrap();

        assert!(matches!(
            onboarding.register(register("us-two")).await,
            Err(OnboardingError::UsernameTaken(name)) if name == "alice@example.com"
        ));
        assert_eq!(gateway.calls("register_user"), 1);
        assert!(ledger.find_user("us-two").unwrap().is_none());

        let wallet = ledger
            .find_wallet_by_username("alice@example.com", PROVIDER_DFNS, "Solana")
            .unwrap()
            .unwrap();
        assert_eq!(wallet.user_id, "us-one");
    }

    #[tokio::test]
    async fn provider_failure_leaves_no_user() {
        let (onboarding, ledger, _gateway, _dir) =
            setup(FakeGateway::default().fail_nth("register_user", 1, Failure::Status(502)));
        assert!(matches!(
            onboarding.register(register("alice")).await,
            Err(OnboardingError::Gateway(_))
        ));
        assert!(ledger.find_user("us-alice").unwrap().is_none());
    }
}
