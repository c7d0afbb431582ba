// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Saga Coordinator
//!
//! A transfer is split into two independently challenged legs, fund then fee.
//! Each leg moves through
//! `Requested → ChallengeIssued → Broadcasted → {Confirmed | Failed | Rejected}`:
//!
//! - [`TransferCoordinator::initiate`] requests a signature challenge per leg
//!   and persists an [`InFlightTransfer`] for each.
//! - [`TransferCoordinator::finalize`] claims each in-flight row, exchanges the
//!   signed credential for a user action, broadcasts, and records an
//!   [`UnconfirmedTransaction`] while tombstoning the in-flight row.
//! - The [`Reconciler`] later moves the unconfirmed row into the log.
//!
//! A claimed row cannot be claimed again until released or its lease runs
//! out, so concurrent finalize calls for one challenge broadcast at most once.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::context::{AssetRoute, LegKind, TransferContext, TransferRequest};
use super::error::TransferError;
use crate::amount::to_positive_smallest_unit;
use crate::config::TransferSettings;
use crate::providers::{
    dfns::transfer_path, CustodyGateway, SignedCredential, TransferPayload, UserActionRequest,
    PROVIDER_DFNS,
};
use crate::reconciler::Reconciler;
use crate::storage::{
    InFlightTransfer, LedgerError, LedgerStore, TombstoneReason, UnconfirmedTransaction, Wallet,
};

/// Challenges issued by [`TransferCoordinator::initiate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InitiatedTransfer {
    pub fund: String,
    pub fee: String,
}

/// Caller-facing result of a finalized fund leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub receiver_id: String,
    pub amount: String,
    pub fee: String,
    pub denom: String,
    pub utr: String,
    pub tx_hash: String,
    pub network: String,
    pub receiver_address: String,
}

/// A leg broadcast during this finalize call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettledLeg {
    pub challenge: String,
    #[schema(value_type = String)]
    pub leg: LegKind,
    pub tx_hash: String,
    pub utr: String,
}

/// Per-challenge outcome of [`TransferCoordinator::finalize`].
#[derive(Debug, Default)]
pub struct FinalizeReport {
    /// Present when the fund leg was broadcast in this call
    pub receipt: Option<TransferReceipt>,
    pub settled: Vec<SettledLeg>,
    /// Challenges that failed, retryable unless consumed or expired
    pub failures: BTreeMap<String, TransferError>,
}

impl FinalizeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TransferCoordinator {
    ledger: Arc<LedgerStore>,
    gateway: Arc<dyn CustodyGateway>,
    reconciler: Reconciler,
    settings: TransferSettings,
}

impl TransferCoordinator {
    pub fn new(
        ledger: Arc<LedgerStore>,
        gateway: Arc<dyn CustodyGateway>,
        settings: TransferSettings,
    ) -> Self {
        let reconciler = Reconciler::new(ledger.clone());
        Self {
            ledger,
            gateway,
            reconciler,
            settings,
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    // =========================================================================
    // Initiate
    // =========================================================================

    pub async fn initiate(
        &self,
        request: TransferRequest,
    ) -> Result<InitiatedTransfer, TransferError> {
        let user = self
            .ledger
            .find_user(&request.user_id)?
            .ok_or_else(|| TransferError::UserNotFound(request.user_id.clone()))?;
        if !user.is_active {
            return Err(TransferError::UserInactive(user.id));
        }

        // Validate both legs before touching the provider.
        let network = &self.settings.primary_network;
        let route = AssetRoute::resolve(network, &request.denom, &self.settings.token_contracts)?;
        let fund_amount = to_positive_smallest_unit(&request.amount, &request.denom)?;
        let fee_amount = to_positive_smallest_unit(&request.fee, &request.denom)?;

        let session_token = self.gateway.delegated_login(&user.name).await?;

        let sender_wallet = self
            .ledger
            .find_wallet_by_username(&user.name, PROVIDER_DFNS, network)?
            .ok_or_else(|| TransferError::WalletNotFound(format!("{} on {network}", user.name)))?;
        let receiver_wallet = self
            .ledger
            .find_wallet_by_username(&request.to_account, PROVIDER_DFNS, network)?
            .ok_or_else(|| {
                TransferError::WalletNotFound(format!("{} on {network}", request.to_account))
            })?;
        let sender_wallet_id = sender_wallet
            .provider_wallet_id()
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::WalletNotFound(format!("provider id for wallet {}", sender_wallet.id))
            })?;
        let path = transfer_path(&sender_wallet_id);

        let fund = LegPlan {
            leg: LegKind::Fund,
            payload: route.payload(&receiver_wallet.address, &fund_amount),
            receiver_name: receiver_wallet.username.clone(),
            receiver_address: receiver_wallet.address.clone(),
        };
        let fund_challenge = self
            .challenge_leg(fund, &request, &sender_wallet, &path, &session_token)
            .await?;

        let fee = LegPlan {
            leg: LegKind::Fee,
            payload: route.payload(&self.settings.fee_address, &fee_amount),
            receiver_name: "fees".to_string(),
            receiver_address: self.settings.fee_address.clone(),
        };
        let fee_challenge = match self
            .challenge_leg(fee, &request, &sender_wallet, &path, &session_token)
            .await
        {
            Ok(challenge) => challenge,
            Err(e) => {
                self.roll_back(&fund_challenge);
                return Err(e);
            }
        };

        info!(
            user_id = %request.user_id,
            fund_challenge = %fund_challenge,
            fee_challenge = %fee_challenge,
            "Transfer initiated"
        );
        Ok(InitiatedTransfer {
            fund: fund_challenge,
            fee: fee_challenge,
        })
    }

    async fn challenge_leg(
        &self,
        plan: LegPlan,
        request: &TransferRequest,
        sender_wallet: &Wallet,
        path: &str,
        session_token: &str,
    ) -> Result<String, TransferError> {
        let action = UserActionRequest {
            user_action_payload: serde_json::to_string(&plan.payload)?,
            user_action_http_method: "POST".to_string(),
            user_action_http_path: path.to_string(),
        };
        let challenge = self
            .gateway
            .init_user_action(session_token, &action)
            .await?;

        let now = Utc::now();
        let record = InFlightTransfer {
            challenge: challenge.challenge.clone(),
            challenge_identifier: challenge.challenge_identifier,
            target_path: path.to_string(),
            session_token: session_token.to_string(),
            context: TransferContext {
                leg: plan.leg,
                request: request.clone(),
                payload: plan.payload,
                sender_wallet: sender_wallet.clone(),
                receiver_name: plan.receiver_name,
                receiver_address: plan.receiver_address,
                challenge_response: challenge.raw,
            },
            attempts: 0,
            claimed_at: None,
            created_at: now,
            expires_at: now + self.settings.challenge_ttl,
            deleted_at: None,
            tombstone_reason: None,
        };
        self.ledger.create_inflight(&record)?;

        info!(
            challenge = %record.challenge,
            leg = plan.leg.as_str(),
            expires_at = %record.expires_at,
            "Transfer leg challenged"
        );
        Ok(record.challenge)
    }

    fn roll_back(&self, challenge: &str) {
        match self
            .ledger
            .delete_inflight(challenge, TombstoneReason::RolledBack)
        {
            Ok(()) => warn!(challenge, "Fee leg failed; fund leg rolled back"),
            Err(e) => error!(challenge, error = %e, "Failed to roll back fund leg"),
        }
    }

    // =========================================================================
    // Finalize
    // =========================================================================

    /// Finalize each challenge independently with its signed credential.
    pub async fn finalize(
        &self,
        credentials: BTreeMap<String, SignedCredential>,
    ) -> Result<FinalizeReport, TransferError> {
        if credentials.is_empty() {
            return Err(TransferError::InvalidRequest(
                "no challenge credentials supplied".to_string(),
            ));
        }

        let mut report = FinalizeReport::default();
        for (challenge, credential) in credentials {
            match self.finalize_leg(&challenge, &credential).await {
                Ok((leg, tx, receipt)) => {
                    if receipt.is_some() {
                        report.receipt = receipt;
                    }
                    report.settled.push(SettledLeg {
                        challenge,
                        leg,
                        tx_hash: tx.tx_hash,
                        utr: tx.utr,
                    });
                }
                Err(e) => {
                    warn!(challenge = %challenge, error = %e, "Transfer leg not finalized");
                    report.failures.insert(challenge, e);
                }
            }
        }
        Ok(report)
    }

    async fn finalize_leg(
        &self,
        challenge: &str,
        credential: &SignedCredential,
    ) -> Result<(LegKind, UnconfirmedTransaction, Option<TransferReceipt>), TransferError> {
        let record = self
            .ledger
            .claim_inflight(challenge, Utc::now(), self.settings.claim_lease)
            .map_err(|e| match e {
                LedgerError::NotFound(_) => TransferError::ChallengeNotFound(challenge.to_string()),
                LedgerError::Expired(_) => TransferError::ChallengeExpired(challenge.to_string()),
                other => TransferError::Persistence(other),
            })?;

        // Nothing has left the building yet: release so the leg can be retried.
        let receipt = match self.sign_and_broadcast(&record, credential).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Err(release) = self.ledger.release_inflight(challenge) {
                    error!(challenge, error = %release, "Failed to release transfer claim");
                }
                return Err(e);
            }
        };

        let ctx = &record.context;
        if !receipt.request_body.to.is_empty() && receipt.request_body.to != ctx.payload.to() {
            warn!(
                challenge,
                expected = %ctx.payload.to(),
                actual = %receipt.request_body.to,
                "Broadcast destination differs from challenged payload"
            );
        }

        // The transfer is on its way; from here on the challenge must never be
        // replayed, even if recording it fails.
        let Some(primary_key) = receipt.correlation_key().map(str::to_string) else {
            self.consume_after_failure(challenge);
            return Err(TransferError::Gateway(
                crate::providers::GatewayError::InvalidResponse(
                    "broadcast response carries neither txHash nor id".to_string(),
                ),
            ));
        };

        let tx = UnconfirmedTransaction {
            tx_hash: primary_key,
            transfer_id: Some(receipt.id.clone()).filter(|id| !id.is_empty()),
            sender_name: ctx.sender_wallet.username.clone(),
            sender_address: ctx.sender_wallet.address.clone(),
            receiver_name: ctx.receiver_name.clone(),
            receiver_address: ctx.receiver_address.clone(),
            amount: ctx.leg_amount().to_string(),
            denom: ctx.request.denom.to_ascii_uppercase(),
            provider: PROVIDER_DFNS.to_string(),
            network: if receipt.network.is_empty() {
                ctx.sender_wallet.network.clone()
            } else {
                receipt.network.clone()
            },
            fee_type: ctx.leg == LegKind::Fee,
            status: if receipt.status.is_empty() {
                "Broadcasted".to_string()
            } else {
                receipt.status.clone()
            },
            utr: generate_utr(),
            retries: record.attempts.saturating_sub(1),
            metadata: receipt.raw.clone(),
            created_at: Utc::now(),
        };

        let parked = match self.ledger.record_broadcast(challenge, &tx) {
            Ok(parked) => parked,
            Err(e) => {
                error!(challenge, tx_hash = %tx.tx_hash, error = %e, "Broadcast succeeded but was not recorded");
                self.consume_after_failure(challenge);
                return Err(e.into());
            }
        };

        info!(
            challenge,
            tx_hash = %tx.tx_hash,
            utr = %tx.utr,
            leg = ctx.leg.as_str(),
            status = %tx.status,
            "Transfer leg broadcast"
        );

        if let Some(event) = parked {
            match self.reconciler.on_event(&event) {
                Ok(outcome) => info!(tx_hash = %tx.tx_hash, ?outcome, "Replayed parked custody event"),
                Err(e) => error!(tx_hash = %tx.tx_hash, error = %e, "Failed to replay parked custody event"),
            }
        }

        let receipt = (ctx.leg == LegKind::Fund).then(|| TransferReceipt {
            receiver_id: ctx.request.to_account.clone(),
            amount: ctx.request.amount.clone(),
            fee: ctx.request.fee.clone(),
            denom: tx.denom.clone(),
            utr: tx.utr.clone(),
            tx_hash: tx.tx_hash.clone(),
            network: tx.network.clone(),
            receiver_address: ctx.receiver_address.clone(),
        });

        Ok((ctx.leg, tx, receipt))
    }

    async fn sign_and_broadcast(
        &self,
        record: &InFlightTransfer,
        credential: &SignedCredential,
    ) -> Result<crate::providers::BroadcastReceipt, TransferError> {
        let user_action = self
            .gateway
            .sign_user_action(
                &record.session_token,
                &record.challenge_identifier,
                credential,
            )
            .await?;

        let payload: &TransferPayload = &record.context.payload;
        Ok(self
            .gateway
            .broadcast_transfer(
                &record.session_token,
                &user_action,
                &record.target_path,
                payload,
            )
            .await?)
    }

    fn consume_after_failure(&self, challenge: &str) {
        if let Err(e) = self
            .ledger
            .delete_inflight(challenge, TombstoneReason::Consumed)
        {
            error!(challenge, error = %e, "Failed to tombstone broadcast challenge");
        }
    }
}

struct LegPlan {
    leg: LegKind,
    payload: TransferPayload,
    receiver_name: String,
    receiver_address: String,
}

/// Reconciliation reference correlating a leg across its lifecycle.
fn generate_utr() -> String {
    format!("UTR-{}", uuid::Uuid::new_v4().simple()).to_ascii_uppercase()
}
