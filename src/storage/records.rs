// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Record types persisted by the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transfer::TransferContext;

/// Custodial identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// `us-` prefixed identifier
    pub id: String,
    /// Username, also the provider-side login name
    pub name: String,
    /// Custody provider identifier (e.g. `dfns`)
    pub provider: String,
    /// Set exactly once, on activation
    pub is_active: bool,
    /// Registration response issued by the provider, opaque here
    pub metadata: Value,
    /// Token returned on completed registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chain-specific custodial account. At most one per (user, provider, network).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// `wa-` prefixed identifier
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub provider: String,
    pub network: String,
    pub name: String,
    pub address: String,
    pub is_active: bool,
    /// Wallet creation response from the provider; carries the provider wallet id
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Provider-side wallet id, needed to build transfer paths.
    pub fn provider_wallet_id(&self) -> Option<&str> {
        self.metadata.get("id").and_then(Value::as_str)
    }
}

/// Why an in-flight row was soft-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstoneReason {
    /// Broadcast succeeded; the challenge can no longer be replayed
    Consumed,
    /// TTL elapsed before finalize
    Expired,
    /// Sibling leg failed during initiate
    RolledBack,
}

/// A transfer leg that has been challenged but not yet broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InFlightTransfer {
    /// Challenge issued by the provider (primary key)
    pub challenge: String,
    /// Correlation token the signing call must echo back
    pub challenge_identifier: String,
    /// Path the eventual broadcast must hit
    pub target_path: String,
    /// Session token obtained at initiate; used for signing and broadcast
    pub session_token: String,
    pub context: TransferContext,
    /// Finalize attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Set while a finalize call owns this row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstone_reason: Option<TombstoneReason>,
}

impl InFlightTransfer {
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn tombstone(&mut self, reason: TombstoneReason, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.tombstone_reason = Some(reason);
        self.claimed_at = None;
    }
}

/// A broadcast transfer leg awaiting its terminal webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnconfirmedTransaction {
    /// Primary key: the chain transaction hash, or the provider transfer id
    /// when the broadcast response carried no hash
    pub tx_hash: String,
    /// Provider transfer id; webhooks may correlate on it instead of the hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    pub sender_name: String,
    pub sender_address: String,
    pub receiver_name: String,
    pub receiver_address: String,
    pub amount: String,
    pub denom: String,
    pub provider: String,
    pub network: String,
    /// `true` for the fee leg
    pub fee_type: bool,
    /// Status reported by the broadcast response (typically `Broadcasted`)
    pub status: String,
    pub utr: String,
    #[serde(default)]
    pub retries: u32,
    /// Full broadcast response
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl UnconfirmedTransaction {
    /// The chain hash, if the primary key is one.
    pub fn chain_hash(&self) -> Option<&str> {
        match self.transfer_id.as_deref() {
            Some(id) if id == self.tx_hash => None,
            _ => Some(self.tx_hash.as_str()),
        }
    }

    /// Every key a webhook event may use to refer to this transaction.
    pub fn correlation_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.tx_hash.as_str()];
        if let Some(id) = self.transfer_id.as_deref() {
            if !id.is_empty() && id != self.tx_hash {
                keys.push(id);
            }
        }
        keys
    }
}

/// Terminal status of a transaction log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Confirmed,
    Failed,
    Rejected,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Confirmed => "confirmed",
            LogStatus::Failed => "failed",
            LogStatus::Rejected => "rejected",
        }
    }
}

/// Append-only audit record of a completed transfer leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub id: String,
    pub sender_name: String,
    pub sender_address: String,
    pub receiver_name: String,
    pub receiver_address: String,
    pub amount: String,
    pub denom: String,
    pub provider: String,
    pub network: String,
    pub fee_type: bool,
    pub status: LogStatus,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Chain transaction hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Provider transfer id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    pub utr: String,
    /// Raw provider event, kept for audit
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TransactionLog {
    /// Build the terminal entry for a reconciled leg.
    pub fn from_unconfirmed(
        tx: &UnconfirmedTransaction,
        status: LogStatus,
        failure_reason: Option<String>,
        metadata: Value,
    ) -> Self {
        Self {
            id: format!("tx-{}", uuid::Uuid::new_v4()),
            sender_name: tx.sender_name.clone(),
            sender_address: tx.sender_address.clone(),
            receiver_name: tx.receiver_name.clone(),
            receiver_address: tx.receiver_address.clone(),
            amount: tx.amount.clone(),
            denom: tx.denom.clone(),
            provider: tx.provider.clone(),
            network: tx.network.clone(),
            fee_type: tx.fee_type,
            status,
            retries: tx.retries,
            failure_reason,
            tx_hash: tx.chain_hash().map(str::to_string),
            transfer_id: tx.transfer_id.clone(),
            utr: tx.utr.clone(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Keys the entry is indexed under.
    pub fn correlation_keys(&self) -> Vec<&str> {
        self.tx_hash
            .as_deref()
            .into_iter()
            .chain(self.transfer_id.as_deref())
            .filter(|k| !k.is_empty())
            .collect()
    }
}
