// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed state carried from initiate to finalize.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::amount::AmountError;
use crate::providers::TransferPayload;
use crate::storage::Wallet;

/// Which of the two sub-transfers a leg is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegKind {
    Fund,
    Fee,
}

impl LegKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegKind::Fund => "fund",
            LegKind::Fee => "fee",
        }
    }
}

/// Caller's transfer request, stored verbatim with each leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Sender user id
    pub user_id: String,
    /// Recipient username
    pub to_account: String,
    /// Decimal amount, e.g. `"10.0"`
    pub amount: String,
    /// Decimal fee in the same denomination
    pub fee: String,
    /// Asset symbol, e.g. `USDC`
    pub denom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Everything finalize needs to broadcast a leg and record it, without
/// further lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferContext {
    pub leg: LegKind,
    pub request: TransferRequest,
    /// Chain payload, amount already in the smallest unit
    pub payload: TransferPayload,
    /// Sender wallet as it was at initiate
    pub sender_wallet: Wallet,
    pub receiver_name: String,
    pub receiver_address: String,
    /// Provider challenge response, kept for audit
    pub challenge_response: Value,
}

impl TransferContext {
    /// Human-readable amount this leg moves.
    pub fn leg_amount(&self) -> &str {
        match self.leg {
            LegKind::Fund => &self.request.amount,
            LegKind::Fee => &self.request.fee,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFamily {
    /// Token transfers name a mint and may need an associated account
    Solana,
    /// Token transfers name a contract address
    Evm,
}

impl NetworkFamily {
    pub fn of(network: &str) -> Option<Self> {
        const EVM_PREFIXES: [&str; 8] = [
            "Ethereum", "Polygon", "Base", "Arbitrum", "Optimism", "Avalanche", "Bsc", "Berachain",
        ];
        if network.starts_with("Solana") {
            Some(NetworkFamily::Solana)
        } else if EVM_PREFIXES.iter().any(|p| network.starts_with(p)) {
            Some(NetworkFamily::Evm)
        } else {
            None
        }
    }

    fn native_asset(&self, network: &str) -> &'static str {
        match self {
            NetworkFamily::Solana => "SOL",
            NetworkFamily::Evm if network.starts_with("Ethereum") => "ETH",
            NetworkFamily::Evm if network.starts_with("Polygon") => "POL",
            NetworkFamily::Evm if network.starts_with("Avalanche") => "AVAX",
            NetworkFamily::Evm if network.starts_with("Bsc") => "BNB",
            NetworkFamily::Evm if network.starts_with("Berachain") => "BERA",
            // L2 rollups settle gas in ETH
            NetworkFamily::Evm => "ETH",
        }
    }
}

/// How an asset is moved on the primary network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRoute {
    Native,
    Erc20 { contract: String },
    Spl { mint: String },
}

impl AssetRoute {
    /// Resolve the route for `denom` on `network`; unknown tokens fail before
    /// any provider call is made.
    pub fn resolve(
        network: &str,
        denom: &str,
        contracts: &HashMap<String, String>,
    ) -> Result<Self, AmountError> {
        let symbol = denom.trim().to_ascii_uppercase();
        let family = NetworkFamily::of(network)
            .ok_or_else(|| AmountError::UnsupportedAsset(format!("{symbol} on {network}")))?;

        if family.native_asset(network) == symbol {
            return Ok(AssetRoute::Native);
        }
        let address = contracts
            .get(&symbol)
            .cloned()
            .ok_or_else(|| AmountError::UnsupportedAsset(format!("{symbol} on {network}")))?;

        Ok(match family {
            NetworkFamily::Solana => AssetRoute::Spl { mint: address },
            NetworkFamily::Evm => AssetRoute::Erc20 { contract: address },
        })
    }

    pub fn payload(&self, to: &str, amount: &str) -> TransferPayload {
        let to = to.to_string();
        let amount = amount.to_string();
        match self {
            AssetRoute::Native => TransferPayload::Native { to, amount },
            AssetRoute::Erc20 { contract } => TransferPayload::Erc20 {
                contract: contract.clone(),
                to,
                amount,
            },
            AssetRoute::Spl { mint } => TransferPayload::Spl {
                mint: mint.clone(),
                to,
                amount,
                create_destination_account: true,
            },
        }
    }
}
