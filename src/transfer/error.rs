// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::amount::AmountError;
use crate::providers::GatewayError;
use crate::storage::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("user {0} is not activated")]
    UserInactive(String),

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// Already consumed, never issued, or currently being finalized
    #[error("challenge {0} not found")]
    ChallengeNotFound(String),

    #[error("challenge {0} has expired")]
    ChallengeExpired(String),

    #[error("{0}")]
    Validation(#[from] AmountError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("ledger error: {0}")]
    Persistence(#[from] LedgerError),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

