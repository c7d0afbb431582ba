// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage
//!
//! Durable state for users, wallets and the transfer saga, kept in a single
//! embedded redb file under `DATA_DIR`.
//!
//! ## Record lifecycle
//!
//! ```text
//! initiate  ──► InFlightTransfer ──finalize──► UnconfirmedTransaction ──webhook──► TransactionLog
//!                     │                                                            (append-only)
//!                     └── tombstoned: consumed | expired | rolled_back
//! ```
//!
//! In-flight rows are soft-deleted so a consumed challenge stays visible for
//! audit until the retention sweep purges it.

pub mod ledger;
pub mod records;

pub use ledger::{LedgerError, LedgerResult, LedgerStore, Reconciliation};
pub use records::{
    InFlightTransfer, LogStatus, TombstoneReason, TransactionLog, UnconfirmedTransaction, User,
    Wallet,
};
