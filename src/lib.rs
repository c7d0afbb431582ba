// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fortis Wallet - Custodial Transfer Service
//!
//! Moves user funds through an external custody provider using a two-phase
//! challenge/sign protocol, and reconciles final on-chain outcomes delivered
//! by provider webhooks into an append-only transaction log.
//!
//! ## Modules
//!
//! - `amount` - Decimal amount to smallest-unit conversion
//! - `api` - HTTP API handlers (Axum)
//! - `onboarding` - User registration and wallet provisioning
//! - `providers` - Custody provider client (DFNS)
//! - `reconciler` - Webhook event reconciliation
//! - `storage` - Ledger on an embedded redb database
//! - `transfer` - Transfer saga coordinator and expiry sweeper

pub mod amount;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod onboarding;
pub mod providers;
pub mod reconciler;
pub mod state;
pub mod storage;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;
