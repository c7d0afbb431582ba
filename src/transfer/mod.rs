// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Asset-transfer saga: challenge, broadcast, and expiry of transfer legs.

mod context;
mod coordinator;
mod error;
mod sweeper;

pub use context::{AssetRoute, LegKind, NetworkFamily, TransferContext, TransferRequest};
pub use coordinator::{
    FinalizeReport, InitiatedTransfer, SettledLeg, TransferCoordinator, TransferReceipt,
};
pub use error::TransferError;
pub use sweeper::ExpirySweeper;
