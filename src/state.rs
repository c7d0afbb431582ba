// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::TransferSettings;
use crate::onboarding::Onboarding;
use crate::providers::CustodyGateway;
use crate::reconciler::Reconciler;
use crate::storage::LedgerStore;
use crate::transfer::TransferCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub coordinator: Arc<TransferCoordinator>,
    pub onboarding: Arc<Onboarding>,
    pub reconciler: Reconciler,
    /// When set, inbound webhooks must carry a valid HMAC signature
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(
        ledger: Arc<LedgerStore>,
        gateway: Arc<dyn CustodyGateway>,
        settings: TransferSettings,
        wallet_networks: Vec<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            coordinator: Arc::new(TransferCoordinator::new(
                ledger.clone(),
                gateway.clone(),
                settings,
            )),
            onboarding: Arc::new(Onboarding::new(ledger.clone(), gateway, wallet_networks)),
            reconciler: Reconciler::new(ledger.clone()),
            ledger,
            webhook_secret,
        }
    }
}
