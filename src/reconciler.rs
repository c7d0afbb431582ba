// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Webhook Reconciler
//!
//! Turns terminal transfer events from the custody provider into
//! append-only [`TransactionLog`] entries.
//!
//! The move from `unconfirmed_transactions` to `transaction_logs` happens in
//! one ledger transaction, so duplicate deliveries of the same event produce
//! exactly one log row. Events correlate on the chain hash or the provider
//! transfer id, whichever matches. Events that arrive before finalize has
//! written the unconfirmed row are parked under both keys and replayed by the
//! coordinator.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::storage::{LedgerError, LedgerStore, LogStatus, Reconciliation, TransactionLog};

/// Header carrying `hex(HMAC-SHA256(secret, body))`.
pub const SIGNATURE_HEADER: &str = "x-dfns-webhook-signature";

const EVENT_PREFIX: &str = "wallet.transfer.";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Inbound provider event. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub data: WebhookData,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    #[serde(default)]
    pub transfer_request: Option<TransferEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Confirmed,
    Failed,
    Rejected,
    /// Non-terminal (`requested`, `broadcasted`) or unknown
    Other,
}

impl EventKind {
    /// Accepts both `wallet.transfer.confirmed` and `confirmed`.
    pub fn parse(kind: &str) -> Self {
        let kind = kind.trim();
        match kind.strip_prefix(EVENT_PREFIX).unwrap_or(kind) {
            "confirmed" => EventKind::Confirmed,
            "failed" => EventKind::Failed,
            "rejected" => EventKind::Rejected,
            _ => EventKind::Other,
        }
    }

    fn terminal_status(&self) -> Option<LogStatus> {
        match self {
            EventKind::Confirmed => Some(LogStatus::Confirmed),
            EventKind::Failed => Some(LogStatus::Failed),
            EventKind::Rejected => Some(LogStatus::Rejected),
            EventKind::Other => None,
        }
    }
}

/// What happened to one delivered event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Reconciled(TransactionLog),
    /// A log entry already exists for this transaction
    Duplicate,
    /// No matching transaction yet; stored for replay
    Parked,
    Ignored,
    Invalid(String),
}

impl WebhookEvent {
    fn chain_hash(&self) -> Option<&str> {
        self.data
            .transfer_request
            .as_ref()
            .and_then(|t| t.tx_hash.as_deref())
            .filter(|s| !s.is_empty())
    }

    fn transfer_id(&self) -> Option<&str> {
        self.data
            .transfer_request
            .as_ref()
            .and_then(|t| t.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Correlation keys, chain hash first.
    fn correlation_keys(&self) -> Vec<&str> {
        self.chain_hash().into_iter().chain(self.transfer_id()).collect()
    }

    fn failure_reason(&self, kind: EventKind) -> Option<String> {
        if kind == EventKind::Confirmed {
            return None;
        }
        let from_transfer = self
            .data
            .transfer_request
            .as_ref()
            .and_then(|t| t.reason.clone());
        let from_error = self.error.as_ref().map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        from_transfer
            .or(from_error)
            .or_else(|| Some(format!("transfer {}", self.kind)))
    }
}

#[derive(Clone)]
pub struct Reconciler {
    ledger: Arc<LedgerStore>,
}

impl Reconciler {
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Process one raw event body.
    pub fn on_event(&self, raw: &Value) -> Result<ReconcileOutcome, ReconcileError> {
        let event: WebhookEvent = match serde_json::from_value(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Discarding malformed custody webhook");
                return Ok(ReconcileOutcome::Invalid(e.to_string()));
            }
        };

        let kind = EventKind::parse(&event.kind);
        let Some(status) = kind.terminal_status() else {
            debug!(kind = %event.kind, "Ignoring non-terminal custody event");
            return Ok(ReconcileOutcome::Ignored);
        };

        let keys = event.correlation_keys();
        let Some(primary) = keys.first().copied() else {
            warn!(kind = %event.kind, "Custody webhook carries no transaction hash");
            return Ok(ReconcileOutcome::Invalid("missing txHash".to_string()));
        };

        let failure_reason = event.failure_reason(kind);
        let build = |tx: &crate::storage::UnconfirmedTransaction| {
            let mut log =
                TransactionLog::from_unconfirmed(tx, status, failure_reason.clone(), raw.clone());
            // The event knows the chain hash even when the broadcast did not
            if let Some(hash) = event.chain_hash() {
                log.tx_hash = Some(hash.to_string());
            }
            if log.transfer_id.is_none() {
                log.transfer_id = event.transfer_id().map(str::to_string);
            }
            log
        };

        match self.ledger.reconcile(&keys, Some(raw), build)? {
            Reconciliation::Reconciled(log) => Ok(self.reconciled(log)),
            Reconciliation::AlreadyLogged => Ok(self.duplicate(primary)),
            Reconciliation::Missing { .. } => {
                info!(
                    tx_hash = ?event.chain_hash(),
                    transfer_id = ?event.transfer_id(),
                    kind = %event.kind,
                    "No unconfirmed transaction yet; parked event for replay"
                );
                Ok(ReconcileOutcome::Parked)
            }
        }
    }

    fn reconciled(&self, log: TransactionLog) -> ReconcileOutcome {
        info!(
            tx_hash = ?log.tx_hash,
            transfer_id = ?log.transfer_id,
            utr = %log.utr,
            status = log.status.as_str(),
            fee = log.fee_type,
            "Transaction reconciled"
        );
        ReconcileOutcome::Reconciled(log)
    }

    fn duplicate(&self, key: &str) -> ReconcileOutcome {
        debug!(tx_hash = %key, "Duplicate custody webhook discarded");
        ReconcileOutcome::Duplicate
    }
}

/// Check a webhook signature header against the raw body.
///
/// The header is hex, optionally prefixed with `sha256=`.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let hex_digest = header.trim();
    let hex_digest = hex_digest.strip_prefix("sha256=").unwrap_or(hex_digest);
    let Ok(expected) = alloy::hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TombstoneReason;
    use crate::testing::{sample_inflight, sample_unconfirmed};
    use serde_json::json;

    fn setup() -> (Reconciler, Arc<LedgerStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerStore::open(&dir.path().join("ledger.redb")).unwrap());
        (Reconciler::new(ledger.clone()), ledger, dir)
    }

    fn event(kind: &str, tx_hash: &str) -> Value {
        json!({
            "id": "wh-1",
            "kind": kind,
            "data": { "transferRequest": { "id": "xfr-1", "txHash": tx_hash, "status": "Confirmed" } }
        })
    }

    #[test]
    fn parses_kinds_with_and_without_prefix() {
        assert_eq!(EventKind::parse("wallet.transfer.confirmed"), EventKind::Confirmed);
        assert_eq!(EventKind::parse("failed"), EventKind::Failed);
        assert_eq!(EventKind::parse("wallet.transfer.rejected"), EventKind::Rejected);
        assert_eq!(EventKind::parse("wallet.transfer.broadcasted"), EventKind::Other);
    }

    #[test]
    fn duplicate_delivery_logs_once() {
        let (reconciler, ledger, _dir) = setup();
        ledger
            .create_unconfirmed(&sample_unconfirmed("0xhash", false))
            .unwrap();

        let confirmed = event("wallet.transfer.confirmed", "0xhash");
        let first = reconciler.on_event(&confirmed).unwrap();
        let ReconcileOutcome::Reconciled(log) = first else {
            panic!("expected reconciliation, got {first:?}");
        };
        assert_eq!(log.status, LogStatus::Confirmed);
        assert_eq!(log.failure_reason, None);
        assert_eq!(log.metadata, confirmed);

        assert_eq!(
            reconciler.on_event(&confirmed).unwrap(),
            ReconcileOutcome::Duplicate
        );
        assert_eq!(ledger.find_logs_by_tx_hash("0xhash").unwrap().len(), 1);
        assert_eq!(ledger.unconfirmed_count().unwrap(), 0);
    }

    #[test]
    fn failure_events_carry_reason() {
        let (reconciler, ledger, _dir) = setup();
        ledger
            .create_unconfirmed(&sample_unconfirmed("0xfail", true))
            .unwrap();

        let raw = json!({
            "kind": "failed",
            "data": { "transferRequest": { "txHash": "0xfail", "status": "Failed", "reason": "insufficient funds" } }
        });
        let ReconcileOutcome::Reconciled(log) = reconciler.on_event(&raw).unwrap() else {
            panic!("expected reconciliation");
        };
        assert_eq!(log.status, LogStatus::Failed);
        assert!(log.fee_type);
        assert_eq!(log.failure_reason.as_deref(), Some("insufficient funds"));
    }

    #[test]
    fn non_terminal_and_malformed_events_are_not_logged() {
        let (reconciler, ledger, _dir) = setup();
        ledger
            .create_unconfirmed(&sample_unconfirmed("0xhash", false))
            .unwrap();

        assert_eq!(
            reconciler
                .on_event(&event("wallet.transfer.broadcasted", "0xhash"))
                .unwrap(),
            ReconcileOutcome::Ignored
        );
        assert!(matches!(
            reconciler.on_event(&json!({"kind": "confirmed", "data": {}})).unwrap(),
            ReconcileOutcome::Invalid(_)
        ));
        assert!(matches!(
            reconciler.on_event(&json!({"kind": 7})).unwrap(),
            ReconcileOutcome::Invalid(_)
        ));
        assert!(ledger.find_unconfirmed("0xhash").unwrap().is_some());
    }

    #[test]
    fn early_event_is_parked_then_handed_to_broadcast() {
        let (reconciler, ledger, _dir) = setup();
        let raw = event("confirmed", "0xearly");
        assert_eq!(reconciler.on_event(&raw).unwrap(), ReconcileOutcome::Parked);

        ledger
            .create_inflight(&sample_inflight(
                "ch-1",
                chrono::Utc::now() + chrono::Duration::minutes(5),
            ))
            .unwrap();
        let parked = ledger
            .record_broadcast("ch-1", &sample_unconfirmed("0xearly", false))
            .unwrap()
            .unwrap();
        assert_eq!(
            ledger.find_inflight_any("ch-1").unwrap().unwrap().tombstone_reason,
            Some(TombstoneReason::Consumed)
        );

        assert!(matches!(
            reconciler.on_event(&parked).unwrap(),
            ReconcileOutcome::Reconciled(_)
        ));
        assert_eq!(ledger.unconfirmed_count().unwrap(), 0);
    }

    #[test]
    fn falls_back_to_provider_transfer_id() {
        let (reconciler, ledger, _dir) = setup();
        let mut tx = sample_unconfirmed("xfr-1", false);
        tx.transfer_id = Some("xfr-1".to_string());
        ledger.create_unconfirmed(&tx).unwrap();

        let outcome = reconciler
            .on_event(&event("confirmed", "0xlatehash"))
            .unwrap();
        let ReconcileOutcome::Reconciled(log) = outcome else {
            panic!("expected reconciliation, got {outcome:?}");
        };
        // The chain hash from the event is recorded, not the transfer id
        assert_eq!(log.tx_hash.as_deref(), Some("0xlatehash"));
        assert_eq!(log.transfer_id.as_deref(), Some("xfr-1"));
        assert_eq!(ledger.find_logs_by_tx_hash("0xlatehash").unwrap().len(), 1);
        assert_eq!(ledger.find_logs_by_tx_hash("xfr-1").unwrap().len(), 1);
    }

    #[test]
    fn event_parked_before_hashless_broadcast_is_replayed() {
        let (reconciler, ledger, _dir) = setup();
        let raw = event("confirmed", "0xchain");
        assert_eq!(reconciler.on_event(&raw).unwrap(), ReconcileOutcome::Parked);

        // Broadcast response without a hash: the row is keyed by transfer id
        let mut tx = sample_unconfirmed("xfr-1", false);
        tx.transfer_id = Some("xfr-1".to_string());
        ledger
            .create_inflight(&sample_inflight(
                "ch-1",
                chrono::Utc::now() + chrono::Duration::minutes(5),
            ))
            .unwrap();
        let parked = ledger.record_broadcast("ch-1", &tx).unwrap().unwrap();

        let outcome = reconciler.on_event(&parked).unwrap();
        let ReconcileOutcome::Reconciled(log) = outcome else {
            panic!("expected reconciliation, got {outcome:?}");
        };
        assert_eq!(log.tx_hash.as_deref(), Some("0xchain"));
        assert_eq!(ledger.unconfirmed_count().unwrap(), 0);
        assert_eq!(
            reconciler.on_event(&raw).unwrap(),
            ReconcileOutcome::Duplicate
        );
    }

    #[test]
    fn rejected_event_logs_rejected_status() {
        let (reconciler, ledger, _dir) = setup();
        ledger
            .create_unconfirmed(&sample_unconfirmed("0xrej", false))
            .unwrap();

        let raw = json!({
            "kind": "wallet.transfer.rejected",
            "data": { "transferRequest": { "id": "xfr-7", "txHash": "0xrej", "status": "Rejected" } },
            "error": { "code": "policy_denied" }
        });
        let ReconcileOutcome::Reconciled(log) = reconciler.on_event(&raw).unwrap() else {
            panic!("expected reconciliation");
        };
        assert_eq!(log.status, LogStatus::Rejected);
        assert_eq!(
            log.failure_reason.as_deref(),
            Some(r#"{"code":"policy_denied"}"#)
        );
        assert_eq!(ledger.unconfirmed_count().unwrap(), 0);

        let stored = ledger.find_logs_by_tx_hash("0xrej").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, LogStatus::Rejected);
    }

    #[test]
    fn failed_event_without_reason_gets_default() {
        let (reconciler, ledger, _dir) = setup();
        ledger
            .create_unconfirmed(&sample_unconfirmed("0xf", false))
            .unwrap();

        let ReconcileOutcome::Reconciled(log) = reconciler
            .on_event(&event("wallet.transfer.failed", "0xf"))
            .unwrap()
        else {
            panic!("expected reconciliation");
        };
        assert_eq!(log.status, LogStatus::Failed);
        assert_eq!(
            log.failure_reason.as_deref(),
            Some("transfer wallet.transfer.failed")
        );
    }

    #[test]
    fn verifies_hmac_signatures() {
        let body = br#"{"kind":"confirmed"}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec").unwrap();
        mac.update(body);
        let signature = alloy::hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature("whsec", body, &signature));
        assert!(verify_signature("whsec", body, &format!("sha256={signature}")));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("whsec", b"{}", &signature));
        assert!(!verify_signature("whsec", body, "not-hex"));
    }
}
