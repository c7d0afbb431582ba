// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Challenge Expiry Sweeper
//!
//! Background task that bounds the lifetime of abandoned challenges.
//!
//! Every `interval` the sweeper:
//! 1. Tombstones in-flight transfers whose TTL has elapsed (`expired`),
//!    except rows a finalize call has claimed within the claim lease.
//! 2. Purges tombstones and parked webhook events older than the retention.
//!
//! Finalize also checks expiry lazily, so the sweeper only affects storage
//! growth and observability, never correctness.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SweepConfig;
use crate::storage::LedgerStore;

pub struct ExpirySweeper {
    ledger: Arc<LedgerStore>,
    config: SweepConfig,
    claim_lease: Duration,
}

impl ExpirySweeper {
    /// `claim_lease` must match the coordinator's, so rows mid-broadcast are
    /// never expired underneath it.
    pub fn new(ledger: Arc<LedgerStore>, config: SweepConfig, claim_lease: Duration) -> Self {
        Self {
            ledger,
            config,
            claim_lease,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Challenge expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Challenge expiry sweeper shutting down");
                return;
            }

            self.sweep_step();

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Challenge expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep; returns `(expired, purged)`.
    pub fn sweep_step(&self) -> (usize, usize) {
        let now = Utc::now();

        let expired = match self.ledger.expire_inflight(now, self.claim_lease) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Sweeper: failed to expire challenges");
                0
            }
        };
        let purged = match self
            .ledger
            .purge_tombstones(now - self.config.tombstone_retention)
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Sweeper: failed to purge tombstones");
                0
            }
        };

        if expired > 0 || purged > 0 {
            info!(expired, purged, "Sweeper: ledger cleaned");
        } else {
            debug!("Sweeper: nothing to do");
        }
        (expired, purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_inflight;

    fn sweeper(retention: Duration) -> (ExpirySweeper, Arc<LedgerStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerStore::open(&dir.path().join("ledger.redb")).unwrap());
        let config = SweepConfig {
            interval: std::time::Duration::from_millis(10),
            tombstone_retention: retention,
        };
        (
            ExpirySweeper::new(ledger.clone(), config, Duration::seconds(60)),
            ledger,
            dir,
        )
    }

    #[test]
    fn expires_then_purges() {
        let (sweeper, ledger, _dir) = sweeper(Duration::seconds(-1));
        ledger
            .create_inflight(&sample_inflight("stale", Utc::now() - Duration::minutes(1)))
            .unwrap();
        ledger
            .create_inflight(&sample_inflight("live", Utc::now() + Duration::minutes(10)))
            .unwrap();

        // Negative retention purges a tombstone in the same sweep that wrote it
        assert_eq!(sweeper.sweep_step(), (1, 1));
        assert_eq!(sweeper.sweep_step(), (0, 0));
        assert!(ledger.find_inflight("live").unwrap().is_some());
        assert_eq!(ledger.inflight_row_count().unwrap(), 1);
    }

    #[test]
    fn claimed_rows_outlive_their_ttl_until_the_lease_ends() {
        let (sweeper, ledger, _dir) = sweeper(Duration::days(7));
        let now = Utc::now();
        // Claimed just before the TTL ran out
        let mut record = sample_inflight("busy", now - Duration::seconds(1));
        record.claimed_at = Some(now - Duration::seconds(2));
        ledger.create_inflight(&record).unwrap();

        assert_eq!(sweeper.sweep_step(), (0, 0));
        assert!(ledger.find_inflight("busy").unwrap().is_some());
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let (sweeper, _ledger, _dir) = sweeper(Duration::days(7));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
