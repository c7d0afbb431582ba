// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → User
//! - `usernames`: username → user_id (usernames are unique)
//! - `wallets`: `user_id|provider|network` → Wallet (enforces one wallet per triple)
//! - `wallet_name_index`: `username|provider|network` → wallets key
//! - `inflight_transfers`: challenge → InFlightTransfer (soft-deleted)
//! - `unconfirmed_transactions`: tx_hash → UnconfirmedTransaction
//! - `unconfirmed_aliases`: provider transfer id → tx_hash, when they differ
//! - `transaction_logs`: log_id → TransactionLog (append-only)
//! - `transaction_log_index`: `key|log_id` → "" for the chain hash and the
//!   provider transfer id of each entry
//! - `parked_events`: correlation key → ParkedEvent, one row per key the
//!   event carries
//!
//! redb serialises write transactions, so every read-check-write sequence
//! below runs inside a single write transaction and is atomic with respect
//! to concurrent callers.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::records::{
    InFlightTransfer, TombstoneReason, TransactionLog, UnconfirmedTransaction, User, Wallet,
};

// =============================================================================
// Table Definitions
// =============================================================================

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USERNAMES: TableDefinition<&str, &str> = TableDefinition::new("usernames");
const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
const WALLET_NAME_INDEX: TableDefinition<&str, &str> = TableDefinition::new("wallet_name_index");
const INFLIGHT: TableDefinition<&str, &[u8]> = TableDefinition::new("inflight_transfers");
const UNCONFIRMED: TableDefinition<&str, &[u8]> =
    TableDefinition::new("unconfirmed_transactions");
const UNCONFIRMED_ALIASES: TableDefinition<&str, &str> =
    TableDefinition::new("unconfirmed_aliases");
const TX_LOGS: TableDefinition<&str, &[u8]> = TableDefinition::new("transaction_logs");
const TX_LOG_INDEX: TableDefinition<&str, &str> = TableDefinition::new("transaction_log_index");
const PARKED_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("parked_events");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("expired: {0}")]
    Expired(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result of moving an unconfirmed transaction into the log.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The unconfirmed row was removed and this log entry appended
    Reconciled(TransactionLog),
    /// No unconfirmed row, but a log entry already exists for the hash
    AlreadyLogged,
    /// Neither row exists; the event was parked when one was supplied
    Missing { parked: bool },
}

/// Webhook event that arrived before its unconfirmed row existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParkedEvent {
    event: Value,
    /// Every key the event was parked under
    #[serde(default)]
    keys: Vec<String>,
    parked_at: DateTime<Utc>,
}

// =============================================================================
// Key Helpers
// =============================================================================

fn wallet_key(user_id: &str, provider: &str, network: &str) -> String {
    format!("{user_id}|{provider}|{network}")
}

fn log_index_key(tx_hash: &str, log_id: &str) -> String {
    format!("{tx_hash}|{log_id}")
}

/// `[prefix|, prefix})` covers every key starting with `prefix|`, since `}`
/// sorts directly after `|`.
fn prefix_bounds(prefix: &str) -> (String, String) {
    (format!("{prefix}|"), format!("{prefix}}}"))
}

fn read_record<T, R>(table: &R, key: &str) -> LedgerResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Resolve a correlation key (chain hash or provider transfer id) to the
/// primary key of its unconfirmed row.
fn resolve_unconfirmed<U, A>(table: &U, aliases: &A, key: &str) -> LedgerResult<Option<String>>
where
    U: ReadableTable<&'static str, &'static [u8]>,
    A: ReadableTable<&'static str, &'static str>,
{
    if table.get(key)?.is_some() {
        return Ok(Some(key.to_string()));
    }
    Ok(aliases.get(key)?.map(|v| v.value().to_string()))
}

fn insert_unconfirmed(
    write_txn: &redb::WriteTransaction,
    tx: &UnconfirmedTransaction,
) -> LedgerResult<()> {
    let json = serde_json::to_vec(tx)?;
    let mut table = write_txn.open_table(UNCONFIRMED)?;
    let mut aliases = write_txn.open_table(UNCONFIRMED_ALIASES)?;
    for key in tx.correlation_keys() {
        if resolve_unconfirmed(&table, &aliases, key)?.is_some() {
            return Err(LedgerError::AlreadyExists(format!("Transaction {key}")));
        }
    }
    table.insert(tx.tx_hash.as_str(), json.as_slice())?;
    for key in tx.correlation_keys().into_iter().skip(1) {
        aliases.insert(key, tx.tx_hash.as_str())?;
    }
    Ok(())
}

fn has_log_for<R>(index: &R, tx_hash: &str) -> LedgerResult<bool>
where
    R: ReadableTable<&'static str, &'static str>,
{
    let (start, end) = prefix_bounds(tx_hash);
    let mut range = index.range(start.as_str()..end.as_str())?;
    Ok(range.next().transpose()?.is_some())
}

// =============================================================================
// LedgerStore
// =============================================================================

/// Durable store for users, wallets and the transfer saga state.
pub struct LedgerStore {
    db: Database,
}

impl LedgerStore {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_NAME_INDEX)?;
            let _ = write_txn.open_table(INFLIGHT)?;
            let _ = write_txn.open_table(UNCONFIRMED)?;
            let _ = write_txn.open_table(UNCONFIRMED_ALIASES)?;
            let _ = write_txn.open_table(TX_LOGS)?;
            let _ = write_txn.open_table(TX_LOG_INDEX)?;
            let _ = write_txn.open_table(PARKED_EVENTS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Verify the database can serve a read transaction.
    pub fn health_check(&self) -> LedgerResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(INFLIGHT)?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user; fails if the id or the username is taken.
    pub fn create_user(&self, user: &User) -> LedgerResult<()> {
        let json = serde_json::to_vec(user)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            if table.get(user.id.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!("User {}", user.id)));
            }
            let mut usernames = write_txn.open_table(USERNAMES)?;
            if usernames.get(user.name.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!("Username {}", user.name)));
            }
            table.insert(user.id.as_str(), json.as_slice())?;
            usernames.insert(user.name.as_str(), user.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn update_user(&self, user: &User) -> LedgerResult<()> {
        let json = serde_json::to_vec(user)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            let existing: User = read_record(&table, user.id.as_str())?
                .ok_or_else(|| LedgerError::NotFound(format!("User {}", user.id)))?;
            if existing.name != user.name {
                return Err(LedgerError::AlreadyExists(format!(
                    "Username change for {}",
                    user.id
                )));
            }
            table.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn find_user(&self, user_id: &str) -> LedgerResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        read_record(&table, user_id)
    }

    pub fn find_user_by_username(&self, username: &str) -> LedgerResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let usernames = read_txn.open_table(USERNAMES)?;
        let user_id = match usernames.get(username)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(USERS)?;
        read_record(&table, &user_id)
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Insert a wallet; fails if the (user, provider, network) triple or the
    /// (username, provider, network) index entry is taken.
    pub fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<()> {
        let key = wallet_key(&wallet.user_id, &wallet.provider, &wallet.network);
        let name_key = wallet_key(&wallet.username, &wallet.provider, &wallet.network);
        let json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(key.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!("Wallet {key}")));
            }
            table.insert(key.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(WALLET_NAME_INDEX)?;
            if index.get(name_key.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!("Wallet {name_key}")));
            }
            index.insert(name_key.as_str(), key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn find_wallet(
        &self,
        user_id: &str,
        provider: &str,
        network: &str,
    ) -> LedgerResult<Option<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        read_record(&table, &wallet_key(user_id, provider, network))
    }

    /// Look up a wallet by its owner's username.
    pub fn find_wallet_by_username(
        &self,
        username: &str,
        provider: &str,
        network: &str,
    ) -> LedgerResult<Option<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(WALLET_NAME_INDEX)?;
        let key = match index.get(wallet_key(username, provider, network).as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(WALLETS)?;
        read_record(&table, &key)
    }

    pub fn list_wallets(&self, user_id: &str) -> LedgerResult<Vec<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        let (start, end) = prefix_bounds(user_id);

        let mut wallets = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            wallets.push(serde_json::from_slice(value.value())?);
        }
        Ok(wallets)
    }

    // =========================================================================
    // In-flight transfers
    // =========================================================================

    pub fn create_inflight(&self, record: &InFlightTransfer) -> LedgerResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(INFLIGHT)?;
            if table.get(record.challenge.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!(
                    "Challenge {}",
                    record.challenge
                )));
            }
            table.insert(record.challenge.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Find a live (not soft-deleted) in-flight transfer.
    pub fn find_inflight(&self, challenge: &str) -> LedgerResult<Option<InFlightTransfer>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INFLIGHT)?;
        let record: Option<InFlightTransfer> = read_record(&table, challenge)?;
        Ok(record.filter(|r| !r.is_tombstoned()))
    }

    /// Find an in-flight row including tombstones (audit view).
    pub fn find_inflight_any(&self, challenge: &str) -> LedgerResult<Option<InFlightTransfer>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INFLIGHT)?;
        read_record(&table, challenge)
    }

    /// Soft-delete an in-flight transfer.
    pub fn delete_inflight(&self, challenge: &str, reason: TombstoneReason) -> LedgerResult<()> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(INFLIGHT)?;
            let mut record: InFlightTransfer = read_record(&table, challenge)?
                .filter(|r: &InFlightTransfer| !r.is_tombstoned())
                .ok_or_else(|| LedgerError::NotFound(format!("Challenge {challenge}")))?;
            record.tombstone(reason, now);
            let json = serde_json::to_vec(&record)?;
            table.insert(challenge, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Take exclusive ownership of an in-flight transfer for one finalize
    /// attempt.
    ///
    /// Fails with `NotFound` when the row is absent, soft-deleted, or held by
    /// another caller whose lease has not elapsed; otherwise fails with
    /// `Expired` (and tombstones the row) once its TTL has passed.
    pub fn claim_inflight(
        &self,
        challenge: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> LedgerResult<InFlightTransfer> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(INFLIGHT)?;
            let mut record: InFlightTransfer = read_record(&table, challenge)?
                .filter(|r: &InFlightTransfer| !r.is_tombstoned())
                .ok_or_else(|| LedgerError::NotFound(format!("Challenge {challenge}")))?;

            // A live claim wins over expiry: its broadcast may be in progress.
            if record.claimed_at.is_some_and(|at| now - at < lease) {
                return Err(LedgerError::NotFound(format!(
                    "Challenge {challenge} is being finalized"
                )));
            } else if record.is_expired(now) {
                record.tombstone(TombstoneReason::Expired, now);
                let json = serde_json::to_vec(&record)?;
                table.insert(challenge, json.as_slice())?;
                Err(LedgerError::Expired(format!("Challenge {challenge}")))
            } else {
                record.claimed_at = Some(now);
                record.attempts += 1;
                let json = serde_json::to_vec(&record)?;
                table.insert(challenge, json.as_slice())?;
                Ok(record)
            }
        };
        write_txn.commit()?;
        outcome
    }

    /// Drop a claim after a failed attempt so the leg can be retried.
    pub fn release_inflight(&self, challenge: &str) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(INFLIGHT)?;
            let record: Option<InFlightTransfer> = read_record(&table, challenge)?;
            if let Some(mut record) = record.filter(|r| !r.is_tombstoned()) {
                record.claimed_at = None;
                let json = serde_json::to_vec(&record)?;
                table.insert(challenge, json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Persist a successful broadcast: insert the unconfirmed transaction and
    /// soft-delete the in-flight row in one transaction.
    ///
    /// A row the sweeper expired while the broadcast was running is still
    /// accepted; the broadcast has happened and must be recorded. Returns a
    /// webhook event parked under any of the transaction's keys, if one
    /// arrived early.
    pub fn record_broadcast(
        &self,
        challenge: &str,
        tx: &UnconfirmedTransaction,
    ) -> LedgerResult<Option<Value>> {
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        let parked = {
            insert_unconfirmed(&write_txn, tx)?;

            let mut inflight = write_txn.open_table(INFLIGHT)?;
            let mut record: InFlightTransfer = read_record(&inflight, challenge)?
                .filter(|r: &InFlightTransfer| {
                    !r.is_tombstoned() || r.tombstone_reason == Some(TombstoneReason::Expired)
                })
                .ok_or_else(|| LedgerError::NotFound(format!("Challenge {challenge}")))?;
            record.tombstone(TombstoneReason::Consumed, now);
            let json = serde_json::to_vec(&record)?;
            inflight.insert(challenge, json.as_slice())?;

            let mut parked_events = write_txn.open_table(PARKED_EVENTS)?;
            let mut found = None;
            for key in tx.correlation_keys() {
                if let Some(v) = parked_events.remove(key)? {
                    found = Some(serde_json::from_slice::<ParkedEvent>(v.value())?);
                    break;
                }
            }
            if let Some(parked) = &found {
                for key in &parked.keys {
                    parked_events.remove(key.as_str())?;
                }
            }
            found.map(|p| p.event)
        };
        write_txn.commit()?;
        Ok(parked)
    }

    /// Soft-delete every live in-flight row whose TTL has elapsed.
    ///
    /// Rows claimed by a finalize call within `lease` are skipped: their
    /// broadcast may already be on its way.
    pub fn expire_inflight(&self, now: DateTime<Utc>, lease: Duration) -> LedgerResult<usize> {
        let write_txn = self.db.begin_write()?;
        let expired = {
            let mut table = write_txn.open_table(INFLIGHT)?;
            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let record: InFlightTransfer = serde_json::from_slice(value.value())?;
                let claimed = record.claimed_at.is_some_and(|at| now - at < lease);
                if !record.is_tombstoned() && record.is_expired(now) && !claimed {
                    expired.push(record);
                }
            }
            for mut record in expired.iter().cloned() {
                record.tombstone(TombstoneReason::Expired, now);
                let json = serde_json::to_vec(&record)?;
                table.insert(record.challenge.as_str(), json.as_slice())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(expired)
    }

    /// Physically remove tombstones and parked events older than `before`.
    pub fn purge_tombstones(&self, before: DateTime<Utc>) -> LedgerResult<usize> {
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut inflight = write_txn.open_table(INFLIGHT)?;
            let mut stale = Vec::new();
            for entry in inflight.iter()? {
                let (key, value) = entry?;
                let record: InFlightTransfer = serde_json::from_slice(value.value())?;
                if record.deleted_at.is_some_and(|at| at < before) {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                inflight.remove(key.as_str())?;
            }

            let mut parked_events = write_txn.open_table(PARKED_EVENTS)?;
            let mut stale_events = Vec::new();
            for entry in parked_events.iter()? {
                let (key, value) = entry?;
                let parked: ParkedEvent = serde_json::from_slice(value.value())?;
                if parked.parked_at < before {
                    stale_events.push(key.value().to_string());
                }
            }
            for key in &stale_events {
                parked_events.remove(key.as_str())?;
            }

            stale.len() + stale_events.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }

    /// Number of in-flight rows, tombstones included.
    pub fn inflight_row_count(&self) -> LedgerResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INFLIGHT)?;
        Ok(table.len()?)
    }

    // =========================================================================
    // Unconfirmed transactions
    // =========================================================================

    pub fn create_unconfirmed(&self, tx: &UnconfirmedTransaction) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        insert_unconfirmed(&write_txn, tx)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Find by chain hash or provider transfer id.
    pub fn find_unconfirmed(&self, key: &str) -> LedgerResult<Option<UnconfirmedTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UNCONFIRMED)?;
        let aliases = read_txn.open_table(UNCONFIRMED_ALIASES)?;
        match resolve_unconfirmed(&table, &aliases, key)? {
            Some(primary) => read_record(&table, &primary),
            None => Ok(None),
        }
    }

    /// Remove an unconfirmed transaction; returns whether a row was removed.
    pub fn delete_unconfirmed(&self, key: &str) -> LedgerResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(UNCONFIRMED)?;
            let mut aliases = write_txn.open_table(UNCONFIRMED_ALIASES)?;
            match resolve_unconfirmed(&table, &aliases, key)? {
                Some(primary) => {
                    let tx = table
                        .remove(primary.as_str())?
                        .map(|v| serde_json::from_slice::<UnconfirmedTransaction>(v.value()))
                        .transpose()?;
                    if let Some(tx) = &tx {
                        for alias in tx.correlation_keys() {
                            aliases.remove(alias)?;
                        }
                    }
                    tx.is_some()
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn unconfirmed_count(&self) -> LedgerResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UNCONFIRMED)?;
        Ok(table.len()?)
    }

    // =========================================================================
    // Transaction logs
    // =========================================================================

    /// Append a log entry. Entries are never updated afterwards.
    pub fn append_transaction_log(&self, log: &TransactionLog) -> LedgerResult<()> {
        let json = serde_json::to_vec(log)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TX_LOGS)?;
            if table.get(log.id.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!("Log {}", log.id)));
            }
            table.insert(log.id.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(TX_LOG_INDEX)?;
            for key in log.correlation_keys() {
                index.insert(log_index_key(key, &log.id).as_str(), "")?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Find log entries by chain hash or provider transfer id.
    pub fn find_logs_by_tx_hash(&self, tx_hash: &str) -> LedgerResult<Vec<TransactionLog>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TX_LOG_INDEX)?;
        let table = read_txn.open_table(TX_LOGS)?;
        let (start, end) = prefix_bounds(tx_hash);

        let mut logs = Vec::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let (key, _) = entry?;
            let Some((_, log_id)) = key.value().rsplit_once('|') else {
                continue;
            };
            if let Some(log) = read_record(&table, log_id)? {
                logs.push(log);
            }
        }
        Ok(logs)
    }

    /// Move an unconfirmed transaction into the log in one transaction.
    ///
    /// `keys` are every correlation key the event carries (chain hash and
    /// provider transfer id). The log entry is indexed under all of them.
    /// When no unconfirmed row exists and no log entry has been written yet,
    /// `park` (if given) is stored under each key for replay by
    /// [`record_broadcast`](Self::record_broadcast).
    pub fn reconcile<F>(
        &self,
        keys: &[&str],
        park: Option<&Value>,
        build_log: F,
    ) -> LedgerResult<Reconciliation>
    where
        F: FnOnce(&UnconfirmedTransaction) -> TransactionLog,
    {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut unconfirmed = write_txn.open_table(UNCONFIRMED)?;
            let mut aliases = write_txn.open_table(UNCONFIRMED_ALIASES)?;
            let mut taken = None;
            for key in keys {
                if let Some(primary) = resolve_unconfirmed(&unconfirmed, &aliases, key)? {
                    taken = unconfirmed
                        .remove(primary.as_str())?
                        .map(|v| serde_json::from_slice::<UnconfirmedTransaction>(v.value()))
                        .transpose()?;
                    break;
                }
            }

            let mut index = write_txn.open_table(TX_LOG_INDEX)?;
            match taken {
                Some(tx) => {
                    for alias in tx.correlation_keys() {
                        aliases.remove(alias)?;
                    }
                    let log = build_log(&tx);
                    let json = serde_json::to_vec(&log)?;
                    let mut logs = write_txn.open_table(TX_LOGS)?;
                    logs.insert(log.id.as_str(), json.as_slice())?;

                    let mut index_keys: Vec<&str> = log.correlation_keys();
                    index_keys.extend(tx.correlation_keys());
                    index_keys.extend(keys.iter().copied());
                    index_keys.sort_unstable();
                    index_keys.dedup();
                    for key in index_keys {
                        index.insert(log_index_key(key, &log.id).as_str(), "")?;
                    }
                    Reconciliation::Reconciled(log)
                }
                None => {
                    let mut logged = false;
                    for key in keys {
                        if has_log_for(&index, key)? {
                            logged = true;
                            break;
                        }
                    }
                    match park {
                        _ if logged => Reconciliation::AlreadyLogged,
                        Some(event) if !keys.is_empty() => {
                            let parked = ParkedEvent {
                                event: event.clone(),
                                keys: keys.iter().map(|k| k.to_string()).collect(),
                                parked_at: Utc::now(),
                            };
                            let json = serde_json::to_vec(&parked)?;
                            let mut parked_events = write_txn.open_table(PARKED_EVENTS)?;
                            for key in keys {
                                parked_events.insert(*key, json.as_slice())?;
                            }
                            Reconciliation::Missing { parked: true }
                        }
                        _ => Reconciliation::Missing { parked: false },
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================
