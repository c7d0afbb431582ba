// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded once from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `ledger.redb` | `/data` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset |
//! | `DFNS_BASE_URL` | Custody provider API | `https://api.dfns.io` |
//! | `DFNS_APP_ID` | Custody application id | Required |
//! | `DFNS_AUTH_TOKEN` | Service account token | Required |
//! | `DFNS_WEBHOOK_URL` | Public URL to subscribe for transfer events | unset |
//! | `DFNS_WEBHOOK_SECRET` | Webhook HMAC secret | unset |
//! | `WALLET_NETWORKS` | Comma-separated networks provisioned per user | `Solana` |
//! | `PRIMARY_NETWORK` | Network used for transfers | first of `WALLET_NETWORKS` |
//! | `FEE_ADDRESS` | Fee recipient address | Required |
//! | `TOKEN_CONTRACTS` | `DENOM=address` pairs on the primary network | empty |
//! | `CHALLENGE_TTL_SECS` | In-flight challenge lifetime, 1s to 30 days | `900` |
//! | `CHALLENGE_LEASE_SECS` | Finalize claim lease, above two gateway timeouts | `60` |
//! | `SWEEP_INTERVAL_SECS` | Expiry sweeper period, 1s to 1 day | `60` |
//! | `TOMBSTONE_RETENTION_SECS` | Soft-deleted row retention, up to 1 year | `604800` |

use std::{collections::HashMap, ops::RangeInclusive, path::PathBuf};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const DFNS_BASE_URL_ENV: &str = "DFNS_BASE_URL";
pub const DFNS_APP_ID_ENV: &str = "DFNS_APP_ID";
pub const DFNS_AUTH_TOKEN_ENV: &str = "DFNS_AUTH_TOKEN";
pub const DFNS_WEBHOOK_URL_ENV: &str = "DFNS_WEBHOOK_URL";
pub const DFNS_WEBHOOK_SECRET_ENV: &str = "DFNS_WEBHOOK_SECRET";
pub const WALLET_NETWORKS_ENV: &str = "WALLET_NETWORKS";
pub const PRIMARY_NETWORK_ENV: &str = "PRIMARY_NETWORK";
pub const FEE_ADDRESS_ENV: &str = "FEE_ADDRESS";
pub const TOKEN_CONTRACTS_ENV: &str = "TOKEN_CONTRACTS";
pub const CHALLENGE_TTL_SECS_ENV: &str = "CHALLENGE_TTL_SECS";
pub const CHALLENGE_LEASE_SECS_ENV: &str = "CHALLENGE_LEASE_SECS";
pub const SWEEP_INTERVAL_SECS_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const TOMBSTONE_RETENTION_SECS_ENV: &str = "TOMBSTONE_RETENTION_SECS";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_DFNS_BASE_URL: &str = "https://api.dfns.io";
const DEFAULT_WALLET_NETWORKS: &str = "Solana";
const DEFAULT_CHALLENGE_TTL_SECS: i64 = 900;
const DEFAULT_CHALLENGE_LEASE_SECS: i64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: i64 = 60;
const DEFAULT_TOMBSTONE_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// Per-request timeout of the custody gateway client.
pub const GATEWAY_TIMEOUT_SECS: u64 = 15;

const DAY_SECS: i64 = 24 * 60 * 60;
const MAX_CHALLENGE_TTL_SECS: i64 = 30 * DAY_SECS;
/// A claim covers a sign call and a broadcast call, each up to the timeout.
const MIN_CHALLENGE_LEASE_SECS: i64 = 2 * GATEWAY_TIMEOUT_SECS as i64 + 1;
const MAX_CHALLENGE_LEASE_SECS: i64 = DAY_SECS;
const MAX_SWEEP_INTERVAL_SECS: i64 = DAY_SECS;
const MAX_TOMBSTONE_RETENTION_SECS: i64 = 365 * DAY_SECS;

/// Ledger file name inside `DATA_DIR`.
pub const LEDGER_FILE: &str = "ledger.redb";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `(cert, key)` PEM paths
    pub tls: Option<(PathBuf, PathBuf)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustodyConfig {
    pub base_url: String,
    pub app_id: String,
    pub auth_token: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

/// Settings the transfer coordinator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSettings {
    pub primary_network: String,
    pub fee_address: String,
    /// Upper-case denom → token contract / mint on the primary network
    pub token_contracts: HashMap<String, String>,
    pub challenge_ttl: chrono::Duration,
    pub claim_lease: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub interval: std::time::Duration,
    pub tombstone_retention: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub data_dir: PathBuf,
    pub custody: CustodyConfig,
    pub wallet_networks: Vec<String>,
    pub transfer: TransferSettings,
    pub sweep: SweepConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let tls = match (
            env.optional(TLS_CERT_PATH_ENV),
            env.optional(TLS_KEY_PATH_ENV),
        ) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        };

        let wallet_networks: Vec<String> = env
            .or_default(WALLET_NETWORKS_ENV, DEFAULT_WALLET_NETWORKS)
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        let primary_network = match env.optional(PRIMARY_NETWORK_ENV) {
            Some(network) => network,
            None => wallet_networks
                .first()
                .cloned()
                .ok_or(ConfigError::Invalid {
                    name: WALLET_NETWORKS_ENV,
                    reason: "no networks configured".to_string(),
                })?,
        };

        Ok(Self {
            server: ServerConfig {
                host: env.or_default(HOST_ENV, DEFAULT_HOST),
                port: env.parsed(PORT_ENV, DEFAULT_PORT)?,
                tls,
            },
            data_dir: PathBuf::from(env.or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            custody: CustodyConfig {
                base_url: env
                    .url(DFNS_BASE_URL_ENV)?
                    .unwrap_or_else(|| DEFAULT_DFNS_BASE_URL.to_string()),
                app_id: env.required(DFNS_APP_ID_ENV)?,
                auth_token: env.required(DFNS_AUTH_TOKEN_ENV)?,
                webhook_url: env.url(DFNS_WEBHOOK_URL_ENV)?,
                webhook_secret: env.optional(DFNS_WEBHOOK_SECRET_ENV),
            },
            wallet_networks,
            transfer: TransferSettings {
                primary_network,
                fee_address: env.required(FEE_ADDRESS_ENV)?,
                token_contracts: parse_token_contracts(
                    &env.optional(TOKEN_CONTRACTS_ENV).unwrap_or_default(),
                )?,
                challenge_ttl: chrono::Duration::seconds(env.seconds(
                    CHALLENGE_TTL_SECS_ENV,
                    DEFAULT_CHALLENGE_TTL_SECS,
                    1..=MAX_CHALLENGE_TTL_SECS,
                )?),
                claim_lease: chrono::Duration::seconds(env.seconds(
                    CHALLENGE_LEASE_SECS_ENV,
                    DEFAULT_CHALLENGE_LEASE_SECS,
                    MIN_CHALLENGE_LEASE_SECS..=MAX_CHALLENGE_LEASE_SECS,
                )?),
            },
            sweep: SweepConfig {
                interval: std::time::Duration::from_secs(env.seconds(
                    SWEEP_INTERVAL_SECS_ENV,
                    DEFAULT_SWEEP_INTERVAL_SECS,
                    1..=MAX_SWEEP_INTERVAL_SECS,
                )?
                .unsigned_abs()),
                tombstone_retention: chrono::Duration::seconds(env.seconds(
                    TOMBSTONE_RETENTION_SECS_ENV,
                    DEFAULT_TOMBSTONE_RETENTION_SECS,
                    0..=MAX_TOMBSTONE_RETENTION_SECS,
                )?),
            },
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    /// An optional absolute http(s) URL, without a trailing slash.
    fn url(&self, name: &'static str) -> Result<Option<String>, ConfigError> {
        let Some(raw) = self.optional(name) else {
            return Ok(None);
        };
        let parsed = url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name,
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        Ok(Some(raw.trim_end_matches('/').to_string()))
    }

    /// A whole number of seconds inside `range`.
    fn seconds(
        &self,
        name: &'static str,
        default: i64,
        range: RangeInclusive<i64>,
    ) -> Result<i64, ConfigError> {
        let value = self.parsed(name, default)?;
        if !range.contains(&value) {
            return Err(ConfigError::Invalid {
                name,
                reason: format!(
                    "{value} is outside {}..={} seconds",
                    range.start(),
                    range.end()
                ),
            });
        }
        Ok(value)
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

fn parse_token_contracts(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((denom, address)) if !denom.trim().is_empty() && !address.trim().is_empty() => {
                Ok((denom.trim().to_ascii_uppercase(), address.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                name: TOKEN_CONTRACTS_ENV,
                reason: format!("expected DENOM=address, got {pair:?}"),
            }),
        })
        .collect()
}
