//! Configuration file for the `booster` binary.

use crate::{chain, retry, signer::InfisicalSettings};
use alloy::primitives::Address;
use axum::http::HeaderValue;
use chrono::Utc;
use cron::Schedule;
use serde::Deserialize;
use std::{fs::File, net::SocketAddr, path::Path, str::FromStr, time::Duration};
use thiserror::Error;

/// Address of the BGT contract on Berachain mainnet.
pub const DEFAULT_CONTRACT: &str = "0x656b95E550C07a9ffe548bd4085c72418Ceb1dba";

/// Tick at the top of every fifth minute.
pub const DEFAULT_SCHEDULE: &str = "0 */5 * * * *";

/// Errors that can occur when loading a configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_contract() -> String {
    DEFAULT_CONTRACT.to_string()
}

fn default_gas_limit() -> u64 {
    150_000
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_store() -> String {
    "booster.json".to_string()
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    /// Execution-layer JSON-RPC endpoint.
    pub rpc_url: String,
    #[serde(default = "default_contract")]
    pub contract: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Cron expression with a leading seconds field (`sec min hour day month weekday [year]`).
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Path of the JSON store.
    #[serde(default = "default_store")]
    pub store: String,
    pub api: Option<Api>,
    pub signer: Signer,
    #[serde(default)]
    pub retry: retry::Policy,
    #[serde(default)]
    pub confirmation: Confirmation,
}

/// Admin API settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Api {
    pub listen: SocketAddr,
    /// Value expected in the `X-API-Key` header.
    pub key: String,
    /// Origins allowed to call the API from a browser. `*` allows any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Signing provider.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signer {
    Remote { url: String },
    Local(InfisicalSettings),
}

/// Receipt polling.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Confirmation {
    pub poll_ms: u64,
    pub timeout_secs: u64,
}

impl Default for Confirmation {
    fn default() -> Self {
        Self {
            poll_ms: 2_000,
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Reads and validates the YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_reader(File::open(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.rpc_url.trim().is_empty() {
            return Err(Error::Invalid("rpc_url is empty".into()));
        }
        self.contract_address()?;
        if self.gas_limit == 0 {
            return Err(Error::Invalid("gas_limit must be positive".into()));
        }
        let schedule = self.schedule()?;
        if schedule.upcoming(Utc).next().is_none() {
            return Err(Error::Invalid(format!(
                "schedule {} never fires again",
                self.schedule
            )));
        }
        if self.confirmation.poll_ms == 0 {
            return Err(Error::Invalid("confirmation.poll_ms must be positive".into()));
        }
        match &self.signer {
            Signer::Remote { url } if url.trim().is_empty() => {
                return Err(Error::Invalid("signer.url is empty".into()))
            }
            Signer::Local(settings) if settings.url.trim().is_empty() => {
                return Err(Error::Invalid("signer.url is empty".into()))
            }
            Signer::Local(settings) if settings.key_id.trim().is_empty() => {
                return Err(Error::Invalid("signer.key_id is empty".into()))
            }
            _ => {}
        }
        if let Some(api) = &self.api {
            if api.key.is_empty() {
                return Err(Error::Invalid("api.key is empty".into()));
            }
            for origin in api.cors_origins.iter().filter(|origin| *origin != "*") {
                HeaderValue::from_str(origin)
                    .map_err(|_| Error::Invalid(format!("invalid cors origin: {origin}")))?;
            }
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address, Error> {
        Address::from_str(&self.contract)
            .map_err(|_| Error::Invalid(format!("invalid contract address: {}", self.contract)))
    }

    pub fn schedule(&self) -> Result<Schedule, Error> {
        Schedule::from_str(&self.schedule)
            .map_err(|e| Error::Invalid(format!("invalid schedule {}: {e}", self.schedule)))
    }

    /// Settings for the chain gateway.
    pub fn gateway(&self) -> Result<chain::Config, Error> {
        Ok(chain::Config {
            contract: self.contract_address()?,
            gas_limit: self.gas_limit,
            policy: self.retry.clone(),
            poll_interval: Duration::from_millis(self.confirmation.poll_ms),
            confirmation_timeout: Duration::from_secs(self.confirmation.timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE: &str = r#"
rpc_url: http://localhost:8545
signer:
  kind: remote
  url: http://localhost:9000
"#;

    const LOCAL: &str = r#"
rpc_url: http://localhost:8545
contract: "0x00000000000000000000000000000000000000aa"
gas_limit: 200000
schedule: "30 0 * * * Mon-Fri"
store: /var/lib/booster/store.json
api:
  listen: 0.0.0.0:8080
  key: secret
  cors_origins:
    - https://dashboard.example
signer:
  kind: local
  url: https://app.infisical.com
  client_id: id
  client_secret: shh
  project_id: project
  environment: prod
  key_id: kms
retry:
  initial_ms: 100
  max_elapsed_secs: 60
confirmation:
  timeout_secs: 30
"#;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.contract, DEFAULT_CONTRACT);
        assert_eq!(config.gas_limit, 150_000);
        assert_eq!(config.schedule, DEFAULT_SCHEDULE);
        config.schedule().unwrap();
        assert_eq!(config.store, "booster.json");
        assert_eq!(config.api, None);
        assert_eq!(config.retry, retry::Policy::default());
        assert_eq!(config.confirmation, Confirmation::default());
        assert_eq!(
            config.signer,
            Signer::Remote {
                url: "http://localhost:9000".into()
            }
        );
    }

    #[test]
    fn test_full() {
        let config: Config = serde_yaml::from_str(LOCAL).unwrap();
        config.validate().unwrap();
        let gateway = config.gateway().unwrap();
        assert_eq!(gateway.contract, Address::with_last_byte(0xaa));
        assert_eq!(gateway.gas_limit, 200_000);
        assert_eq!(gateway.policy.initial_ms, 100);
        assert_eq!(gateway.policy.max_elapsed_secs, Some(60));
        assert_eq!(gateway.poll_interval, Duration::from_secs(2));
        assert_eq!(gateway.confirmation_timeout, Duration::from_secs(30));
        let schedule = config.schedule().unwrap();
        assert!(schedule
            .upcoming(Utc)
            .take(5)
            .all(|time| time.format("%M:%S").to_string() == "00:30"));
        let api = config.api.unwrap();
        assert_eq!(api.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(api.cors_origins, vec!["https://dashboard.example"]);
        let Signer::Local(settings) = config.signer else {
            panic!("expected local signer");
        };
        assert_eq!(settings.key_id, "kms");
        assert_eq!(settings.environment, "prod");
    }

    #[test]
    fn test_invalid() {
        let mut config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.contract = "0x1234".into();
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.schedule = "every five minutes".into();
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        // Five fields: the seconds field is required
        let mut config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.schedule = "*/5 * * * *".into();
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.schedule = "0 0 0 1 1 * 2020".into();
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config: Config = serde_yaml::from_str(LOCAL).unwrap();
        if let Some(api) = config.api.as_mut() {
            api.cors_origins = vec!["https://bad\norigin".into()];
        }
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.gas_limit = 0;
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let mut config: Config = serde_yaml::from_str(REMOTE).unwrap();
        config.signer = Signer::Remote { url: " ".into() };
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));

        let unknown = REMOTE.replace("kind: remote", "kind: hsm");
        assert!(serde_yaml::from_str::<Config>(&unknown).is_err());
    }
}
