// src/config.rs
//! Node configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional `ticketgate.toml` in the working directory, then `TICKETGATE_*`
//! environment variables (a `.env` file is loaded into the environment by
//! `main` before this runs).

use chrono::FixedOffset;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use ethers::types::Address;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "ticketgate";
const ENV_PREFIX: &str = "TICKETGATE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("`{key}` is not a valid address: {value}")]
    InvalidAddress { key: &'static str, value: String },

    #[error("`listen_addr` is not a socket address: {0}")]
    InvalidListenAddr(String),

    #[error("`event_utc_offset_minutes` out of range: {0}")]
    InvalidOffset(i32),

    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),
}

/// Runtime settings of the gate node.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the EVM chain.
    pub rpc_url: String,
    /// Chain the contracts live on; a different chain is reported as a warning.
    pub chain_id: u64,
    /// Deployed EventFactory contract.
    pub factory_address: String,
    /// Hex private key of the operator wallet. A throwaway key is generated when absent.
    pub private_key: Option<String>,
    pub listen_addr: String,
    /// Maximum age of a scanned credential.
    pub credential_window_ms: i64,
    /// Display period of each QR code.
    pub qr_refresh_secs: u64,
    /// Interval of the chain and account change poll.
    pub chain_poll_secs: u64,
    /// Offset from UTC in which event dates and times are written.
    pub event_utc_offset_minutes: i32,
    pub block_explorer_url: String,
}

// Keeps the private key out of logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("factory_address", &self.factory_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("listen_addr", &self.listen_addr)
            .field("credential_window_ms", &self.credential_window_ms)
            .field("qr_refresh_secs", &self.qr_refresh_secs)
            .field("chain_poll_secs", &self.chain_poll_secs)
            .field("event_utc_offset_minutes", &self.event_utc_offset_minutes)
            .field("block_explorer_url", &self.block_explorer_url)
            .finish()
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("rpc_url", "https://ethereum-sepolia-rpc.publicnode.com")?
        .set_default("chain_id", 11_155_111i64)?
        .set_default("listen_addr", "127.0.0.1:3000")?
        .set_default("credential_window_ms", 60_000i64)?
        .set_default("qr_refresh_secs", 30i64)?
        .set_default("chain_poll_secs", 4i64)?
        .set_default("event_utc_offset_minutes", 0i64)?
        .set_default("block_explorer_url", "https://sepolia.etherscan.io")
}

impl AppConfig {
    /// Loads defaults, `ticketgate.toml` and `TICKETGATE_*` variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a source cannot be read, a required key
    /// (`factory_address`) is missing, or a value does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.factory()?;
        self.listen_socket()?;
        self.event_offset()?;
        if self.credential_window_ms <= 0 {
            return Err(ConfigError::NotPositive("credential_window_ms"));
        }
        if self.qr_refresh_secs == 0 {
            return Err(ConfigError::NotPositive("qr_refresh_secs"));
        }
        if self.chain_poll_secs == 0 {
            return Err(ConfigError::NotPositive("chain_poll_secs"));
        }
        Ok(())
    }

    pub fn factory(&self) -> Result<Address, ConfigError> {
        self.factory_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                key: "factory_address",
                value: self.factory_address.clone(),
            })
    }

    pub fn listen_socket(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }

    pub fn event_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.event_utc_offset_minutes.saturating_mul(60))
            .ok_or(ConfigError::InvalidOffset(self.event_utc_offset_minutes))
    }

    pub fn qr_refresh(&self) -> Duration {
        Duration::from_secs(self.qr_refresh_secs)
    }

    pub fn chain_poll(&self) -> Duration {
        Duration::from_secs(self.chain_poll_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const FACTORY: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn from_toml(text: &str) -> Result<AppConfig, ConfigError> {
        AppConfig::build(defaults().unwrap().add_source(File::from_str(text, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults_apply() {
        let config = from_toml(&format!("factory_address = \"{}\"", FACTORY)).unwrap();

        assert_eq!(config.chain_id, 11_155_111);
        assert_eq!(config.credential_window_ms, 60_000);
        assert_eq!(config.qr_refresh(), Duration::from_secs(30));
        assert_eq!(config.chain_poll(), Duration::from_secs(4));
        assert_eq!(config.listen_socket().unwrap().port(), 3000);
        assert_eq!(config.event_offset().unwrap().local_minus_utc(), 0);
        assert_eq!(config.private_key, None);
        assert_eq!(config.factory().unwrap(), FACTORY.parse::<Address>().unwrap());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let config = from_toml(&format!(
            "factory_address = \"{}\"\nevent_utc_offset_minutes = 180\nblock_explorer_url = \"https://explorer.example/\"",
            FACTORY
        ))
        .unwrap();

        assert_eq!(config.event_offset().unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(config.block_explorer_url, "https://explorer.example/");
    }

    #[test]
    fn test_missing_factory_is_an_error() {
        assert!(matches!(from_toml(""), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            from_toml("factory_address = \"0x123\""),
            Err(ConfigError::InvalidAddress { key: "factory_address", .. })
        ));
        assert!(matches!(
            from_toml(&format!("factory_address = \"{}\"\nlisten_addr = \"nowhere\"", FACTORY)),
            Err(ConfigError::InvalidListenAddr(_))
        ));
        assert!(matches!(
            from_toml(&format!("factory_address = \"{}\"\nqr_refresh_secs = 0", FACTORY)),
            Err(ConfigError::NotPositive("qr_refresh_secs"))
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = from_toml(&format!(
            "factory_address = \"{}\"\nprivate_key = \"0xdeadbeef\"",
            FACTORY
        ))
        .unwrap();

        let printed = format!("{:?}", config);
        assert!(!printed.contains("deadbeef"));
        assert!(printed.contains("<redacted>"));
    }
}
