use crate::foundation::{
    KeyId, DEFAULT_INFORMER_INTERVAL_MS, DEFAULT_INTERVAL_BETWEEN_ATTEMPTS_MS, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_CONFIRMED_BLOCKS,
    DEFAULT_MAX_CONNECTION_ATTEMPTS, DEFAULT_POOL_SIZE, DEFAULT_SOCKET_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sidechain network the bridge runs against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    #[default]
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub signer: RemoteSignerConfig,
    #[serde(default)]
    pub bookkeeping: BookkeepingConfig,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the remote signer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteSignerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_interval_ms")]
    pub interval_between_attempts_ms: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    9999
}

const fn default_socket_timeout_ms() -> u64 {
    DEFAULT_SOCKET_TIMEOUT_MS
}

const fn default_max_attempts() -> usize {
    DEFAULT_MAX_CONNECTION_ATTEMPTS
}

const fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_BETWEEN_ATTEMPTS_MS
}

const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

impl Default for RemoteSignerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            socket_timeout_ms: default_socket_timeout_ms(),
            max_attempts: default_max_attempts(),
            interval_between_attempts_ms: default_interval_ms(),
            pool_size: default_pool_size(),
        }
    }
}

impl RemoteSignerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_between_attempts_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookkeepingConfig {
    /// Accumulated difficulty that confirms a block. Accepts integers or decimal/0x strings.
    #[serde(default = "default_difficulty_target", with = "u128_flex")]
    pub difficulty_target: u128,
    #[serde(default = "default_difficulty_cap", with = "u128_flex")]
    pub difficulty_cap: u128,
    #[serde(default = "default_max_confirmed_blocks")]
    pub max_confirmed_blocks: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_informer_interval_ms")]
    pub informer_interval_ms: u64,
    #[serde(default)]
    pub disabled: bool,
    /// Stop the service after a chain desync instead of retrying on the next tick.
    #[serde(default)]
    pub stop_on_desync: bool,
}

const fn default_difficulty_target() -> u128 {
    1
}

const fn default_difficulty_cap() -> u128 {
    u128::MAX
}

const fn default_max_confirmed_blocks() -> usize {
    DEFAULT_MAX_CONFIRMED_BLOCKS
}

const fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

const fn default_informer_interval_ms() -> u64 {
    DEFAULT_INFORMER_INTERVAL_MS
}

impl Default for BookkeepingConfig {
    fn default() -> Self {
        Self {
            difficulty_target: default_difficulty_target(),
            difficulty_cap: default_difficulty_cap(),
            max_confirmed_blocks: default_max_confirmed_blocks(),
            max_chunk_size: default_max_chunk_size(),
            informer_interval_ms: default_informer_interval_ms(),
            disabled: false,
            stop_on_desync: false,
        }
    }
}

impl BookkeepingConfig {
    pub fn informer_interval(&self) -> Duration {
        Duration::from_millis(self.informer_interval_ms)
    }
}

/// Where the key for one logical key id lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyConfig {
    Remote {
        key_id: KeyId,
        /// Identifier the device knows the key by; defaults to the network's derivation path.
        #[serde(default)]
        remote_key_id: Option<String>,
    },
    KeyFile {
        key_id: KeyId,
        path: String,
    },
}

impl KeyConfig {
    pub fn key_id(&self) -> &KeyId {
        match self {
            Self::Remote { key_id, .. } | Self::KeyFile { key_id, .. } => key_id,
        }
    }
}

/// Default device key identifier (a BIP44 derivation path) for well-known key ids.
pub fn default_remote_key_id(network: Network, key_id: &KeyId) -> Option<&'static str> {
    let mainnet = network == Network::Mainnet;
    match key_id.as_str() {
        "BTC" if mainnet => Some("m/44'/0'/0'/0/0"),
        "BTC" => Some("m/44'/1'/0'/0/0"),
        "RSK" if mainnet => Some("m/44'/137'/0'/0/0"),
        "RSK" => Some("m/44'/37310'/0'/0/0"),
        "MST" if mainnet => Some("m/44'/137'/1'/0/0"),
        "MST" => Some("m/44'/37310'/1'/0/0"),
        _ => None,
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_log_filters")]
    pub filters: String,
}

fn default_log_filters() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: None, filters: default_log_filters() }
    }
}

/// `u128` that round-trips through TOML and env vars, which only carry 64-bit integers.
mod u128_flex {
    use crate::foundation::util::parse_u128;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(U128Visitor)
    }

    struct U128Visitor;

    impl<'de> Visitor<'de> for U128Visitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal/0x-prefixed string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative value {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            parse_u128(v).map_err(E::custom)
        }
    }
}
