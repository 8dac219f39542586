//! System-wide constants for the signer bridge.

/// Logical key id of the base-chain pegout key.
pub const BTC_KEY_ID: &str = "BTC";

/// Logical key id of the sidechain key.
pub const RSK_KEY_ID: &str = "RSK";

/// Logical key id of the sidechain multisig transaction key.
pub const MST_KEY_ID: &str = "MST";

/// First protocol version whose confirmation accumulator adds uncle difficulty under a cap.
pub const DIFFICULTY_CAP_MIN_VERSION: u32 = 4;

/// First protocol version that expects sibling headers alongside advanced blocks.
pub const SIBLING_HEADERS_MIN_VERSION: u32 = 3;

/// Maximum sibling headers submitted per advanced block.
pub const MAX_SIBLING_HEADERS_PER_BLOCK: usize = 10;

/// Default number of attempts per remote signer exchange.
pub const DEFAULT_MAX_CONNECTION_ATTEMPTS: usize = 3;

/// Default delay between remote signer attempts (milliseconds).
pub const DEFAULT_INTERVAL_BETWEEN_ATTEMPTS_MS: u64 = 1_000;

/// Default socket read/connect timeout (milliseconds).
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 20_000;

/// Default number of pooled connections to the remote signer.
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Default headers per advance/update-ancestor command.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 100;

/// Default maximum confirmed blocks reported per bookkeeping tick.
pub const DEFAULT_MAX_CONFIRMED_BLOCKS: usize = 100;

/// Default bookkeeping tick period (milliseconds).
pub const DEFAULT_INFORMER_INTERVAL_MS: u64 = 6 * 60 * 1_000;

/// Uncompressed secp256k1 public key length.
pub const UNCOMPRESSED_PUBKEY_SIZE: usize = 65;

/// Compressed secp256k1 public key length.
pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

/// ECDSA compact signature component size (r or s).
pub const SIGNATURE_COMPONENT_SIZE: usize = 32;

/// Offset added to the recovery id in the "v" byte form (27/28).
pub const RECOVERY_BYTE_OFFSET: u8 = 27;

/// SIGHASH_ALL flag appended to base-chain sighash preimages.
pub const SIGHASH_ALL: u32 = 1;
