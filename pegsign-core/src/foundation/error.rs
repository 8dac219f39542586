use secp256k1::Error as SecpError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Application-level failure reported by the remote signer through a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerErrorKind {
    AuthRejected,
    KeyRejected,
    InvalidMessage,
    InvalidUserDefinedValue,
    ChainingMismatch,
    PowValidationFailed,
    TipMismatch,
    InsufficientInputBlocks,
    InvalidSiblingHeaders,
    FormatError,
    InvalidRequest,
    UnknownCommand,
    VersionChanged,
    DeviceError,
    Unknown,
}

impl SignerErrorKind {
    /// Errors meaning the signer's view of the chain does not line up with what we sent.
    pub fn is_chain_desync(&self) -> bool {
        matches!(
            self,
            Self::ChainingMismatch
                | Self::PowValidationFailed
                | Self::TipMismatch
                | Self::InsufficientInputBlocks
                | Self::InvalidSiblingHeaders
        )
    }

    /// Errors that should be surfaced to operators rather than retried by a later flow.
    pub fn is_irrecoverable(&self) -> bool {
        matches!(self, Self::DeviceError | Self::Unknown)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AuthRejected => "auth_rejected",
            Self::KeyRejected => "key_rejected",
            Self::InvalidMessage => "invalid_message",
            Self::InvalidUserDefinedValue => "invalid_user_defined_value",
            Self::ChainingMismatch => "chaining_mismatch",
            Self::PowValidationFailed => "pow_validation_failed",
            Self::TipMismatch => "tip_mismatch",
            Self::InsufficientInputBlocks => "insufficient_input_blocks",
            Self::InvalidSiblingHeaders => "invalid_sibling_headers",
            Self::FormatError => "format_error",
            Self::InvalidRequest => "invalid_request",
            Self::UnknownCommand => "unknown_command",
            Self::VersionChanged => "version_changed",
            Self::DeviceError => "device_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SignerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Transport,
    SignerUnreachable,
    DeviceNotReady,
    ProtocolViolation,
    MissingField,
    Signer,
    BookkeepingDesync,
    AncestorNotUpdated,
    TargetAheadOfBestBlock,
    BlockNotFound,
    ReceiptNotFound,
    UnsupportedVersion,
    NoSuitableSigner,
    KeyNotFound,
    InvalidSignature,
    InvalidInputIndex,
    CryptoError,
    SerializationError,
    EncodingError,
    ConfigError,
    InsecureFilePermissions,
    InvalidStateTransition,
    StorageError,
    Message,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    // === Transport-class ===
    #[error("transport error during {operation}: {details}")]
    Transport { operation: String, details: String },

    #[error("remote signer unreachable after {attempts} attempts: {details}")]
    SignerUnreachable { attempts: usize, details: String },

    #[error("remote signer device not ready: {details}")]
    DeviceNotReady { details: String },

    // === Protocol-class ===
    #[error("protocol violation on {command}: {details}")]
    ProtocolViolation { command: String, details: String },

    #[error("response to {command} is missing required field '{field}'")]
    MissingField { command: String, field: String },

    // === Application-class ===
    #[error("remote signer rejected {command}: {kind} (code {code})")]
    Signer { command: String, code: i64, kind: SignerErrorKind },

    #[error("bookkeeping desynchronized: {details}")]
    BookkeepingDesync { details: String },

    #[error("ancestor block not updated: expected={expected} actual={actual}")]
    AncestorNotUpdated { expected: String, actual: String },

    #[error("target block {target_height} is ahead of the signer's best block {best_height}")]
    TargetAheadOfBestBlock { target_height: u64, best_height: u64 },

    #[error("block not found in local chain store: {0}")]
    BlockNotFound(String),

    #[error("receipt not found for tx={tx_hash} block={block_hash}")]
    ReceiptNotFound { tx_hash: String, block_hash: String },

    #[error("unsupported remote signer version {version} for key {key_id}")]
    UnsupportedVersion { version: u32, key_id: String },

    #[error("no suitable signer for key {0}")]
    NoSuitableSigner(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid input index: {index} (max {max})")]
    InvalidInputIndex { index: u32, max: u32 },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("insecure file permissions on {path}: mode {mode:o}")]
    InsecureFilePermissions { path: String, mode: u32 },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Transport { .. } => ErrorCode::Transport,
            BridgeError::SignerUnreachable { .. } => ErrorCode::SignerUnreachable,
            BridgeError::DeviceNotReady { .. } => ErrorCode::DeviceNotReady,
            BridgeError::ProtocolViolation { .. } => ErrorCode::ProtocolViolation,
            BridgeError::MissingField { .. } => ErrorCode::MissingField,
            BridgeError::Signer { .. } => ErrorCode::Signer,
            BridgeError::BookkeepingDesync { .. } => ErrorCode::BookkeepingDesync,
            BridgeError::AncestorNotUpdated { .. } => ErrorCode::AncestorNotUpdated,
            BridgeError::TargetAheadOfBestBlock { .. } => ErrorCode::TargetAheadOfBestBlock,
            BridgeError::BlockNotFound(_) => ErrorCode::BlockNotFound,
            BridgeError::ReceiptNotFound { .. } => ErrorCode::ReceiptNotFound,
            BridgeError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            BridgeError::NoSuitableSigner(_) => ErrorCode::NoSuitableSigner,
            BridgeError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            BridgeError::InvalidSignature(_) => ErrorCode::InvalidSignature,
            BridgeError::InvalidInputIndex { .. } => ErrorCode::InvalidInputIndex,
            BridgeError::CryptoError { .. } => ErrorCode::CryptoError,
            BridgeError::SerializationError { .. } => ErrorCode::SerializationError,
            BridgeError::EncodingError(_) => ErrorCode::EncodingError,
            BridgeError::ConfigError(_) => ErrorCode::ConfigError,
            BridgeError::InsecureFilePermissions { .. } => ErrorCode::InsecureFilePermissions,
            BridgeError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            BridgeError::StorageError { .. } => ErrorCode::StorageError,
            BridgeError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn transport(operation: impl Into<String>, details: impl ToString) -> Self {
        BridgeError::Transport { operation: operation.into(), details: details.to_string() }
    }

    pub fn protocol_violation(command: impl Into<String>, details: impl Into<String>) -> Self {
        BridgeError::ProtocolViolation { command: command.into(), details: details.into() }
    }

    pub fn missing_field(command: impl Into<String>, field: impl Into<String>) -> Self {
        BridgeError::MissingField { command: command.into(), field: field.into() }
    }

    pub fn crypto(operation: impl Into<String>, details: impl ToString) -> Self {
        BridgeError::CryptoError { operation: operation.into(), details: details.to_string() }
    }

    pub fn desync(details: impl Into<String>) -> Self {
        BridgeError::BookkeepingDesync { details: details.into() }
    }

    /// Connect/timeout failures that consume one unit of the transport retry budget.
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Transport { .. })
    }

    /// Failures retried within the transport budget: connection problems and a busy device.
    pub fn is_transport_class(&self) -> bool {
        matches!(self, BridgeError::Transport { .. } | BridgeError::DeviceNotReady { .. })
    }

    pub fn signer_kind(&self) -> Option<SignerErrorKind> {
        match self {
            BridgeError::Signer { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_version_changed(&self) -> bool {
        self.signer_kind() == Some(SignerErrorKind::VersionChanged)
    }

    pub fn is_chain_desync(&self) -> bool {
        match self {
            BridgeError::BookkeepingDesync { .. } | BridgeError::TargetAheadOfBestBlock { .. } => true,
            BridgeError::Signer { kind, .. } => kind.is_chain_desync(),
            _ => false,
        }
    }

    /// Failures worth broadcasting to operators: the device or the protocol itself is broken.
    pub fn is_irrecoverable(&self) -> bool {
        match self {
            BridgeError::Signer { kind, .. } => kind.is_irrecoverable(),
            BridgeError::ProtocolViolation { .. } | BridgeError::MissingField { .. } => true,
            BridgeError::SignerUnreachable { .. } | BridgeError::DeviceNotReady { .. } => true,
            _ => false,
        }
    }
}

impl From<hex::FromHexError> for BridgeError {
    fn from(err: hex::FromHexError) -> Self {
        BridgeError::EncodingError(format!("hex decode error: {}", err))
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        BridgeError::ConfigError(format!("config extraction failed: {}", err))
    }
}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        BridgeError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<SecpError> for BridgeError {
    fn from(err: SecpError) -> Self {
        BridgeError::CryptoError { operation: "secp256k1".to_string(), details: err.to_string() }
    }
}
