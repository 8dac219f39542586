//! Remote signer status codes and their version-dependent meaning.

use crate::foundation::{BridgeError, ProtocolVersion, Result, SignerErrorKind};

pub const CODE_SUCCESS: i64 = 0;
pub const CODE_PARTIAL_SUCCESS: i64 = 1;
pub const CODE_AUTH_REJECTED: i64 = -101;
pub const CODE_INVALID_MESSAGE: i64 = -102;
pub const CODE_KEY_REJECTED: i64 = -103;
pub const CODE_CHAINING_MISMATCH: i64 = -201;
pub const CODE_POW_INVALID: i64 = -202;
pub const CODE_TIP_MISMATCH: i64 = -203;
pub const CODE_INVALID_INPUT_BLOCKS: i64 = -204;
pub const CODE_INVALID_BROTHERS: i64 = -205;
pub const CODE_INVALID_USER_DEFINED_VALUE: i64 = -301;
pub const CODE_FORMAT_ERROR: i64 = -901;
pub const CODE_INVALID_REQUEST: i64 = -902;
pub const CODE_UNKNOWN_COMMAND: i64 = -903;
pub const CODE_VERSION_CHANGED: i64 = -904;
pub const CODE_DEVICE_ERROR: i64 = -905;
pub const CODE_UNKNOWN_ERROR: i64 = -906;
pub const CODE_DEVICE_NOT_READY: i64 = -907;

/// Error taxonomy spoken by a given protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dialect {
    /// Version 1: hash signing only, no chain bookkeeping codes.
    Legacy,
    /// Version 2: adds bookkeeping codes and partial success.
    Pow,
    /// Version 3 onward: adds sibling header validation.
    PowSiblings,
}

impl Dialect {
    pub fn for_version(version: ProtocolVersion) -> Self {
        match version.number() {
            0 | 1 => Self::Legacy,
            2 => Self::Pow,
            _ => Self::PowSiblings,
        }
    }
}

/// Non-error outcome of a validated response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    /// The command was accepted but only part of the input was processed.
    PartialSuccess,
}

/// Maps a status code to its outcome under `dialect`.
///
/// Negative codes not defined for the dialect are device errors; non-negative codes other than
/// the success codes are protocol violations.
pub fn classify(command: &str, code: i64, dialect: Dialect) -> Result<ResponseCode> {
    let kind = match (code, dialect) {
        (CODE_SUCCESS, _) => return Ok(ResponseCode::Success),
        (CODE_PARTIAL_SUCCESS, Dialect::Pow | Dialect::PowSiblings) => return Ok(ResponseCode::PartialSuccess),
        (CODE_DEVICE_NOT_READY, _) => {
            return Err(BridgeError::DeviceNotReady { details: format!("{} answered code {}", command, code) });
        }
        (CODE_AUTH_REJECTED, _) => SignerErrorKind::AuthRejected,
        (CODE_INVALID_MESSAGE, _) => SignerErrorKind::InvalidMessage,
        (CODE_KEY_REJECTED, _) => SignerErrorKind::KeyRejected,
        (CODE_CHAINING_MISMATCH, Dialect::Pow | Dialect::PowSiblings) => SignerErrorKind::ChainingMismatch,
        (CODE_POW_INVALID, Dialect::Pow | Dialect::PowSiblings) => SignerErrorKind::PowValidationFailed,
        (CODE_TIP_MISMATCH, Dialect::Pow | Dialect::PowSiblings) => SignerErrorKind::TipMismatch,
        (CODE_INVALID_INPUT_BLOCKS, Dialect::Pow | Dialect::PowSiblings) => SignerErrorKind::InsufficientInputBlocks,
        (CODE_INVALID_BROTHERS, Dialect::PowSiblings) => SignerErrorKind::InvalidSiblingHeaders,
        (CODE_INVALID_USER_DEFINED_VALUE, Dialect::Pow | Dialect::PowSiblings) => SignerErrorKind::InvalidUserDefinedValue,
        (CODE_FORMAT_ERROR, _) => SignerErrorKind::FormatError,
        (CODE_INVALID_REQUEST, _) => SignerErrorKind::InvalidRequest,
        (CODE_UNKNOWN_COMMAND, _) => SignerErrorKind::UnknownCommand,
        (CODE_VERSION_CHANGED, _) => SignerErrorKind::VersionChanged,
        (CODE_DEVICE_ERROR, _) => SignerErrorKind::DeviceError,
        (CODE_UNKNOWN_ERROR, _) => SignerErrorKind::Unknown,
        (c, _) if c < 0 => SignerErrorKind::DeviceError,
        (c, _) => {
            return Err(BridgeError::protocol_violation(command, format!("unexpected status code {}", c)));
        }
    };
    Err(BridgeError::Signer { command: command.to_string(), code, kind })
}
