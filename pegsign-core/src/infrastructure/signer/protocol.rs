//! Request/response layer over pooled remote signer connections.

use crate::foundation::{BridgeError, ProtocolVersion, Result};
use crate::infrastructure::signer::codes::{classify, Dialect, ResponseCode, CODE_DEVICE_NOT_READY};
use crate::infrastructure::signer::commands::{CMD_VERSION, FIELD_COMMAND, FIELD_ERROR_CODE, FIELD_VERSION};
use crate::infrastructure::signer::connection::command_of;
use crate::infrastructure::signer::pool::{lease, ConnectionPool};
use crate::infrastructure::signer::retry::retry_transport;
use log::{debug, info};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const VERSION_UNSET: u32 = 0;

pub struct SignerProtocol {
    pool: Arc<dyn ConnectionPool>,
    max_attempts: usize,
    interval: Duration,
    version: AtomicU32,
}

impl SignerProtocol {
    pub fn new(pool: Arc<dyn ConnectionPool>, max_attempts: usize, interval: Duration) -> Self {
        Self { pool, max_attempts: max_attempts.max(1), interval, version: AtomicU32::new(VERSION_UNSET) }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Negotiated version, if any. Until set, requests go out without a `version` field.
    pub fn version(&self) -> Option<ProtocolVersion> {
        match self.version.load(Ordering::Acquire) {
            VERSION_UNSET => None,
            v => Some(ProtocolVersion::new(v)),
        }
    }

    pub fn set_version(&self, version: ProtocolVersion) {
        self.version.store(version.number(), Ordering::Release);
    }

    pub fn clear_version(&self) {
        self.version.store(VERSION_UNSET, Ordering::Release);
    }

    pub fn dialect(&self) -> Dialect {
        self.version().map(Dialect::for_version).unwrap_or(Dialect::Legacy)
    }

    /// Sends `request`, retrying transport-class failures within the attempt budget.
    ///
    /// Each attempt leases its own connection and returns it before the next attempt starts.
    /// A "device not ready" status is treated like a transport failure.
    pub async fn send(&self, request: Value) -> Result<Value> {
        let request = self.stamp_version(request);
        let command = command_of(&request).to_string();
        retry_transport(&command, self.max_attempts, self.interval, |attempt| {
            let request = &request;
            let command = &command;
            async move {
                let mut connection = lease(&self.pool).await?;
                debug!("remote signer exchange command={} attempt={}", command, attempt);
                let response = connection.exchange(request).await?;
                if response.get(FIELD_ERROR_CODE).and_then(Value::as_i64) == Some(CODE_DEVICE_NOT_READY) {
                    return Err(BridgeError::DeviceNotReady { details: format!("{} answered device not ready", command) });
                }
                Ok(response)
            }
        })
        .await
    }

    /// Sends `request` and validates the response under the current dialect.
    pub async fn execute(&self, request: Value, required_fields: &[&str]) -> Result<(Value, ResponseCode)> {
        let command = command_of(&request).to_string();
        let response = self.send(request).await?;
        let code = validate(&response, &command, self.dialect(), required_fields)?;
        Ok((response, code))
    }

    /// Probes the device for its protocol version.
    pub async fn get_version(&self) -> Result<ProtocolVersion> {
        let (response, _) = self.execute(command(CMD_VERSION), &[FIELD_VERSION]).await?;
        let version = response
            .get(FIELD_VERSION)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| BridgeError::protocol_violation(CMD_VERSION, "version is not a non-negative integer"))?;
        let version = ProtocolVersion::new(version);
        info!("remote signer reported protocol version={}", version);
        Ok(version)
    }

    /// Probes the version and stamps it onto every subsequent request.
    pub async fn negotiate(&self) -> Result<ProtocolVersion> {
        let version = self.get_version().await?;
        self.set_version(version);
        Ok(version)
    }

    fn stamp_version(&self, mut request: Value) -> Value {
        if let (Some(version), Some(obj)) = (self.version(), request.as_object_mut()) {
            let is_probe = obj.get(FIELD_COMMAND).and_then(Value::as_str) == Some(CMD_VERSION);
            if !is_probe {
                obj.insert(FIELD_VERSION.to_string(), Value::from(version.number()));
            }
        }
        request
    }
}

/// Builds a bare request object for `name`.
pub fn command(name: &str) -> Value {
    let mut obj = Map::new();
    obj.insert(FIELD_COMMAND.to_string(), Value::from(name));
    Value::Object(obj)
}

/// Checks that the status code is present and acceptable, then that every required field exists.
///
/// Required fields are only checked on a success status since error responses carry none.
/// A missing field is always fatal; nothing is defaulted.
pub fn validate(response: &Value, command: &str, dialect: Dialect, required_fields: &[&str]) -> Result<ResponseCode> {
    let raw = response.get(FIELD_ERROR_CODE).ok_or_else(|| BridgeError::missing_field(command, FIELD_ERROR_CODE))?;
    let code = raw
        .as_i64()
        .ok_or_else(|| BridgeError::protocol_violation(command, format!("{} is not an integer: {}", FIELD_ERROR_CODE, raw)))?;
    let outcome = classify(command, code, dialect)?;
    for field in required_fields {
        if response.get(*field).map_or(true, Value::is_null) {
            return Err(BridgeError::missing_field(command, *field));
        }
    }
    Ok(outcome)
}
