//! Version-specific remote signing clients.
//!
//! Variants differ only in how the sign message is built; transport, validation and the
//! public-key cache are shared.

use crate::domain::signing::{PegoutInputEnvelope, SighashSpec, SignEnvelope, SignerSignature};
use crate::foundation::util::decode_hex;
use crate::foundation::{BridgeError, ProtocolVersion, Result};
use crate::infrastructure::signer::commands::*;
use crate::infrastructure::signer::{command, SignerProtocol};
use async_trait::async_trait;
use log::{debug, trace};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[async_trait]
pub trait SigningClient: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    /// Raw public key bytes for `remote_key_id`, fetched once and cached.
    async fn get_public_key(&self, remote_key_id: &str) -> Result<Vec<u8>>;

    async fn sign(&self, remote_key_id: &str, envelope: &SignEnvelope) -> Result<SignerSignature>;
}

/// Transport plus public-key cache shared by every client variant.
struct ClientCore {
    protocol: Arc<SignerProtocol>,
    version: ProtocolVersion,
    public_keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl ClientCore {
    fn new(protocol: Arc<SignerProtocol>, version: ProtocolVersion) -> Self {
        Self { protocol, version, public_keys: Mutex::new(HashMap::new()) }
    }

    async fn public_key(&self, remote_key_id: &str) -> Result<Vec<u8>> {
        let mut cache = self.public_keys.lock().await;
        if let Some(key) = cache.get(remote_key_id) {
            return Ok(key.clone());
        }
        let mut request = command(CMD_GET_PUBKEY);
        request[FIELD_KEY_ID] = json!(remote_key_id);
        let (response, _) = self.protocol.execute(request, &[FIELD_PUBKEY]).await?;
        let text = response[FIELD_PUBKEY]
            .as_str()
            .ok_or_else(|| BridgeError::protocol_violation(CMD_GET_PUBKEY, "pubKey is not a string"))?;
        let key = decode_hex(text).map_err(|err| BridgeError::protocol_violation(CMD_GET_PUBKEY, err.to_string()))?;
        debug!("cached remote public key remote_key_id={} len={}", remote_key_id, key.len());
        cache.insert(remote_key_id.to_string(), key.clone());
        Ok(key)
    }

    async fn sign(&self, remote_key_id: &str, message: Value, auth: Option<Value>, envelope: &SignEnvelope) -> Result<SignerSignature> {
        let signed_hash = envelope.signed_hash()?;
        let public_key = self.public_key(remote_key_id).await?;

        let mut request = command(CMD_SIGN);
        request[FIELD_KEY_ID] = json!(remote_key_id);
        request[FIELD_MESSAGE] = message;
        if let Some(auth) = auth {
            request[FIELD_AUTH] = auth;
        }
        trace!("sign request remote_key_id={} pegout={}", remote_key_id, envelope.is_pegout());
        let (response, _) = self.protocol.execute(request, &[FIELD_SIGNATURE]).await?;
        let (r, s, recovery_id) = parse_signature(&response[FIELD_SIGNATURE])?;
        Ok(SignerSignature { r, s, recovery_id, signed_hash, public_key })
    }
}

fn parse_signature(signature: &Value) -> Result<(Vec<u8>, Vec<u8>, Option<u8>)> {
    let component = |name: &str| -> Result<Vec<u8>> {
        let text = signature
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::missing_field(CMD_SIGN, format!("{}.{}", FIELD_SIGNATURE, name)))?;
        decode_hex(text).map_err(|err| BridgeError::protocol_violation(CMD_SIGN, format!("signature.{}: {}", name, err)))
    };
    let recovery_id = match signature.get("v") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| BridgeError::protocol_violation(CMD_SIGN, format!("signature.v is not a byte: {}", v)))?,
        ),
    };
    Ok((component("r")?, component("s")?, recovery_id))
}

/// Version 1: every key signs a bare hash sent as a hex string.
pub struct HashSigningClient {
    core: ClientCore,
}

impl HashSigningClient {
    pub fn new(protocol: Arc<SignerProtocol>) -> Self {
        Self { core: ClientCore::new(protocol, ProtocolVersion::V1) }
    }
}

#[async_trait]
impl SigningClient for HashSigningClient {
    fn version(&self) -> ProtocolVersion {
        self.core.version
    }

    async fn get_public_key(&self, remote_key_id: &str) -> Result<Vec<u8>> {
        self.core.public_key(remote_key_id).await
    }

    async fn sign(&self, remote_key_id: &str, envelope: &SignEnvelope) -> Result<SignerSignature> {
        let message = json!(hex::encode(envelope.signed_hash()?));
        self.core.sign(remote_key_id, message, None, envelope).await
    }
}

/// Versions 2 to 5: hash mode for sidechain keys, pegout mode with receipt proof for the
/// base-chain key.
pub struct PowSigningClient {
    core: ClientCore,
}

impl PowSigningClient {
    pub fn new(protocol: Arc<SignerProtocol>, version: ProtocolVersion) -> Self {
        Self { core: ClientCore::new(protocol, version) }
    }

    fn pegout_message(&self, envelope: &PegoutInputEnvelope) -> Result<(Value, Value)> {
        let input = envelope.input_index;
        envelope.tx.input(input)?;
        let spec = SighashSpec::for_version(self.core.version, match envelope.sighash {
            SighashSpec::Segwit { outpoint_value } => Some(outpoint_value),
            _ => None,
        })?;

        let mut message = json!({ MSG_INPUT: input });
        match spec {
            SighashSpec::Implicit | SighashSpec::Legacy => {
                // The device reads the script code from the signed input's scriptSig.
                let mut tx = envelope.tx.clone();
                if let Some(tx_in) = tx.inputs.get_mut(input as usize) {
                    tx_in.script_sig = envelope.script_code.clone();
                }
                message[MSG_TX] = json!(hex::encode(tx.serialize()));
                if spec == SighashSpec::Legacy {
                    message[MSG_SIGHASH_MODE] = json!(spec.mode().as_str());
                }
            }
            SighashSpec::Segwit { outpoint_value } => {
                message[MSG_TX] = json!(hex::encode(envelope.tx.serialize()));
                message[MSG_SIGHASH_MODE] = json!(spec.mode().as_str());
                message[MSG_WITNESS_SCRIPT] = json!(hex::encode(&envelope.script_code));
                message[MSG_OUTPOINT_VALUE] = json!(outpoint_value);
            }
        }

        let proof: Vec<Value> = envelope.receipt.merkle_proof.iter().map(|node| json!(hex::encode(node))).collect();
        let auth = json!({ AUTH_RECEIPT: hex::encode(&envelope.receipt.receipt), AUTH_RECEIPT_MERKLE_PROOF: proof });
        Ok((message, auth))
    }
}

#[async_trait]
impl SigningClient for PowSigningClient {
    fn version(&self) -> ProtocolVersion {
        self.core.version
    }

    async fn get_public_key(&self, remote_key_id: &str) -> Result<Vec<u8>> {
        self.core.public_key(remote_key_id).await
    }

    async fn sign(&self, remote_key_id: &str, envelope: &SignEnvelope) -> Result<SignerSignature> {
        let (message, auth) = match envelope {
            SignEnvelope::Hash(hash) => (json!({ MSG_HASH: hex::encode(hash) }), None),
            SignEnvelope::Pegout(pegout) => {
                let (message, auth) = self.pegout_message(pegout)?;
                (message, Some(auth))
            }
        };
        self.core.sign(remote_key_id, message, auth, envelope).await
    }
}
