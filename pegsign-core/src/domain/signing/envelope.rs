use crate::domain::btc::{legacy_sighash, segwit_sighash, BtcTransaction, SighashMode};
use crate::domain::chain::ReceiptProof;
use crate::foundation::{BridgeError, Hash32, KeyId, ProtocolVersion, Result};
use serde::{Deserialize, Serialize};

/// How the remote signer is told to compute the sighash of a pegout input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SighashSpec {
    /// Versions 2 and 3: the signer always computes the legacy sighash and takes no mode field.
    Implicit,
    Legacy,
    Segwit { outpoint_value: u64 },
}

impl SighashSpec {
    pub fn mode(&self) -> SighashMode {
        match self {
            Self::Implicit | Self::Legacy => SighashMode::Legacy,
            Self::Segwit { .. } => SighashMode::Segwit,
        }
    }

    /// Picks the spec a given protocol version understands.
    ///
    /// `segwit_outpoint_value` is the spent amount when the input is a witness input.
    pub fn for_version(version: ProtocolVersion, segwit_outpoint_value: Option<u64>) -> Result<Self> {
        match (version.number(), segwit_outpoint_value) {
            (2 | 3, None) => Ok(Self::Implicit),
            (4, None) | (5, None) => Ok(Self::Legacy),
            (5, Some(outpoint_value)) => Ok(Self::Segwit { outpoint_value }),
            (v, _) => Err(BridgeError::UnsupportedVersion { version: v, key_id: KeyId::btc().to_string() }),
        }
    }
}

/// Everything the remote signer needs to independently verify and sign one pegout input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PegoutInputEnvelope {
    pub tx: BtcTransaction,
    pub input_index: u32,
    /// Redeem script (legacy) or witness script (segwit) of the spent output.
    pub script_code: Vec<u8>,
    pub receipt: ReceiptProof,
    pub sighash: SighashSpec,
}

impl PegoutInputEnvelope {
    pub fn sighash(&self) -> Result<Hash32> {
        match self.sighash {
            SighashSpec::Implicit | SighashSpec::Legacy => legacy_sighash(&self.tx, self.input_index, &self.script_code),
            SighashSpec::Segwit { outpoint_value } => segwit_sighash(&self.tx, self.input_index, &self.script_code, outpoint_value),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignEnvelope {
    Hash(Hash32),
    Pegout(Box<PegoutInputEnvelope>),
}

impl SignEnvelope {
    pub fn hash(hash: Hash32) -> Self {
        Self::Hash(hash)
    }

    pub fn pegout(envelope: PegoutInputEnvelope) -> Self {
        Self::Pegout(Box::new(envelope))
    }

    /// Digest the resulting signature is expected to commit to.
    pub fn signed_hash(&self) -> Result<Hash32> {
        match self {
            Self::Hash(hash) => Ok(*hash),
            Self::Pegout(envelope) => envelope.sighash(),
        }
    }

    pub fn is_pegout(&self) -> bool {
        matches!(self, Self::Pegout(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    pub key_id: KeyId,
    pub envelope: SignEnvelope,
}

impl SignRequest {
    pub fn new(key_id: KeyId, envelope: SignEnvelope) -> Self {
        Self { key_id, envelope }
    }
}
