//! Pegout signing: ancestor enforcement followed by per-input signatures.

use crate::application::ancestor::AncestorReconciler;
use crate::domain::btc::{legacy_sighash, segwit_sighash, BtcTransaction};
use crate::domain::chain::{ReceiptProof, ReceiptProofStore};
use crate::domain::signing::{CanonicalSignature, PegoutInputEnvelope, SighashSpec, SignEnvelope, Signer};
use crate::foundation::{BlockHash, BridgeError, KeyId, ProtocolVersion, Result, TxHash};
use log::{debug, info};
use std::sync::Arc;

/// Spent-output context for one pegout input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PegoutInput {
    /// Redeem script for legacy inputs, witness script for segwit inputs.
    pub script_code: Vec<u8>,
    /// Spent amount; present only for segwit inputs.
    pub segwit_outpoint_value: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PegoutSigningRequest {
    pub tx: BtcTransaction,
    pub inputs: Vec<PegoutInput>,
    /// Sidechain transaction that requested the release.
    pub release_tx_hash: TxHash,
    /// Block holding the release-request receipt.
    pub release_block_hash: BlockHash,
}

pub struct PegoutSigner {
    signer: Arc<dyn Signer>,
    reconciler: Arc<AncestorReconciler>,
    receipts: Arc<dyn ReceiptProofStore>,
}

impl PegoutSigner {
    pub fn new(signer: Arc<dyn Signer>, reconciler: Arc<AncestorReconciler>, receipts: Arc<dyn ReceiptProofStore>) -> Self {
        Self { signer, reconciler, receipts }
    }

    /// Signs every input of the pegout, returning low-S signatures in input order.
    pub async fn sign_pegout(&self, key_id: &KeyId, request: &PegoutSigningRequest) -> Result<Vec<CanonicalSignature>> {
        if request.inputs.len() != request.tx.inputs.len() {
            return Err(BridgeError::Message(format!(
                "pegout carries {} input descriptors for {} transaction inputs",
                request.inputs.len(),
                request.tx.inputs.len()
            )));
        }

        let version = self.signer.version_for_key_id(key_id).await?;
        let receipt = if version.supports_bookkeeping() {
            let update = self.reconciler.ensure_ancestor(&request.release_block_hash).await?;
            debug!("ancestor enforced for pegout release_block={} outcome={:?}", request.release_block_hash, update);
            Some(self.receipt(request)?)
        } else {
            None
        };

        let public_key = self.signer.public_key(key_id).await?;
        let mut signatures = Vec::with_capacity(request.inputs.len());
        for (index, input) in request.inputs.iter().enumerate() {
            let input_index = u32::try_from(index).map_err(|_| BridgeError::Message(format!("input index {} out of range", index)))?;
            let envelope = build_envelope(version, &request.tx, input_index, input, receipt.as_ref())?;
            let expected_hash = envelope.signed_hash()?;

            let mut signature = self.signer.sign(key_id, &envelope).await?;
            if signature.signed_hash != expected_hash {
                return Err(BridgeError::InvalidSignature(format!("input {} signed an unexpected digest", input_index)));
            }
            signature.public_key = public_key.clone();
            signatures.push(signature.to_canonical()?);
        }
        info!("pegout signed key_id={} txid={} inputs={} version={}", key_id, request.tx.txid_hex(), signatures.len(), version);
        Ok(signatures)
    }

    fn receipt(&self, request: &PegoutSigningRequest) -> Result<ReceiptProof> {
        self.receipts.receipt_proof(&request.release_tx_hash, &request.release_block_hash)?.ok_or_else(|| BridgeError::ReceiptNotFound {
            tx_hash: request.release_tx_hash.to_string(),
            block_hash: request.release_block_hash.to_string(),
        })
    }
}

/// Envelope for one input: a bare sighash for version 1, the full pegout context afterwards.
fn build_envelope(
    version: ProtocolVersion,
    tx: &BtcTransaction,
    input_index: u32,
    input: &PegoutInput,
    receipt: Option<&ReceiptProof>,
) -> Result<SignEnvelope> {
    let Some(receipt) = receipt else {
        let hash = match input.segwit_outpoint_value {
            Some(amount) => segwit_sighash(tx, input_index, &input.script_code, amount)?,
            None => legacy_sighash(tx, input_index, &input.script_code)?,
        };
        return Ok(SignEnvelope::hash(hash));
    };
    Ok(SignEnvelope::pegout(PegoutInputEnvelope {
        tx: tx.clone(),
        input_index,
        script_code: input.script_code.clone(),
        receipt: receipt.clone(),
        sighash: SighashSpec::for_version(version, input.segwit_outpoint_value)?,
    }))
}
