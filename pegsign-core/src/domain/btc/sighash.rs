use crate::domain::btc::tx::{write_input, write_output, write_script, write_varint, BtcTransaction};
use crate::foundation::util::sha256d;
use crate::foundation::{Hash32, Result, SIGHASH_ALL};
use serde::{Deserialize, Serialize};

/// How the sighash of a pegout input is computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SighashMode {
    Legacy,
    Segwit,
}

impl SighashMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Segwit => "segwit",
        }
    }
}

/// SIGHASH_ALL digest for a non-witness input spending `script_code`.
pub fn legacy_sighash(tx: &BtcTransaction, input_index: u32, script_code: &[u8]) -> Result<Hash32> {
    tx.input(input_index)?;

    let mut preimage = Vec::with_capacity(64 + tx.inputs.len() * 41 + tx.outputs.len() * 34 + script_code.len());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    write_varint(&mut preimage, tx.inputs.len() as u64);
    for (idx, input) in tx.inputs.iter().enumerate() {
        let script: &[u8] = if idx == input_index as usize { script_code } else { &[] };
        write_input(&mut preimage, input, script);
    }
    write_varint(&mut preimage, tx.outputs.len() as u64);
    for output in &tx.outputs {
        write_output(&mut preimage, output);
    }
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
    Ok(sha256d(&preimage))
}

/// BIP143 SIGHASH_ALL digest for a witness input spending `amount` satoshis.
pub fn segwit_sighash(tx: &BtcTransaction, input_index: u32, script_code: &[u8], amount: u64) -> Result<Hash32> {
    let input = tx.input(input_index)?;

    let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
    let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
    for txin in &tx.inputs {
        prevouts.extend_from_slice(&txin.prev_txid);
        prevouts.extend_from_slice(&txin.prev_vout.to_le_bytes());
        sequences.extend_from_slice(&txin.sequence.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for output in &tx.outputs {
        write_output(&mut outputs, output);
    }

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&prevouts));
    preimage.extend_from_slice(&sha256d(&sequences));
    preimage.extend_from_slice(&input.prev_txid);
    preimage.extend_from_slice(&input.prev_vout.to_le_bytes());
    write_script(&mut preimage, script_code);
    preimage.extend_from_slice(&amount.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&outputs));
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
    Ok(sha256d(&preimage))
}
