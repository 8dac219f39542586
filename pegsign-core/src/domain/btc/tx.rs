//! Minimal base-chain transaction with consensus (non-witness) serialization.

use crate::foundation::util::sha256d;
use crate::foundation::{BridgeError, Hash32, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Previous txid in internal (little-endian) byte order.
    pub prev_txid: Hash32,
    pub prev_vout: u32,
    #[serde(with = "hex_vec")]
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    #[serde(with = "hex_vec")]
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcTransaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl BtcTransaction {
    /// Legacy serialization; witness data is never carried by unsigned pegouts.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10 + self.inputs.len() * 41 + self.outputs.len() * 34);
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            write_input(&mut out, input, &input.script_sig);
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            write_output(&mut out, output);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_u32()? as i32;
        let input_count = reader.read_varint()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            let prev_txid = reader.read_hash()?;
            let prev_vout = reader.read_u32()?;
            let script_len = reader.read_varint()?;
            let script_sig = reader.read_bytes(script_len as usize)?.to_vec();
            let sequence = reader.read_u32()?;
            inputs.push(TxIn { prev_txid, prev_vout, script_sig, sequence });
        }
        let output_count = reader.read_varint()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            let value = reader.read_u64()?;
            let script_len = reader.read_varint()?;
            let script_pubkey = reader.read_bytes(script_len as usize)?.to_vec();
            outputs.push(TxOut { value, script_pubkey });
        }
        let lock_time = reader.read_u32()?;
        if !reader.is_empty() {
            return Err(BridgeError::EncodingError(format!("{} trailing bytes after transaction", reader.remaining())));
        }
        Ok(Self { version, inputs, outputs, lock_time })
    }

    /// Txid in internal byte order.
    pub fn txid(&self) -> Hash32 {
        sha256d(&self.serialize())
    }

    /// Txid as displayed by block explorers (reversed).
    pub fn txid_hex(&self) -> String {
        let mut id = self.txid();
        id.reverse();
        hex::encode(id)
    }

    pub fn input(&self, index: u32) -> Result<&TxIn> {
        self.inputs
            .get(index as usize)
            .ok_or(BridgeError::InvalidInputIndex { index, max: self.inputs.len().saturating_sub(1) as u32 })
    }
}

pub(crate) fn write_input(out: &mut Vec<u8>, input: &TxIn, script: &[u8]) {
    out.extend_from_slice(&input.prev_txid);
    out.extend_from_slice(&input.prev_vout.to_le_bytes());
    write_script(out, script);
    out.extend_from_slice(&input.sequence.to_le_bytes());
}

pub(crate) fn write_output(out: &mut Vec<u8>, output: &TxOut) {
    out.extend_from_slice(&output.value.to_le_bytes());
    write_script(out, &output.script_pubkey);
}

pub(crate) fn write_script(out: &mut Vec<u8>, script: &[u8]) {
    write_varint(out, script.len() as u64);
    out.extend_from_slice(script);
}

pub(crate) fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(BridgeError::EncodingError(format!(
                "truncated transaction: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_hash(&mut self) -> Result<Hash32> {
        self.read_array()
    }

    fn read_varint(&mut self) -> Result<u64> {
        let [prefix] = self.read_array::<1>()?;
        Ok(match prefix {
            0xfd => u16::from_le_bytes(self.read_array()?) as u64,
            0xfe => u32::from_le_bytes(self.read_array()?) as u64,
            0xff => u64::from_le_bytes(self.read_array()?),
            n => n as u64,
        })
    }
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
