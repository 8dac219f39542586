//! Typed chain-tracking commands over the remote signer protocol.

use crate::domain::chain::{Block, BlockHeader};
use crate::domain::pointer::{ChainParameters, RemoteChainPointer};
use crate::foundation::util::parse_u128;
use crate::foundation::{BlockHash, BridgeError, ProtocolVersion, Result, MAX_SIBLING_HEADERS_PER_BLOCK, SIBLING_HEADERS_MIN_VERSION};
use crate::infrastructure::signer::commands::{
    CMD_ADVANCE_BLOCKCHAIN, CMD_BLOCKCHAIN_PARAMETERS, CMD_BLOCKCHAIN_STATE, CMD_RESET_ADVANCE_BLOCKCHAIN, CMD_UPDATE_ANCESTOR_BLOCK,
    FIELD_BLOCKS, FIELD_BROTHERS, FIELD_PARAMETERS, FIELD_STATE,
};
use crate::infrastructure::signer::{command, ResponseCode, SignerProtocol};
use log::{debug, info};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct BookkeepingClient {
    protocol: Arc<SignerProtocol>,
    max_chunk_size: usize,
    /// Serializes advance and reset so at most one is outstanding against the device.
    advance_lock: Mutex<()>,
}

impl BookkeepingClient {
    pub fn new(protocol: Arc<SignerProtocol>, max_chunk_size: usize) -> Self {
        Self { protocol, max_chunk_size: max_chunk_size.max(2), advance_lock: Mutex::new(()) }
    }

    pub fn protocol(&self) -> &Arc<SignerProtocol> {
        &self.protocol
    }

    /// Negotiated version, probing the device if nothing was negotiated yet.
    pub async fn version(&self) -> Result<ProtocolVersion> {
        match self.protocol.version() {
            Some(version) => Ok(version),
            None => self.protocol.negotiate().await,
        }
    }

    async fn require_bookkeeping(&self, command: &str) -> Result<ProtocolVersion> {
        let version = self.version().await?;
        if !version.supports_bookkeeping() {
            return Err(BridgeError::UnsupportedVersion { version: version.number(), key_id: command.to_string() });
        }
        Ok(version)
    }

    async fn execute(&self, request: Value, required_fields: &[&str]) -> Result<(Value, ResponseCode)> {
        let result = self.protocol.execute(request, required_fields).await;
        if let Err(err) = &result {
            if err.is_version_changed() {
                info!("remote signer version changed; renegotiating on next command");
                self.protocol.clear_version();
            }
        }
        result
    }

    pub async fn get_chain_pointer(&self) -> Result<RemoteChainPointer> {
        self.require_bookkeeping(CMD_BLOCKCHAIN_STATE).await?;
        let (response, _) = self.execute(command(CMD_BLOCKCHAIN_STATE), &[FIELD_STATE]).await?;
        parse_chain_pointer(&response[FIELD_STATE])
    }

    pub async fn get_chain_parameters(&self) -> Result<ChainParameters> {
        self.require_bookkeeping(CMD_BLOCKCHAIN_PARAMETERS).await?;
        let (response, _) = self.execute(command(CMD_BLOCKCHAIN_PARAMETERS), &[FIELD_PARAMETERS]).await?;
        parse_chain_parameters(&response[FIELD_PARAMETERS])
    }

    /// Submits `blocks` (oldest first, contiguous) in chunks.
    ///
    /// `successor` is the canonical block following the last one, whose uncles become the last
    /// block's sibling headers. Partial success is an accepted outcome; the last chunk's code is
    /// returned.
    pub async fn advance_chain(&self, blocks: &[Block], successor: Option<&Block>) -> Result<ResponseCode> {
        let version = self.require_bookkeeping(CMD_ADVANCE_BLOCKCHAIN).await?;
        let _guard = self.advance_lock.lock().await;
        let with_siblings = version.number() >= SIBLING_HEADERS_MIN_VERSION;

        let mut outcome = ResponseCode::Success;
        for (index, chunk) in blocks.chunks(self.max_chunk_size).enumerate() {
            let chunk_start = index * self.max_chunk_size;
            let next_after_chunk = blocks.get(chunk_start + chunk.len()).or(successor);
            let request = advance_request(chunk, next_after_chunk, with_siblings);
            debug!(
                "advancing remote chain chunk_index={} chunk_len={} first_block={} with_siblings={}",
                index,
                chunk.len(),
                chunk[0].number(),
                with_siblings
            );
            let (_, code) = self.execute(request, &[]).await?;
            outcome = code;
        }
        Ok(outcome)
    }

    /// Submits an ancestor path, newest first, in chunks that overlap by one header.
    pub async fn update_ancestor(&self, headers: &[BlockHeader]) -> Result<()> {
        self.require_bookkeeping(CMD_UPDATE_ANCESTOR_BLOCK).await?;
        if headers.is_empty() {
            return Ok(());
        }
        let mut start = 0;
        loop {
            let end = (start + self.max_chunk_size).min(headers.len());
            let chunk = &headers[start..end];
            debug!("updating remote ancestor chunk_start={} chunk_len={}", start, chunk.len());
            let mut request = command(CMD_UPDATE_ANCESTOR_BLOCK);
            request[FIELD_BLOCKS] = encode_headers(chunk.iter());
            self.execute(request, &[]).await?;
            if end == headers.len() {
                return Ok(());
            }
            start = end - 1;
        }
    }

    pub async fn reset_chain_tracking(&self) -> Result<()> {
        self.require_bookkeeping(CMD_RESET_ADVANCE_BLOCKCHAIN).await?;
        let _guard = self.advance_lock.lock().await;
        self.execute(command(CMD_RESET_ADVANCE_BLOCKCHAIN), &[]).await?;
        info!("remote chain tracking reset");
        Ok(())
    }
}

/// Uncles of `successor` that share `block`'s parent, capped per block.
pub fn sibling_headers<'a>(block: &Block, successor: Option<&'a Block>) -> Vec<&'a BlockHeader> {
    let Some(successor) = successor else {
        return Vec::new();
    };
    successor
        .uncles
        .iter()
        .filter(|uncle| uncle.parent_hash == block.parent_hash() && uncle.hash != block.hash())
        .take(MAX_SIBLING_HEADERS_PER_BLOCK)
        .collect()
}

fn encode_headers<'a>(headers: impl Iterator<Item = &'a BlockHeader>) -> Value {
    Value::Array(headers.map(|h| Value::from(hex::encode(&h.encoded))).collect())
}

/// Builds one advance request; from the sibling dialect on, headers go newest first.
fn advance_request(chunk: &[Block], next_after_chunk: Option<&Block>, with_siblings: bool) -> Value {
    let mut request = command(CMD_ADVANCE_BLOCKCHAIN);
    if !with_siblings {
        request[FIELD_BLOCKS] = encode_headers(chunk.iter().map(|b| &b.header));
        return request;
    }
    let successors = chunk.iter().skip(1).map(Some).chain(std::iter::once(next_after_chunk));
    let brothers: Vec<Value> =
        chunk.iter().zip(successors).map(|(block, successor)| encode_headers(sibling_headers(block, successor).into_iter())).collect();
    request[FIELD_BLOCKS] = encode_headers(chunk.iter().rev().map(|b| &b.header));
    request[FIELD_BROTHERS] = Value::Array(brothers.into_iter().rev().collect());
    request
}

fn hash_field(obj: &Value, command: &str, field: &str) -> Result<BlockHash> {
    let text = obj.get(field).and_then(Value::as_str).ok_or_else(|| BridgeError::missing_field(command, field))?;
    text.parse().map_err(|err| BridgeError::protocol_violation(command, format!("{}: {}", field, err)))
}

fn optional_hash_field(obj: &Value, command: &str, field: &str) -> Result<Option<BlockHash>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => hash_field(obj, command, field).map(Some),
    }
}

pub fn parse_chain_pointer(state: &Value) -> Result<RemoteChainPointer> {
    let cmd = CMD_BLOCKCHAIN_STATE;
    let updating = state.get("updating").ok_or_else(|| BridgeError::missing_field(cmd, "updating"))?;
    let in_progress =
        updating.get("in_progress").and_then(Value::as_bool).ok_or_else(|| BridgeError::missing_field(cmd, "updating.in_progress"))?;
    Ok(RemoteChainPointer {
        best_block_hash: hash_field(state, cmd, "best_block")?,
        ancestor_block_hash: hash_field(state, cmd, "ancestor_block")?,
        in_progress,
        next_expected_block_hash: optional_hash_field(updating, cmd, "next_expected_block")?,
        newest_valid_block_hash: optional_hash_field(state, cmd, "newest_valid_block")?,
        ancestor_receipts_root: optional_hash_field(state, cmd, "ancestor_receipts_root")?,
    })
}

pub fn parse_chain_parameters(parameters: &Value) -> Result<ChainParameters> {
    let cmd = CMD_BLOCKCHAIN_PARAMETERS;
    let minimum_difficulty = match parameters.get("minimum_difficulty") {
        Some(Value::String(text)) => parse_u128(text).map_err(|err| BridgeError::protocol_violation(cmd, err.to_string()))?,
        Some(Value::Number(number)) => number
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| BridgeError::protocol_violation(cmd, format!("minimum_difficulty is not unsigned: {}", number)))?,
        _ => return Err(BridgeError::missing_field(cmd, "minimum_difficulty")),
    };
    let network = parameters.get("network").and_then(Value::as_str).ok_or_else(|| BridgeError::missing_field(cmd, "network"))?;
    Ok(ChainParameters { checkpoint: hash_field(parameters, cmd, "checkpoint")?, minimum_difficulty, network: network.to_string() })
}
