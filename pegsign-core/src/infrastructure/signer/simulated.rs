//! In-process remote signer speaking the wire protocol, for tests and devnets.
//!
//! Keeps its own chain pointer and re-runs confirmation over submitted headers, so a bridge can
//! be exercised end to end without hardware. Sibling headers are validated for shape only and do
//! not contribute work.

use crate::domain::btc::{legacy_sighash, segwit_sighash, BtcTransaction};
use crate::domain::chain::BlockHeader;
use crate::foundation::util::decode_hex;
use crate::foundation::{BlockHash, BridgeError, Hash32, ProtocolVersion, Result, DIFFICULTY_CAP_MIN_VERSION, SIBLING_HEADERS_MIN_VERSION};
use crate::infrastructure::signer::codes::*;
use crate::infrastructure::signer::commands::*;
use crate::infrastructure::signer::connection::{command_of, SignerConnection};
use crate::infrastructure::signer::pool::ConnectionPool;
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct SimulatedSignerConfig {
    pub version: ProtocolVersion,
    pub difficulty_target: u128,
    pub difficulty_cap: u128,
    pub network: String,
    pub checkpoint: BlockHash,
    pub minimum_difficulty: u128,
    /// Leave the recovery byte out of sign responses.
    pub omit_recovery_byte: bool,
}

impl Default for SimulatedSignerConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V3,
            difficulty_target: 10,
            difficulty_cap: u128::MAX,
            network: "regtest".to_string(),
            checkpoint: BlockHash::ZERO,
            minimum_difficulty: 1,
            omit_recovery_byte: false,
        }
    }
}

#[derive(Default)]
struct ChainPointerState {
    best_block: BlockHash,
    ancestor_block: BlockHash,
    newest_valid_block: BlockHash,
    pending: VecDeque<BlockHeader>,
    accumulated: u128,
}

struct SimState {
    config: SimulatedSignerConfig,
    keys: HashMap<String, SecretKey>,
    chain: ChainPointerState,
    scripted: VecDeque<(String, i64)>,
    requests: Vec<Value>,
}

/// Exchange and pool counters, observable from tests.
#[derive(Default)]
pub struct SimulatedStats {
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub exchanges: AtomicUsize,
    pub connect_failures: AtomicUsize,
}

#[derive(Clone)]
pub struct SimulatedSigner {
    state: Arc<Mutex<SimState>>,
    stats: Arc<SimulatedStats>,
    unreachable: Arc<AtomicBool>,
}

impl SimulatedSigner {
    pub fn new(config: SimulatedSignerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                config,
                keys: HashMap::new(),
                chain: ChainPointerState::default(),
                scripted: VecDeque::new(),
                requests: Vec::new(),
            })),
            stats: Arc::new(SimulatedStats::default()),
            unreachable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_key(self, remote_key_id: impl Into<String>, secret: SecretKey) -> Self {
        self.state.lock().keys.insert(remote_key_id.into(), secret);
        self
    }

    pub fn public_key(&self, remote_key_id: &str) -> Option<PublicKey> {
        let state = self.state.lock();
        state.keys.get(remote_key_id).map(|secret| PublicKey::from_secret_key(&Secp256k1::new(), secret))
    }

    /// Sets the chain pointer as if the device had been provisioned at `best`.
    pub fn set_chain_pointer(&self, best: BlockHash, ancestor: BlockHash) {
        let mut state = self.state.lock();
        state.chain = ChainPointerState { best_block: best, ancestor_block: ancestor, newest_valid_block: best, ..Default::default() };
    }

    /// Leaves an advance operation half done, as after a crash mid-update.
    pub fn set_in_progress(&self, pending: Vec<BlockHeader>) {
        let mut state = self.state.lock();
        state.chain.pending = pending.into();
    }

    pub fn best_block(&self) -> BlockHash {
        self.state.lock().chain.best_block
    }

    pub fn ancestor_block(&self) -> BlockHash {
        self.state.lock().chain.ancestor_block
    }

    pub fn in_progress(&self) -> bool {
        !self.state.lock().chain.pending.is_empty()
    }

    /// Changes the device version; requests stamped with the old one get "version changed".
    pub fn set_version(&self, version: ProtocolVersion) {
        self.state.lock().config.version = version;
    }

    /// Answers the next `command` request with `code` instead of processing it.
    pub fn script_response(&self, command: &str, code: i64) {
        self.state.lock().scripted.push_back((command.to_string(), code));
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &SimulatedStats {
        &self.stats
    }

    pub fn requests(&self) -> Vec<Value> {
        self.state.lock().requests.clone()
    }

    pub fn requests_for(&self, command: &str) -> Vec<Value> {
        self.state.lock().requests.iter().filter(|r| command_of(r) == command).cloned().collect()
    }

    pub fn pool(&self) -> Arc<dyn ConnectionPool> {
        Arc::new(SimulatedPool { signer: self.clone() })
    }

    /// Serves the line protocol on `listener` until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, peer) = listener.accept().await?;
            debug!("simulated signer accepted connection peer={}", peer);
            let signer = self.clone();
            tokio::spawn(async move {
                let mut stream = BufReader::new(socket);
                let mut line = String::new();
                loop {
                    line.clear();
                    match stream.read_line(&mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                    let reply = match serde_json::from_str::<Value>(line.trim_end()) {
                        Ok(request) => signer.handle(&request),
                        Err(_) => json!({ FIELD_ERROR_CODE: CODE_FORMAT_ERROR }),
                    };
                    if stream.get_mut().write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    }

    /// Processes one request and returns the response object.
    pub fn handle(&self, request: &Value) -> Value {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        let command = command_of(request).to_string();

        if let Some(pos) = state.scripted.iter().position(|(cmd, _)| *cmd == command) {
            if let Some((_, code)) = state.scripted.remove(pos) {
                debug!("simulated signer scripted response command={} code={}", command, code);
                return json!({ FIELD_ERROR_CODE: code });
            }
        }

        let version = state.config.version;
        if command != CMD_VERSION {
            if let Some(requested) = request.get(FIELD_VERSION).and_then(Value::as_u64) {
                if requested != u64::from(version.number()) {
                    return json!({ FIELD_ERROR_CODE: CODE_VERSION_CHANGED });
                }
            }
        }

        let outcome = match command.as_str() {
            CMD_VERSION => Ok(json!({ FIELD_VERSION: version.number() })),
            CMD_GET_PUBKEY => state.get_pub_key(request),
            CMD_SIGN => state.sign(request),
            CMD_BLOCKCHAIN_STATE if version.supports_bookkeeping() => Ok(state.blockchain_state()),
            CMD_ADVANCE_BLOCKCHAIN if version.supports_bookkeeping() => state.advance(request),
            CMD_UPDATE_ANCESTOR_BLOCK if version.supports_bookkeeping() => state.update_ancestor(request),
            CMD_RESET_ADVANCE_BLOCKCHAIN if version.supports_bookkeeping() => {
                state.chain.pending.clear();
                state.chain.accumulated = 0;
                Ok(json!({}))
            }
            CMD_BLOCKCHAIN_PARAMETERS if version.supports_bookkeeping() => Ok(state.parameters()),
            _ => Err(CODE_UNKNOWN_COMMAND),
        };

        match outcome {
            Ok(mut body) => {
                if body.get(FIELD_ERROR_CODE).is_none() {
                    if let Some(obj) = body.as_object_mut() {
                        obj.insert(FIELD_ERROR_CODE.to_string(), json!(CODE_SUCCESS));
                    }
                }
                body
            }
            Err(code) => {
                debug!("simulated signer rejected command={} code={}", command, code);
                json!({ FIELD_ERROR_CODE: code })
            }
        }
    }
}

type Handled = std::result::Result<Value, i64>;

impl SimState {
    fn get_pub_key(&self, request: &Value) -> Handled {
        let key_id = request.get(FIELD_KEY_ID).and_then(Value::as_str).ok_or(CODE_INVALID_REQUEST)?;
        let secret = self.keys.get(key_id).ok_or(CODE_KEY_REJECTED)?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), secret);
        Ok(json!({ FIELD_PUBKEY: hex::encode(public.serialize_uncompressed()) }))
    }

    fn sign(&self, request: &Value) -> Handled {
        let key_id = request.get(FIELD_KEY_ID).and_then(Value::as_str).ok_or(CODE_INVALID_REQUEST)?;
        let secret = self.keys.get(key_id).ok_or(CODE_KEY_REJECTED)?;
        let message = request.get(FIELD_MESSAGE).ok_or(CODE_INVALID_REQUEST)?;
        let hash = if self.config.version == ProtocolVersion::V1 {
            let hex_hash = message.as_str().ok_or(CODE_INVALID_MESSAGE)?;
            hash_from_hex(hex_hash).ok_or(CODE_INVALID_MESSAGE)?
        } else if let Some(hex_hash) = message.get(MSG_HASH).and_then(Value::as_str) {
            hash_from_hex(hex_hash).ok_or(CODE_INVALID_MESSAGE)?
        } else {
            self.pegout_sighash(message, request.get(FIELD_AUTH))?
        };

        let secp = Secp256k1::new();
        let digest = Message::from_digest_slice(&hash).map_err(|_| CODE_INVALID_MESSAGE)?;
        let (rec_id, compact) = secp.sign_ecdsa_recoverable(&digest, secret).serialize_compact();
        let mut signature = json!({ "r": hex::encode(&compact[..32]), "s": hex::encode(&compact[32..]) });
        if !self.config.omit_recovery_byte {
            signature["v"] = json!(rec_id.to_i32());
        }
        Ok(json!({ FIELD_SIGNATURE: signature }))
    }

    fn pegout_sighash(&self, message: &Value, auth: Option<&Value>) -> std::result::Result<Hash32, i64> {
        let auth = auth.ok_or(CODE_AUTH_REJECTED)?;
        if auth.get(AUTH_RECEIPT).and_then(Value::as_str).is_none() || auth.get(AUTH_RECEIPT_MERKLE_PROOF).is_none() {
            return Err(CODE_AUTH_REJECTED);
        }
        if self.chain.ancestor_block.is_zero() {
            return Err(CODE_AUTH_REJECTED);
        }

        let tx_hex = message.get(MSG_TX).and_then(Value::as_str).ok_or(CODE_INVALID_MESSAGE)?;
        let tx = decode_hex(tx_hex).ok().and_then(|bytes| BtcTransaction::parse(&bytes).ok()).ok_or(CODE_INVALID_MESSAGE)?;
        let input = message.get(MSG_INPUT).and_then(Value::as_u64).and_then(|i| u32::try_from(i).ok()).ok_or(CODE_INVALID_MESSAGE)?;
        let mode = message.get(MSG_SIGHASH_MODE).and_then(Value::as_str);
        let version = self.config.version.number();

        let result = match (version, mode) {
            (2 | 3, None) | (4.., Some("legacy")) => {
                let script_code = tx.input(input).map_err(|_| CODE_INVALID_MESSAGE)?.script_sig.clone();
                legacy_sighash(&tx, input, &script_code)
            }
            (5.., Some("segwit")) => {
                let witness_script = message
                    .get(MSG_WITNESS_SCRIPT)
                    .and_then(Value::as_str)
                    .and_then(|s| decode_hex(s).ok())
                    .ok_or(CODE_INVALID_MESSAGE)?;
                let amount = message.get(MSG_OUTPOINT_VALUE).and_then(Value::as_u64).ok_or(CODE_INVALID_MESSAGE)?;
                segwit_sighash(&tx, input, &witness_script, amount)
            }
            _ => return Err(CODE_INVALID_MESSAGE),
        };
        result.map_err(|_| CODE_INVALID_MESSAGE)
    }

    fn blockchain_state(&self) -> Value {
        let chain = &self.chain;
        let next_expected = chain.pending.back().map(|h| h.hash.to_string());
        json!({
            FIELD_STATE: {
                "best_block": chain.best_block.to_string(),
                "newest_valid_block": chain.newest_valid_block.to_string(),
                "ancestor_block": chain.ancestor_block.to_string(),
                "ancestor_receipts_root": BlockHash::ZERO.to_string(),
                "updating": {
                    "in_progress": !chain.pending.is_empty(),
                    "next_expected_block": next_expected,
                }
            }
        })
    }

    fn parameters(&self) -> Value {
        json!({
            FIELD_PARAMETERS: {
                "checkpoint": self.config.checkpoint.to_string(),
                "minimum_difficulty": format!("{:#x}", self.config.minimum_difficulty),
                "network": self.config.network,
            }
        })
    }

    fn advance(&mut self, request: &Value) -> Handled {
        let version = self.config.version;
        let mut headers = decode_headers(request.get(FIELD_BLOCKS)).ok_or(CODE_INVALID_INPUT_BLOCKS)?;
        if headers.is_empty() {
            return Err(CODE_INVALID_INPUT_BLOCKS);
        }

        if version.number() >= SIBLING_HEADERS_MIN_VERSION {
            let brothers = request.get(FIELD_BROTHERS).and_then(Value::as_array).ok_or(CODE_INVALID_BROTHERS)?;
            if brothers.len() != headers.len() {
                return Err(CODE_INVALID_BROTHERS);
            }
            for (header, siblings) in headers.iter().zip(brothers) {
                let siblings = decode_headers(Some(siblings)).ok_or(CODE_INVALID_BROTHERS)?;
                if siblings.iter().any(|s| s.parent_hash != header.parent_hash || s.hash == header.hash) {
                    return Err(CODE_INVALID_BROTHERS);
                }
            }
            // Newest first on the wire from this version on.
            headers.reverse();
        }

        for pair in headers.windows(2) {
            if pair[1].parent_hash != pair[0].hash {
                warn!("simulated signer chaining mismatch at block_number={}", pair[1].number);
                return Err(CODE_CHAINING_MISMATCH);
            }
        }

        let chain = &mut self.chain;
        let first_parent = headers[0].parent_hash;
        if first_parent == chain.best_block {
            chain.pending.clear();
            chain.accumulated = 0;
        } else if chain.pending.back().map(|h| h.hash) != Some(first_parent) {
            return Err(CODE_CHAINING_MISMATCH);
        }

        let cap_active = version.number() >= DIFFICULTY_CAP_MIN_VERSION;
        let contribution = |h: &BlockHeader| if cap_active { h.difficulty.min(self.config.difficulty_cap) } else { h.difficulty };
        for header in headers {
            chain.newest_valid_block = header.hash;
            chain.accumulated = chain.accumulated.saturating_add(contribution(&header));
            chain.pending.push_back(header);
            while chain.accumulated >= self.config.difficulty_target {
                let Some(oldest) = chain.pending.pop_front() else {
                    break;
                };
                chain.accumulated = chain.accumulated.saturating_sub(contribution(&oldest));
                chain.best_block = oldest.hash;
            }
        }

        if chain.pending.is_empty() {
            Ok(json!({}))
        } else {
            Ok(json!({ FIELD_ERROR_CODE: CODE_PARTIAL_SUCCESS }))
        }
    }

    fn update_ancestor(&mut self, request: &Value) -> Handled {
        let headers = decode_headers(request.get(FIELD_BLOCKS)).ok_or(CODE_INVALID_INPUT_BLOCKS)?;
        let first = headers.first().ok_or(CODE_INVALID_INPUT_BLOCKS)?;
        if first.hash != self.chain.best_block && first.hash != self.chain.ancestor_block {
            return Err(CODE_TIP_MISMATCH);
        }
        for pair in headers.windows(2) {
            if pair[0].parent_hash != pair[1].hash {
                return Err(CODE_CHAINING_MISMATCH);
            }
        }
        if let Some(last) = headers.last() {
            self.chain.ancestor_block = last.hash;
        }
        Ok(json!({}))
    }
}

fn hash_from_hex(s: &str) -> Option<Hash32> {
    decode_hex(s).ok().and_then(|bytes| bytes.try_into().ok())
}

fn decode_headers(value: Option<&Value>) -> Option<Vec<BlockHeader>> {
    value?
        .as_array()?
        .iter()
        .map(|item| item.as_str().and_then(|s| decode_hex(s).ok()).and_then(|bytes| BlockHeader::decode(&bytes).ok()))
        .collect()
}

struct SimulatedPool {
    signer: SimulatedSigner,
}

#[async_trait]
impl ConnectionPool for SimulatedPool {
    async fn acquire(&self) -> Result<Box<dyn SignerConnection>> {
        self.signer.stats.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedConnection { signer: self.signer.clone() }))
    }

    fn release(&self, _connection: Box<dyn SignerConnection>) {
        self.signer.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct SimulatedConnection {
    signer: SimulatedSigner,
}

#[async_trait]
impl SignerConnection for SimulatedConnection {
    async fn exchange(&mut self, request: &Value) -> Result<Value> {
        let stats = &self.signer.stats;
        stats.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.signer.unreachable.load(Ordering::SeqCst) {
            stats.connect_failures.fetch_add(1, Ordering::SeqCst);
            return Err(BridgeError::transport("connect", "simulated signer unreachable"));
        }
        Ok(self.signer.handle(request))
    }
}
