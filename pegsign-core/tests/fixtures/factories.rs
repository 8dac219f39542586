#![allow(dead_code)]

use crate::fixtures::{
    TestChain, TEST_BTC_REMOTE_KEY_ID, TEST_BTC_SECRET, TEST_DIFFICULTY_TARGET, TEST_MST_REMOTE_KEY_ID, TEST_MST_SECRET,
    TEST_RSK_REMOTE_KEY_ID, TEST_RSK_SECRET,
};
use async_trait::async_trait;
use pegsign_core::application::{BookkeepingClient, BookkeepingService, BookkeepingSettings, RemoteSigner};
use pegsign_core::domain::chain::ReceiptProof;
use pegsign_core::foundation::{BlockHash, KeyId, ProtocolVersion, TxHash};
use pegsign_core::infrastructure::chain::MemoryReceiptProofStore;
use pegsign_core::infrastructure::config::{AppConfig, KeyConfig};
use pegsign_core::infrastructure::signer::{ConnectionPool, SignerConnection, SignerProtocol, SimulatedSigner, SimulatedSignerConfig};
use secp256k1::SecretKey;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub fn secret(bytes: [u8; 32]) -> SecretKey {
    SecretKey::from_slice(&bytes).expect("test secret key")
}

pub fn simulator_config(version: ProtocolVersion) -> SimulatedSignerConfig {
    SimulatedSignerConfig { version, difficulty_target: TEST_DIFFICULTY_TARGET, ..Default::default() }
}

/// Simulated device holding the three federation keys.
pub fn simulator_with(config: SimulatedSignerConfig) -> SimulatedSigner {
    SimulatedSigner::new(config)
        .with_key(TEST_BTC_REMOTE_KEY_ID, secret(TEST_BTC_SECRET))
        .with_key(TEST_RSK_REMOTE_KEY_ID, secret(TEST_RSK_SECRET))
        .with_key(TEST_MST_REMOTE_KEY_ID, secret(TEST_MST_SECRET))
}

pub fn simulator(version: ProtocolVersion) -> SimulatedSigner {
    simulator_with(simulator_config(version))
}

/// Simulated device whose chain pointer sits at `height` of `chain`, with no ancestor yet.
pub fn provisioned_simulator(version: ProtocolVersion, chain: &TestChain, height: u64) -> SimulatedSigner {
    let sim = simulator(version);
    sim.set_chain_pointer(chain.hash(height), BlockHash::ZERO);
    sim
}

pub fn protocol(sim: &SimulatedSigner) -> Arc<SignerProtocol> {
    protocol_with_attempts(sim, 3)
}

pub fn protocol_with_attempts(sim: &SimulatedSigner, max_attempts: usize) -> Arc<SignerProtocol> {
    Arc::new(SignerProtocol::new(sim.pool(), max_attempts, Duration::from_millis(1)))
}

/// Pool that holds every lease back by `delay`, keeping requests in flight long enough to race.
pub struct SlowPool {
    inner: Arc<dyn ConnectionPool>,
    delay: Duration,
}

#[async_trait]
impl ConnectionPool for SlowPool {
    async fn acquire(&self) -> pegsign_core::Result<Box<dyn SignerConnection>> {
        tokio::time::sleep(self.delay).await;
        self.inner.acquire().await
    }

    fn release(&self, connection: Box<dyn SignerConnection>) {
        self.inner.release(connection);
    }
}

pub fn slow_protocol(sim: &SimulatedSigner, delay: Duration) -> Arc<SignerProtocol> {
    let pool = Arc::new(SlowPool { inner: sim.pool(), delay });
    Arc::new(SignerProtocol::new(pool, 3, Duration::from_millis(1)))
}

pub fn remote_keys() -> BTreeMap<KeyId, String> {
    BTreeMap::from([
        (KeyId::btc(), TEST_BTC_REMOTE_KEY_ID.to_string()),
        (KeyId::rsk(), TEST_RSK_REMOTE_KEY_ID.to_string()),
        (KeyId::mst(), TEST_MST_REMOTE_KEY_ID.to_string()),
    ])
}

pub fn remote_signer(protocol: Arc<SignerProtocol>) -> Arc<RemoteSigner> {
    Arc::new(RemoteSigner::new("remote:simulated", protocol, remote_keys()))
}

pub fn bookkeeping_client(protocol: Arc<SignerProtocol>, max_chunk_size: usize) -> Arc<BookkeepingClient> {
    Arc::new(BookkeepingClient::new(protocol, max_chunk_size))
}

/// Settings whose interval never fires during a test; ticks are driven by hand.
pub fn bookkeeping_settings() -> BookkeepingSettings {
    BookkeepingSettings {
        difficulty_target: TEST_DIFFICULTY_TARGET,
        difficulty_cap: u128::MAX,
        max_confirmed_blocks: 100,
        interval: Duration::from_secs(3_600),
        disabled: false,
        stop_on_desync: false,
    }
}

pub fn bookkeeping_service(client: Arc<BookkeepingClient>, chain: &TestChain, settings: BookkeepingSettings) -> Arc<BookkeepingService> {
    Arc::new(BookkeepingService::new(client, chain.chain_store(), settings))
}

pub fn receipt_proof() -> ReceiptProof {
    ReceiptProof { receipt: vec![0xf9, 0x01, 0x02, 0x03], merkle_proof: vec![vec![0xaa; 32], vec![0xbb; 32]] }
}

pub fn receipt_store(tx_hash: TxHash, block_hash: BlockHash) -> Arc<MemoryReceiptProofStore> {
    let store = MemoryReceiptProofStore::new();
    store.insert(tx_hash, block_hash, receipt_proof()).expect("insert receipt");
    Arc::new(store)
}

/// Regtest configuration with every key served by the remote signer.
pub fn remote_app_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.signer.max_attempts = 2;
    config.signer.interval_between_attempts_ms = 1;
    config.keys = vec![
        KeyConfig::Remote { key_id: KeyId::btc(), remote_key_id: Some(TEST_BTC_REMOTE_KEY_ID.to_string()) },
        KeyConfig::Remote { key_id: KeyId::rsk(), remote_key_id: Some(TEST_RSK_REMOTE_KEY_ID.to_string()) },
        KeyConfig::Remote { key_id: KeyId::mst(), remote_key_id: Some(TEST_MST_REMOTE_KEY_ID.to_string()) },
    ];
    config
}
