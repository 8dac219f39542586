use crate::fixtures::{
    receipt_store, remote_app_config, secret, simulator, simulator_config, ChainBuilder, TEST_BTC_REMOTE_KEY_ID, TEST_BTC_SECRET,
    TEST_MST_REMOTE_KEY_ID, TEST_MST_SECRET, TEST_RELEASE_TX_HASH, TEST_RSK_REMOTE_KEY_ID, TEST_RSK_SECRET,
};
use pegsign_core::application::BridgeContext;
use pegsign_core::domain::signing::Signer;
use pegsign_core::foundation::{BridgeError, KeyId, ProtocolVersion, TxHash};
use pegsign_core::infrastructure::config::{AppConfig, KeyConfig, Network};
use pegsign_core::infrastructure::signer::commands::CMD_BLOCKCHAIN_PARAMETERS;
use pegsign_core::infrastructure::signer::SimulatedSigner;

fn context(sim: &SimulatedSigner, config: AppConfig) -> BridgeContext {
    let chain = ChainBuilder::default().build();
    let receipts = receipt_store(TxHash::new(TEST_RELEASE_TX_HASH), chain.hash(1));
    BridgeContext::build(config, sim.pool(), chain.chain_store(), receipts).expect("build context")
}

#[tokio::test]
async fn test_startup_when_every_key_served_then_report_lists_keys_and_parameters() {
    let sim = simulator(ProtocolVersion::V4);
    let ctx = context(&sim, remote_app_config());

    let report = ctx.startup_check().run().await.expect("startup check");
    assert_eq!(report.keys.len(), 3);
    assert!(report.keys.iter().all(|key| key.version == ProtocolVersion::V4));
    let btc = report.keys.iter().find(|key| key.key_id == KeyId::btc()).expect("btc key");
    let expected = sim.public_key(TEST_BTC_REMOTE_KEY_ID).expect("device key").serialize_uncompressed().to_vec();
    assert_eq!(btc.public_key, expected);

    let parameters = report.parameters.expect("chain parameters");
    assert_eq!(parameters.network, "regtest");
    assert_eq!(parameters.minimum_difficulty, 1);
}

#[tokio::test]
async fn test_startup_when_device_provisioned_for_other_network_then_config_error() {
    let mut config = simulator_config(ProtocolVersion::V3);
    config.network = "testnet".to_string();
    let sim = SimulatedSigner::new(config)
        .with_key(TEST_BTC_REMOTE_KEY_ID, secret(TEST_BTC_SECRET))
        .with_key(TEST_RSK_REMOTE_KEY_ID, secret(TEST_RSK_SECRET))
        .with_key(TEST_MST_REMOTE_KEY_ID, secret(TEST_MST_SECRET));
    let ctx = context(&sim, remote_app_config());

    let err = ctx.startup_check().run().await.expect_err("network mismatch");
    assert!(matches!(err, BridgeError::ConfigError(ref message) if message.contains("testnet")), "{}", err);
}

#[tokio::test]
async fn test_startup_when_device_lacks_a_key_then_check_fails() {
    let sim = SimulatedSigner::new(simulator_config(ProtocolVersion::V3)).with_key(TEST_BTC_REMOTE_KEY_ID, secret(TEST_BTC_SECRET));
    let ctx = context(&sim, remote_app_config());

    let err = ctx.startup_check().run().await.expect_err("missing key");
    assert!(matches!(err, BridgeError::ConfigError(ref message) if message.contains("unavailable")), "{}", err);
}

#[tokio::test]
async fn test_startup_when_device_speaks_version_one_then_parameters_are_skipped() {
    let sim = simulator(ProtocolVersion::V1);
    let ctx = context(&sim, remote_app_config());

    let report = ctx.startup_check().run().await.expect("startup check");
    assert!(report.parameters.is_none());
    assert!(sim.requests_for(CMD_BLOCKCHAIN_PARAMETERS).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_startup_when_key_file_backs_one_key_then_composite_routes_it_locally() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("temp dir");
    let key_path = dir.path().join("mst.key");
    std::fs::write(&key_path, hex::encode(TEST_MST_SECRET)).expect("write key");
    std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).expect("chmod");

    let mut config = remote_app_config();
    config.network = Network::Regtest;
    config.keys.retain(|key| key.key_id() != &KeyId::mst());
    config.keys.push(KeyConfig::KeyFile { key_id: KeyId::mst(), path: key_path.display().to_string() });
    let sim = simulator(ProtocolVersion::V3);
    let ctx = context(&sim, config);

    let report = ctx.startup_check().run().await.expect("startup check");
    let mst = report.keys.iter().find(|key| key.key_id == KeyId::mst()).expect("mst key");
    assert_eq!(mst.version, ProtocolVersion::V1);
    assert_eq!(ctx.signer.signers().len(), 2);
    assert!(ctx.signer.can_sign_with(&KeyId::mst()));
}

#[test]
fn test_context_when_config_invalid_then_build_fails() {
    let sim = simulator(ProtocolVersion::V3);
    let mut config = remote_app_config();
    config.signer.max_attempts = 0;
    let chain = ChainBuilder::default().build();
    let receipts = receipt_store(TxHash::new(TEST_RELEASE_TX_HASH), chain.hash(1));
    let result = BridgeContext::build(config, sim.pool(), chain.chain_store(), receipts);
    assert!(matches!(result, Err(BridgeError::ConfigError(_))));
}
