use crate::fixtures::{
    bookkeeping_client, protocol, provisioned_simulator, receipt_store, remote_signer, ChainBuilder, PegoutRequestBuilder, TestChain,
    TEST_BTC_REMOTE_KEY_ID, TEST_OUTPOINT_VALUE, TEST_RELEASE_TX_HASH,
};
use pegsign_core::application::{AncestorReconciler, CompositeSigner, PegoutSigner, PegoutSigningRequest};
use pegsign_core::domain::btc::{legacy_sighash, segwit_sighash};
use pegsign_core::domain::signing::{CanonicalSignature, Signer};
use pegsign_core::foundation::{BridgeError, KeyId, ProtocolVersion, TxHash};
use pegsign_core::infrastructure::chain::MemoryReceiptProofStore;
use pegsign_core::infrastructure::signer::commands::{CMD_SIGN, CMD_UPDATE_ANCESTOR_BLOCK};
use pegsign_core::infrastructure::signer::SimulatedSigner;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1};
use std::sync::Arc;

const RELEASE_HEIGHT: u64 = 7;

struct Harness {
    chain: TestChain,
    sim: SimulatedSigner,
    pegout: PegoutSigner,
}

fn harness(version: ProtocolVersion) -> Harness {
    let chain = ChainBuilder::default().length(12).build();
    harness_with_receipts(version, chain, |chain| receipt_store(TxHash::new(TEST_RELEASE_TX_HASH), chain.hash(RELEASE_HEIGHT)))
}

fn harness_with_receipts(
    version: ProtocolVersion,
    chain: TestChain,
    receipts: impl FnOnce(&TestChain) -> Arc<MemoryReceiptProofStore>,
) -> Harness {
    let sim = provisioned_simulator(version, &chain, 10);
    let protocol = protocol(&sim);
    let signer = Arc::new(CompositeSigner::new(vec![remote_signer(protocol.clone()) as Arc<dyn Signer>]));
    let reconciler = Arc::new(AncestorReconciler::new(bookkeeping_client(protocol, 100), chain.chain_store()));
    let pegout = PegoutSigner::new(signer, reconciler, receipts(&chain));
    Harness { chain, sim, pegout }
}

fn request(harness: &Harness, segwit: bool) -> PegoutSigningRequest {
    PegoutRequestBuilder::default().input_count(2).segwit(segwit).release_block_hash(harness.chain.hash(RELEASE_HEIGHT)).build()
}

fn assert_signatures_verify(harness: &Harness, request: &PegoutSigningRequest, signatures: &[CanonicalSignature]) {
    let secp = Secp256k1::new();
    let public_key = harness.sim.public_key(TEST_BTC_REMOTE_KEY_ID).expect("device key");
    assert_eq!(signatures.len(), request.inputs.len());
    for (index, (signature, input)) in signatures.iter().zip(&request.inputs).enumerate() {
        let index = index as u32;
        let digest = match input.segwit_outpoint_value {
            Some(amount) => segwit_sighash(&request.tx, index, &input.script_code, amount),
            None => legacy_sighash(&request.tx, index, &input.script_code),
        }
        .expect("sighash");
        let message = Message::from_digest_slice(&digest).expect("digest");
        let parsed = Signature::from_compact(&signature.to_compact()).expect("compact");
        secp.verify_ecdsa(&message, &parsed, &public_key).expect("signature verifies");
        let mut normalized = parsed;
        normalized.normalize_s();
        assert_eq!(normalized, parsed, "signatures are low-S");
    }
}

#[tokio::test]
async fn test_pegout_when_legacy_inputs_then_every_bookkeeping_version_signs() {
    for version in [ProtocolVersion::V2, ProtocolVersion::V3, ProtocolVersion::V4, ProtocolVersion::V5] {
        let harness = harness(version);
        let request = request(&harness, false);

        let signatures = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect("sign pegout");
        assert_signatures_verify(&harness, &request, &signatures);
        assert_eq!(harness.sim.ancestor_block(), harness.chain.hash(RELEASE_HEIGHT), "version {}", version);

        let signs = harness.sim.requests_for(CMD_SIGN);
        assert_eq!(signs.len(), 2);
        for sign in &signs {
            assert_eq!(sign["auth"]["receipt"], "f9010203");
            assert_eq!(sign["auth"]["receipt_merkle_proof"].as_array().map(Vec::len), Some(2));
            let mode = sign["message"].get("sighashComputationMode");
            if version.number() >= 4 {
                assert_eq!(mode.and_then(|m| m.as_str()), Some("legacy"), "version {}", version);
            } else {
                assert!(mode.is_none(), "version {}", version);
            }
        }
    }
}

#[tokio::test]
async fn test_pegout_when_segwit_inputs_on_version_five_then_witness_digest_signed() {
    let harness = harness(ProtocolVersion::V5);
    let request = request(&harness, true);

    let signatures = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect("sign segwit pegout");
    assert_signatures_verify(&harness, &request, &signatures);
    let sign = harness.sim.requests_for(CMD_SIGN).pop().expect("sign request");
    assert_eq!(sign["message"]["sighashComputationMode"], "segwit");
    assert_eq!(sign["message"]["outpointValue"], TEST_OUTPOINT_VALUE);
}

#[tokio::test]
async fn test_pegout_when_segwit_inputs_before_version_five_then_unsupported() {
    let harness = harness(ProtocolVersion::V4);
    let request = request(&harness, true);
    let err = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect_err("segwit on v4");
    assert!(matches!(err, BridgeError::UnsupportedVersion { version: 4, .. }));
    assert!(harness.sim.requests_for(CMD_SIGN).is_empty());
}

#[tokio::test]
async fn test_pegout_when_receipt_missing_then_nothing_is_signed() {
    let chain = ChainBuilder::default().length(12).build();
    let harness = harness_with_receipts(ProtocolVersion::V3, chain, |_| Arc::new(MemoryReceiptProofStore::new()));
    let request = request(&harness, false);

    let err = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect_err("no receipt");
    assert!(matches!(err, BridgeError::ReceiptNotFound { .. }));
    assert!(harness.sim.requests_for(CMD_SIGN).is_empty());
}

#[tokio::test]
async fn test_pegout_when_release_block_ahead_of_device_then_rejected_before_signing() {
    let harness = harness(ProtocolVersion::V3);
    let request = PegoutRequestBuilder::default().release_block_hash(harness.chain.hash(12)).build();
    let err = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect_err("ahead of device");
    assert!(matches!(err, BridgeError::TargetAheadOfBestBlock { target_height: 12, best_height: 10 }));
    assert!(harness.sim.requests_for(CMD_SIGN).is_empty());
}

#[tokio::test]
async fn test_pegout_when_version_one_then_bare_sighash_without_ancestor_update() {
    let harness = harness(ProtocolVersion::V1);
    let request = request(&harness, false);

    let signatures = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect("sign v1 pegout");
    assert_signatures_verify(&harness, &request, &signatures);
    assert!(harness.sim.requests_for(CMD_UPDATE_ANCESTOR_BLOCK).is_empty());
    let sign = harness.sim.requests_for(CMD_SIGN).pop().expect("sign request");
    assert!(sign["message"].is_string());
}

#[tokio::test]
async fn test_pegout_when_input_descriptors_mismatch_then_rejected() {
    let harness = harness(ProtocolVersion::V3);
    let mut request = request(&harness, false);
    request.inputs.pop();
    let err = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect_err("mismatch");
    assert!(matches!(err, BridgeError::Message(_)));
}

#[tokio::test]
async fn test_pegout_when_bookkeeping_sees_upgrade_first_then_next_pegout_uses_new_dialect() {
    let harness = harness(ProtocolVersion::V3);
    let request = request(&harness, false);
    harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect("sign on v3");

    harness.sim.set_version(ProtocolVersion::V4);
    let err = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect_err("device upgraded mid-session");
    assert!(err.is_version_changed(), "{}", err);

    let signatures = harness.pegout.sign_pegout(&KeyId::btc(), &request).await.expect("sign after renegotiation");
    assert_signatures_verify(&harness, &request, &signatures);
    let sign = harness.sim.requests_for(CMD_SIGN).pop().expect("sign request");
    assert_eq!(sign["version"], 4);
    assert_eq!(sign["message"]["sighashComputationMode"], "legacy");
}
