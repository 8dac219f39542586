use crate::fixtures::{protocol, remote_signer, simulator, simulator_with, simulator_config, TEST_RSK_REMOTE_KEY_ID};
use pegsign_core::application::CompositeSigner;
use pegsign_core::domain::signing::{SignEnvelope, SignRequest, Signer, SignerListener};
use pegsign_core::foundation::{BridgeError, KeyId, ProtocolVersion};
use pegsign_core::infrastructure::signer::codes::{CODE_DEVICE_ERROR, CODE_KEY_REJECTED, CODE_VERSION_CHANGED};
use pegsign_core::infrastructure::signer::commands::{CMD_GET_PUBKEY, CMD_SIGN, CMD_VERSION};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1};
use std::sync::Arc;

#[derive(Default)]
struct RecordingListener {
    sources: parking_lot::Mutex<Vec<String>>,
}

impl SignerListener for RecordingListener {
    fn on_irrecoverable_error(&self, signer: &str, _err: &BridgeError) {
        self.sources.lock().push(signer.to_string());
    }
}

fn verify(sim_key: secp256k1::PublicKey, hash: [u8; 32], compact: [u8; 64]) {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(&hash).expect("digest");
    let signature = Signature::from_compact(&compact).expect("compact signature");
    secp.verify_ecdsa(&message, &signature, &sim_key).expect("signature verifies");
}

#[tokio::test]
async fn test_remote_signer_when_version_changes_between_calls_then_renegotiates_and_retries_once() {
    let sim = simulator(ProtocolVersion::V3);
    let protocol = protocol(&sim);
    let signer = remote_signer(protocol.clone());

    signer.sign(&KeyId::rsk(), &SignEnvelope::hash([1; 32])).await.expect("first sign");
    assert_eq!(signer.client_resets(), 0);
    let signs_before = sim.requests_for(CMD_SIGN).len();

    sim.set_version(ProtocolVersion::V4);
    let signature = signer.sign(&KeyId::rsk(), &SignEnvelope::hash([2; 32])).await.expect("sign after upgrade");

    assert_eq!(signer.client_resets(), 1);
    assert_eq!(sim.requests_for(CMD_SIGN).len() - signs_before, 2);
    assert_eq!(sim.requests_for(CMD_VERSION).len(), 2);
    assert_eq!(protocol.version(), Some(ProtocolVersion::V4));
    assert_eq!(signer.version_for_key_id(&KeyId::rsk()).await.expect("version"), ProtocolVersion::V4);

    let canonical = signature.to_canonical().expect("canonical");
    verify(sim.public_key(TEST_RSK_REMOTE_KEY_ID).expect("sim key"), [2; 32], canonical.to_compact());
}

#[tokio::test]
async fn test_remote_signer_when_version_keeps_changing_then_gives_up_after_one_retry() {
    let sim = simulator(ProtocolVersion::V3);
    let signer = remote_signer(protocol(&sim));
    signer.public_key(&KeyId::rsk()).await.expect("warm up client");

    sim.script_response(CMD_SIGN, CODE_VERSION_CHANGED);
    sim.script_response(CMD_SIGN, CODE_VERSION_CHANGED);
    let err = signer.sign(&KeyId::rsk(), &SignEnvelope::hash([3; 32])).await.expect_err("persistent version change");

    assert!(err.is_version_changed());
    assert_eq!(signer.client_resets(), 1);
    assert_eq!(sim.requests_for(CMD_SIGN).len(), 2);
}

#[tokio::test]
async fn test_remote_signer_when_public_key_requested_twice_then_device_asked_once() {
    let sim = simulator(ProtocolVersion::V2);
    let signer = remote_signer(protocol(&sim));
    let first = signer.public_key(&KeyId::btc()).await.expect("first");
    let second = signer.public_key(&KeyId::btc()).await.expect("second");
    assert_eq!(first, second);
    assert_eq!(first.len(), 65);
    assert_eq!(sim.requests_for(CMD_GET_PUBKEY).len(), 1);
}

#[tokio::test]
async fn test_composite_when_backend_fails_irrecoverably_then_listeners_hear_backend_name() {
    let sim = simulator(ProtocolVersion::V3);
    let remote = remote_signer(protocol(&sim));
    let composite = CompositeSigner::new(vec![remote.clone() as Arc<dyn Signer>]);
    let listener = Arc::new(RecordingListener::default());
    composite.add_listener(listener.clone());

    sim.script_response(CMD_SIGN, CODE_KEY_REJECTED);
    let rejected = composite.sign(&KeyId::mst(), &SignEnvelope::hash([4; 32])).await.expect_err("key rejected");
    assert!(!rejected.is_irrecoverable());
    assert!(listener.sources.lock().is_empty());

    sim.script_response(CMD_SIGN, CODE_DEVICE_ERROR);
    let request = SignRequest::new(KeyId::mst(), SignEnvelope::hash([5; 32]));
    let failed = composite.sign_request(&request).await.expect_err("device error");
    assert!(failed.is_irrecoverable());
    assert_eq!(*listener.sources.lock(), vec![remote.name().to_string()]);
}

#[tokio::test]
async fn test_composite_when_key_unknown_then_no_suitable_signer() {
    let sim = simulator(ProtocolVersion::V3);
    let composite = CompositeSigner::new(vec![remote_signer(protocol(&sim)) as Arc<dyn Signer>]);
    let err = composite.public_key(&KeyId::new("UNKNOWN")).await.expect_err("unknown key");
    assert!(matches!(err, BridgeError::NoSuitableSigner(_)));
    assert!(sim.requests().is_empty());
}

#[tokio::test]
async fn test_hash_client_when_version_one_then_message_is_bare_hex_hash() {
    let sim = simulator_with(simulator_config(ProtocolVersion::V1));
    let signer = remote_signer(protocol(&sim));
    let signature = signer.sign(&KeyId::rsk(), &SignEnvelope::hash([6; 32])).await.expect("sign");

    let request = sim.requests_for(CMD_SIGN).pop().expect("sign request");
    assert_eq!(request["message"], hex::encode([6u8; 32]));
    assert!(request.get("auth").is_none());
    signature.to_canonical().expect("canonical");
}

#[tokio::test]
async fn test_pow_client_when_recovery_byte_missing_then_canonical_signature_recovers_it() {
    let mut config = simulator_config(ProtocolVersion::V4);
    config.omit_recovery_byte = true;
    let sim = simulator_with(config);
    let signer = remote_signer(protocol(&sim));

    let signature = signer.sign(&KeyId::rsk(), &SignEnvelope::hash([7; 32])).await.expect("sign");
    assert_eq!(signature.recovery_id, None);
    let request = sim.requests_for(CMD_SIGN).pop().expect("sign request");
    assert_eq!(request["message"]["hash"], hex::encode([7u8; 32]));

    let canonical = signature.to_canonical().expect("canonical");
    assert!(canonical.recovery_id < 4);
}
