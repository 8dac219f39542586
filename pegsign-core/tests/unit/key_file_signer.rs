#![cfg(unix)]

use crate::fixtures::{secret, TEST_MST_SECRET};
use pegsign_core::domain::signing::{SignEnvelope, Signer, SignerListener};
use pegsign_core::foundation::{BridgeError, KeyId};
use pegsign_core::infrastructure::keys::KeyFileSigner;
use secp256k1::{PublicKey, Secp256k1};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn write_key(dir: &Path, mode: u32) -> PathBuf {
    let path = dir.join("mst.key");
    fs::write(&path, format!("{}\n", hex::encode(TEST_MST_SECRET))).expect("write key file");
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod key file");
    path
}

#[derive(Default)]
struct CountingListener(AtomicUsize);

impl SignerListener for CountingListener {
    fn on_irrecoverable_error(&self, _signer: &str, _err: &BridgeError) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_key_file_signer_when_owner_only_file_then_signs_verifiable_digest() {
    let dir = tempfile::tempdir().expect("temp dir");
    let signer = KeyFileSigner::new(KeyId::mst(), write_key(dir.path(), 0o600));

    assert!(signer.check().await.ok);
    let expected = PublicKey::from_secret_key(&Secp256k1::new(), &secret(TEST_MST_SECRET)).serialize_uncompressed().to_vec();
    assert_eq!(signer.public_key(&KeyId::mst()).await.expect("public key"), expected);

    let signature = signer.sign(&KeyId::mst(), &SignEnvelope::hash([0x5a; 32])).await.expect("sign");
    assert_eq!(signature.signed_hash, [0x5a; 32]);
    let canonical = signature.to_canonical().expect("canonical");
    assert!(canonical.v() == 27 || canonical.v() == 28);
}

#[tokio::test]
async fn test_key_file_signer_when_group_readable_then_refuses_and_notifies() {
    let dir = tempfile::tempdir().expect("temp dir");
    let signer = KeyFileSigner::new(KeyId::mst(), write_key(dir.path(), 0o644));
    let listener = Arc::new(CountingListener::default());
    signer.add_listener(listener.clone());

    let check = signer.check().await;
    assert!(!check.ok);
    let err = signer.sign(&KeyId::mst(), &SignEnvelope::hash([1; 32])).await.expect_err("insecure file");
    assert!(matches!(err, BridgeError::InsecureFilePermissions { mode: 0o644, .. }));
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_key_file_signer_when_file_missing_then_check_fails_and_key_not_found() {
    let dir = tempfile::tempdir().expect("temp dir");
    let signer = KeyFileSigner::new(KeyId::mst(), dir.path().join("absent.key"));

    let check = signer.check().await;
    assert!(!check.ok);
    assert!(check.messages[0].contains("does not exist"));
    let err = signer.public_key(&KeyId::mst()).await.expect_err("missing file");
    assert!(matches!(err, BridgeError::KeyNotFound(_)));
}

#[tokio::test]
async fn test_key_file_signer_when_other_key_id_then_no_suitable_signer() {
    let dir = tempfile::tempdir().expect("temp dir");
    let signer = KeyFileSigner::new(KeyId::mst(), write_key(dir.path(), 0o600));
    assert!(!signer.can_sign_with(&KeyId::btc()));
    let err = signer.sign(&KeyId::btc(), &SignEnvelope::hash([1; 32])).await.expect_err("wrong key");
    assert!(matches!(err, BridgeError::NoSuitableSigner(_)));
    assert_eq!(signer.version_for_key_id(&KeyId::mst()).await.expect("version").number(), 1);
}
