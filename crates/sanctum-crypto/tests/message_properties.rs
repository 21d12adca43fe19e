//! Property tests for message encryption: round trip, IV uniqueness,
//! tamper detection, and key isolation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;
use sanctum_crypto::{CryptoError, DerivedKey, EncryptedMessage, EncryptionManager, KdfParams};
use secrecy::SecretString;
use std::collections::HashSet;

fn manager(byte: u8) -> EncryptionManager {
    EncryptionManager::with_key(DerivedKey::from_bytes([byte; 32]))
}

fn flip_bit(b64: &str, bit: usize) -> String {
    let mut bytes = STANDARD.decode(b64).unwrap();
    bytes[bit / 8] ^= 1 << (bit % 8);
    STANDARD.encode(bytes)
}

proptest! {
    #[test]
    fn roundtrip_any_string(s in ".*") {
        let m = manager(1);
        let msg = m.encrypt(&s).unwrap();
        prop_assert_eq!(m.decrypt(&msg).unwrap(), s);
    }

    #[test]
    fn roundtrip_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let m = manager(2);
        let msg = m.encrypt_bytes(&data).unwrap();
        prop_assert_eq!(m.decrypt_bytes(&msg).unwrap(), data);
    }

    #[test]
    fn single_bit_flip_in_content_is_detected(s in ".{0,64}", seed in any::<usize>()) {
        let m = manager(3);
        let msg = m.encrypt(&s).unwrap();
        let bits = STANDARD.decode(&msg.content).unwrap().len() * 8;
        let tampered = EncryptedMessage {
            iv: msg.iv.clone(),
            content: flip_bit(&msg.content, seed % bits),
        };
        prop_assert!(matches!(m.decrypt(&tampered), Err(CryptoError::Authentication)));
    }
}

#[test]
fn every_iv_and_content_bit_flip_fails_authentication() {
    let m = manager(4);
    let msg = m.encrypt("meet me at the usual place").unwrap();

    for bit in 0..96 {
        let tampered = EncryptedMessage {
            iv: flip_bit(&msg.iv, bit),
            content: msg.content.clone(),
        };
        assert!(
            matches!(m.decrypt(&tampered), Err(CryptoError::Authentication)),
            "iv bit {bit} flip was not detected"
        );
    }

    let content_bits = STANDARD.decode(&msg.content).unwrap().len() * 8;
    for bit in 0..content_bits {
        let tampered = EncryptedMessage {
            iv: msg.iv.clone(),
            content: flip_bit(&msg.content, bit),
        };
        assert!(
            matches!(m.decrypt(&tampered), Err(CryptoError::Authentication)),
            "content bit {bit} flip was not detected"
        );
    }
}

#[test]
fn ten_thousand_encryptions_never_reuse_an_iv() {
    let m = manager(5);
    let mut seen = HashSet::with_capacity(10_000);
    for _ in 0..10_000 {
        let msg = m.encrypt("same plaintext every time").unwrap();
        assert!(seen.insert(msg.iv), "IV collision");
    }
}

#[test]
fn identical_plaintexts_produce_different_ciphertexts() {
    let m = manager(6);
    let a = m.encrypt("hello").unwrap();
    let b = m.encrypt("hello").unwrap();
    assert_ne!(a.iv, b.iv);
    assert_ne!(a.content, b.content);
}

#[tokio::test]
async fn keys_from_different_passwords_are_isolated() {
    let salt = "shared-deployment-salt";
    let alice = EncryptionManager::new(KdfParams::default(), salt);
    alice
        .initialize(&SecretString::from("password-a"))
        .await
        .unwrap();
    let bob = EncryptionManager::new(KdfParams::default(), salt);
    bob.initialize(&SecretString::from("password-b"))
        .await
        .unwrap();

    let msg = alice.encrypt("for alice only").unwrap();
    assert!(matches!(bob.decrypt(&msg), Err(CryptoError::Authentication)));
    assert_eq!(alice.decrypt(&msg).unwrap(), "for alice only");
}

#[tokio::test]
async fn same_password_and_salt_rederive_a_compatible_key() {
    let first = EncryptionManager::new(KdfParams::default(), "salt-v1");
    first.initialize(&SecretString::from("pw")).await.unwrap();
    let msg = first.encrypt("persisted yesterday").unwrap();
    drop(first);

    let second = EncryptionManager::new(KdfParams::default(), "salt-v1");
    second.initialize(&SecretString::from("pw")).await.unwrap();
    assert_eq!(second.decrypt(&msg).unwrap(), "persisted yesterday");
}

#[tokio::test]
async fn chat_message_scenario() {
    let k = EncryptionManager::new(KdfParams::default(), "chat-salt");
    k.initialize(&SecretString::from("alice's session secret"))
        .await
        .unwrap();

    let msg = k.encrypt("hello world").unwrap();
    assert_eq!(msg.iv.len(), 16);
    assert!(msg.content.len() >= 24);

    // Store as a JSON record and fetch it back.
    let record = serde_json::json!({ "sender": "alice", "message": msg });
    let stored = serde_json::to_string(&record).unwrap();
    let fetched: serde_json::Value = serde_json::from_str(&stored).unwrap();
    let fetched_msg: EncryptedMessage =
        serde_json::from_value(fetched["message"].clone()).unwrap();

    assert_eq!(k.decrypt(&fetched_msg).unwrap(), "hello world");
}
