// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

#[test]
fn round_trip_simple() -> anyhow::Result<()> {
    let cipher = TokenCipher::new("short-secret");
    let blob = cipher.encrypt("121.abcdef.access")?;
    assert_eq!(cipher.decrypt(&blob)?, "121.abcdef.access");
    Ok(())
}

#[test]
fn layout_is_nonce_tag_ciphertext_hex() -> anyhow::Result<()> {
    let cipher = TokenCipher::new("short-secret");
    let blob = cipher.encrypt("abc")?;
    assert!(blob.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(blob.len(), 2 * (NONCE_SIZE + TAG_SIZE + 3));
    Ok(())
}

#[test]
fn nonces_differ_between_calls() -> anyhow::Result<()> {
    let cipher = TokenCipher::new("short-secret");
    let a = cipher.encrypt("same")?;
    let b = cipher.encrypt("same")?;
    assert_ne!(a[..NONCE_SIZE * 2], b[..NONCE_SIZE * 2]);
    Ok(())
}

#[test]
fn long_master_key_uses_prefix() -> anyhow::Result<()> {
    let long = "0123456789abcdef0123456789abcdef-tail-one";
    let other = "0123456789abcdef0123456789abcdef-tail-two";
    let blob = TokenCipher::new(long).encrypt("token")?;
    assert_eq!(TokenCipher::new(other).decrypt(&blob)?, "token");
    Ok(())
}

#[test]
fn wrong_key_fails() -> anyhow::Result<()> {
    let blob = TokenCipher::new("key-one").encrypt("token")?;
    let err = TokenCipher::new("key-two").decrypt(&blob);
    assert!(matches!(err, Err(CryptoError::Integrity(_))));
    Ok(())
}

#[test]
fn garbage_is_rejected() {
    let cipher = TokenCipher::new("k");
    assert!(matches!(cipher.decrypt("zz"), Err(CryptoError::Integrity(_))));
    assert!(matches!(cipher.decrypt("00ff"), Err(CryptoError::Integrity(_))));
    assert!(matches!(cipher.decrypt(""), Err(CryptoError::Integrity(_))));
}

proptest! {
    #[test]
    fn decrypt_inverts_encrypt(plain in ".*") {
        let cipher = TokenCipher::new("prop-master");
        let blob = cipher.encrypt(&plain).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let back = cipher.decrypt(&blob).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(back, plain);
    }

    #[test]
    fn any_single_byte_flip_is_detected(
        plain in ".{0,64}",
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let cipher = TokenCipher::new("prop-master");
        let blob = cipher.encrypt(&plain).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut raw = hex::decode(&blob).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let i = index.index(raw.len());
        raw[i] ^= mask;
        let tampered = hex::encode(raw);
        prop_assert!(matches!(cipher.decrypt(&tampered), Err(CryptoError::Integrity(_))));
    }
}
