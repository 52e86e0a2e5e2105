//! Encryption at rest for TOTP secrets.
//!
//! ChaCha20-Poly1305 with the owning user's id as associated data, so a
//! ciphertext copied between rows fails to decrypt. Output layout is
//! `nonce (12 bytes) || ciphertext`.

use anyhow::Result;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Symmetric cipher bound to the service-wide secret-encryption key.
#[derive(Clone)]
pub struct SecretCipher {
    key: Vec<u8>,
}

impl SecretCipher {
    /// # Errors
    /// Returns an error unless the key is exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(anyhow::anyhow!(
                "secret encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            ));
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Encrypt a base32 TOTP secret for the given user.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, user_id: Uuid, secret: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = construct_aad(user_id);
        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: secret,
                    aad: &aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("encryption failure: {e}"))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt a stored TOTP secret for the given user.
    ///
    /// # Errors
    /// Returns an error if the data is too short, was encrypted for another
    /// user, or fails authentication.
    pub fn decrypt(&self, user_id: Uuid, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(anyhow::anyhow!("invalid ciphertext length"));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let aad = construct_aad(user_id);
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("decryption failure: {e}"))
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

fn construct_aad(user_id: Uuid) -> Vec<u8> {
    format!("totp-secret:v1|{user_id}").into_bytes()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_keys() {
        assert!(SecretCipher::new(&[0u8; 16]).is_err());
        assert!(SecretCipher::new(&[0u8; 32]).is_ok());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = SecretCipher::new(&[42u8; 32]).unwrap();
        let user_id = Uuid::new_v4();
        let secret = b"JBSWY3DPEHPK3PXP";

        let encrypted = cipher.encrypt(user_id, secret).unwrap();
        assert_ne!(encrypted.as_slice(), secret.as_slice());
        assert!(encrypted.len() > secret.len());

        let decrypted = cipher.decrypt(user_id, &encrypted).unwrap();
        assert_eq!(decrypted, secret);
    }

    #[test]
    fn decrypt_fails_for_other_user() {
        let cipher = SecretCipher::new(&[42u8; 32]).unwrap();
        let encrypted = cipher.encrypt(Uuid::new_v4(), b"secret").unwrap();
        assert!(cipher.decrypt(Uuid::new_v4(), &encrypted).is_err());
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let cipher = SecretCipher::new(&[42u8; 32]).unwrap();
        let user_id = Uuid::new_v4();
        let mut encrypted = cipher.encrypt(user_id, b"secret").unwrap();

        let len = encrypted.len();
        if let Some(byte) = encrypted.get_mut(len - 1) {
            *byte ^= 0xFF;
        }

        assert!(cipher.decrypt(user_id, &encrypted).is_err());
    }
}
