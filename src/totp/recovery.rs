//! Recovery code generation and verification helpers.
//!
//! Recovery codes are the only fallback when an authenticator device is
//! lost. Each code is single-use and Argon2id-hashed with a server-side
//! pepper; plaintext is shown exactly once at generation time.

use anyhow::{Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

pub const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 8;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A freshly generated recovery-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub batch_id: Uuid,
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a new recovery-code batch using the provided pepper.
    ///
    /// # Errors
    /// Returns an error if Argon2id hashing fails.
    pub fn generate(pepper: &[u8]) -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng, pepper)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R, pepper: &[u8]) -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code(rng)?;
            let hash = hash_recovery_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self {
            batch_id: Uuid::new_v4(),
            codes,
            code_hashes,
        })
    }
}

/// Normalize a recovery code for verification: strip the separator and
/// uppercase. Rejects anything that does not reduce to eight characters of
/// the code alphabet.
///
/// # Errors
/// Returns an error for codes of the wrong length or alphabet.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }

    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow::anyhow!("invalid recovery code characters"));
    }

    Ok(normalized)
}

/// Format a normalized recovery code for display (`XXXX-XXXX`).
///
/// # Errors
/// Returns an error for codes of the wrong length.
pub fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 1);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

/// Verify a recovery code against a stored hash.
///
/// # Errors
/// Returns an error if the code is malformed or Argon2id cannot be
/// initialized. A well-formed non-matching code yields `Ok(false)`.
pub fn verify_recovery_code(code: &str, stored_hash: &str, pepper: &[u8]) -> Result<bool> {
    let normalized = normalize_recovery_code(code)?;
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|_| anyhow::anyhow!("invalid recovery code hash"))?;
    let argon2 = peppered_argon2(pepper)?;
    Ok(argon2
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

/// Find the first stored hash the submitted code matches, if any. Hashes are
/// salted, so every candidate must be tried.
///
/// # Errors
/// Returns an error if the code is malformed or Argon2id cannot be
/// initialized.
pub fn find_matching_index(code: &str, stored_hashes: &[String], pepper: &[u8]) -> Result<Option<usize>> {
    let normalized = normalize_recovery_code(code)?;
    let argon2 = peppered_argon2(pepper)?;
    for (idx, stored_hash) in stored_hashes.iter().enumerate() {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|_| anyhow::anyhow!("invalid recovery code hash"))?;
        if argon2
            .verify_password(normalized.as_bytes(), &parsed)
            .is_ok()
        {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

fn peppered_argon2(pepper: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper,
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
    .map_err(|_| anyhow::anyhow!("failed to initialize Argon2id"))
}

/// Generate a single recovery code in grouped form. Bytes outside the
/// largest multiple of the alphabet size are rejected and redrawn so every
/// character is equally likely.
fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    const REJECTION_ZONE: u8 =
        ((u8::MAX as usize + 1) / RECOVERY_CODE_ALPHABET.len() * RECOVERY_CODE_ALPHABET.len())
            as u8;

    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    let mut raw = [0u8; 2 * RECOVERY_CODE_LEN];
    while normalized.len() < RECOVERY_CODE_LEN {
        rng.fill_bytes(&mut raw);
        for byte in raw {
            if normalized.len() == RECOVERY_CODE_LEN {
                break;
            }
            if byte >= REJECTION_ZONE {
                continue;
            }
            let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
            if let Some(&char_byte) = RECOVERY_CODE_ALPHABET.get(idx) {
                normalized.push(char_byte as char);
            }
        }
    }
    format_recovery_code(&normalized)
}

/// Hash a recovery code using Argon2id with the server-side pepper.
fn hash_recovery_code(code: &str, pepper: &[u8]) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = peppered_argon2(pepper)?;
    let hash = argon2
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{
        find_matching_index, format_recovery_code, generate_code, normalize_recovery_code,
        verify_recovery_code, RecoveryCodeBatch, RECOVERY_CODE_COUNT,
    };
    use rand::RngCore;

    /// Hands out queued bytes, then zeros.
    struct QueueRng(std::collections::VecDeque<u8>);

    impl RngCore for QueueRng {
        fn next_u32(&mut self) -> u32 {
            let mut buf = [0u8; 4];
            self.fill_bytes(&mut buf);
            u32::from_le_bytes(buf)
        }

        fn next_u64(&mut self) -> u64 {
            let mut buf = [0u8; 8];
            self.fill_bytes(&mut buf);
            u64::from_le_bytes(buf)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for slot in dest {
                *slot = self.0.pop_front().unwrap_or(0);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn generation_redraws_bytes_that_would_bias_the_alphabet() {
        // 252..=255 fall outside 7 * 36 and must be skipped, not wrapped
        // onto the first alphabet characters.
        let bytes = [252u8, 253, 254, 255, 0, 1, 2, 3, 4, 5, 6, 7];
        let mut rng = QueueRng(bytes.into_iter().collect());
        let code = generate_code(&mut rng).unwrap();
        assert_eq!(code, "ABCD-EFGH");
    }

    #[test]
    fn batch_has_ten_grouped_codes() {
        let batch = RecoveryCodeBatch::generate(b"pepper").unwrap();
        assert_eq!(batch.codes.len(), RECOVERY_CODE_COUNT);
        assert_eq!(batch.code_hashes.len(), RECOVERY_CODE_COUNT);
        for code in &batch.codes {
            assert_eq!(code.len(), 9);
            assert_eq!(code.as_bytes()[4], b'-');
        }
    }

    #[test]
    fn normalize_recovery_code_strips_and_uppercases() {
        let normalized = normalize_recovery_code("abcd-ef12").unwrap();
        assert_eq!(normalized, "ABCDEF12");
        assert!(normalize_recovery_code("ABCD-EF1").is_err());
        assert!(normalize_recovery_code("ABCD-EF123").is_err());
    }

    #[test]
    fn format_recovery_code_groups() {
        let formatted = format_recovery_code("ABCDEF12").unwrap();
        assert_eq!(formatted, "ABCD-EF12");
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let pepper = b"pepper";
        let batch = RecoveryCodeBatch::generate(pepper).unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_recovery_code(code, hash, pepper).unwrap());
        assert!(!verify_recovery_code("ZZZZ-9999", hash, pepper).unwrap());
    }

    #[test]
    fn verify_requires_matching_pepper() {
        let batch = RecoveryCodeBatch::generate(b"pepper").unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(!verify_recovery_code(code, hash, b"other-pepper").unwrap());
    }

    #[test]
    fn find_matching_index_returns_first_hit() {
        let pepper = b"pepper";
        let batch = RecoveryCodeBatch::generate(pepper).unwrap();
        let code = batch.codes.get(3).unwrap();
        let idx = find_matching_index(code, &batch.code_hashes, pepper).unwrap();
        assert_eq!(idx, Some(3));
        let miss = find_matching_index("ZZZZ-9999", &batch.code_hashes, pepper).unwrap();
        assert_eq!(miss, None);
    }
}
