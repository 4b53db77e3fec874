//! Encrypted Key Material and Store Files
//!
//! Key material is protected with:
//! - Argon2id for password-based key derivation
//! - ChaCha20-Poly1305 for authenticated encryption
//!
//! Store files (keystore, token registry, domain registry) are JSON written
//! atomically (temp file + rename, mode 0600 on unix) and carry a revision
//! counter. A save against a revision that moved on disk fails with
//! `Conflict`, which is the one retryable error kind: the store assumes
//! at-most-one-writer-at-a-time per record and refuses to clobber a
//! concurrent writer's result.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::PipelineError;

/// Argon2 parameters (tuned for security vs. usability)
const ARGON2_MEMORY_KB: u32 = 65536; // 64 MB
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Password-encrypted secret bytes (a recovery phrase or a raw secret key).
///
/// Decryption is the unlock gate's failure point: a wrong password fails the
/// AEAD tag check and surfaces as `InvalidSecret`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Argon2 salt (base64 encoded)
    salt: String,

    /// ChaCha20-Poly1305 nonce (12 bytes, hex encoded)
    nonce: String,

    /// Encrypted payload (hex encoded)
    ciphertext: String,
}

impl EncryptedSecret {
    /// Encrypt `plaintext` under a key derived from `secret`
    pub fn encrypt(plaintext: &[u8], secret: &str) -> Result<Self, PipelineError> {
        let salt = SaltString::generate(&mut OsRng);
        let key = derive_key(secret, salt.as_str())?;

        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| PipelineError::Storage("failed to create cipher".into()))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| PipelineError::Storage("encryption failed".into()))?;

        Ok(Self {
            salt: salt.to_string(),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt with `secret`, failing closed on a wrong password
    pub fn decrypt(&self, secret: &str) -> Result<Zeroizing<Vec<u8>>, PipelineError> {
        let key = derive_key(secret, &self.salt)?;

        let nonce_bytes = hex::decode(&self.nonce)
            .map_err(|_| PipelineError::Storage("invalid nonce format".into()))?;
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|_| PipelineError::Storage("invalid ciphertext format".into()))?;

        if nonce_bytes.len() != 12 {
            return Err(PipelineError::Storage("invalid nonce length".into()));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| PipelineError::Storage("failed to create cipher".into()))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_slice())
            .map_err(|_| PipelineError::InvalidSecret)?;

        Ok(Zeroizing::new(plaintext))
    }
}

/// Derive a 32-byte encryption key from a password using Argon2id
fn derive_key(secret: &str, salt: &str) -> Result<[u8; 32], PipelineError> {
    let salt = SaltString::from_b64(salt)
        .map_err(|_| PipelineError::Storage("invalid salt format".into()))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(
            ARGON2_MEMORY_KB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(32),
        )
        .map_err(|_| PipelineError::Storage("invalid Argon2 parameters".into()))?,
    );

    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|_| PipelineError::Storage("key derivation failed".into()))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| PipelineError::Storage("no hash output".into()))?;
    let hash_bytes = hash_output.as_bytes();

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(key)
}

/// A store file payload that carries a write-conflict revision counter.
pub trait Versioned {
    fn revision(&self) -> u64;
    fn set_revision(&mut self, revision: u64);
}

/// Read a JSON store file; a missing file yields the default payload.
pub fn read_store<T>(path: &Path) -> Result<T, PipelineError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(path)
        .map_err(|e| PipelineError::Storage(format!("failed to read {}: {e}", path.display())))?;

    serde_json::from_str(&json)
        .map_err(|e| PipelineError::Storage(format!("failed to parse {}: {e}", path.display())))
}

/// Write a store file, detecting concurrent writers.
///
/// Fails with `Conflict` when the revision on disk no longer matches
/// `expected_revision`. On success the payload's revision is bumped to
/// `expected_revision + 1` before it is written.
pub fn write_store<T>(path: &Path, payload: &mut T, expected_revision: u64) -> Result<(), PipelineError>
where
    T: Serialize + DeserializeOwned + Default + Versioned,
{
    let on_disk: T = read_store(path)?;
    if on_disk.revision() != expected_revision {
        return Err(PipelineError::Conflict);
    }

    payload.set_revision(expected_revision + 1);
    write_json_atomic(path, payload)
}

/// Serialize to pretty JSON and write atomically with restricted permissions
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }

    #[cfg(not(unix))]
    {
        fs::write(&tmp, &json)?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_SECRET: &str = "test-password-123";

    #[derive(Default, Serialize, Deserialize)]
    struct TestFile {
        revision: u64,
        value: String,
    }

    impl Versioned for TestFile {
        fn revision(&self) -> u64 {
            self.revision
        }
        fn set_revision(&mut self, revision: u64) {
            self.revision = revision;
        }
    }

    #[test]
    fn test_encrypt_decrypt() {
        let blob = EncryptedSecret::encrypt(b"sensitive material", TEST_SECRET).unwrap();
        let plaintext = blob.decrypt(TEST_SECRET).unwrap();
        assert_eq!(plaintext.as_slice(), b"sensitive material");
    }

    #[test]
    fn test_wrong_password_is_invalid_secret() {
        let blob = EncryptedSecret::encrypt(b"sensitive material", TEST_SECRET).unwrap();
        assert_eq!(
            blob.decrypt("wrong-password").unwrap_err(),
            PipelineError::InvalidSecret
        );
    }

    #[test]
    fn test_missing_store_is_default() {
        let dir = TempDir::new().unwrap();
        let file: TestFile = read_store(&dir.path().join("missing.json")).unwrap();
        assert_eq!(file.revision, 0);
    }

    #[test]
    fn test_store_roundtrip_bumps_revision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut file = TestFile {
            revision: 0,
            value: "hello".into(),
        };
        write_store(&path, &mut file, 0).unwrap();
        assert_eq!(file.revision, 1);

        let loaded: TestFile = read_store(&path).unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.value, "hello");
    }

    #[test]
    fn test_stale_revision_is_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut ours = TestFile {
            revision: 0,
            value: "ours".into(),
        };
        let mut theirs = TestFile {
            revision: 0,
            value: "theirs".into(),
        };

        // Another writer lands first.
        write_store(&path, &mut theirs, 0).unwrap();

        assert_eq!(
            write_store(&path, &mut ours, 0).unwrap_err(),
            PipelineError::Conflict
        );

        // The concurrent writer's data is intact.
        let loaded: TestFile = read_store(&path).unwrap();
        assert_eq!(loaded.value, "theirs");
    }
}
