//! Key Management
//!
//! Handles BIP39 mnemonic generation and SLIP-0010 key derivation for
//! Meridian identities, and ed25519 signing of transaction intents.
//!
//! Security: mnemonic phrases are held in `Zeroizing<String>` wrappers that
//! overwrite memory with zeros when dropped, so recovery phrases do not
//! persist in memory after an unlock completes.

use bip39::{Language, Mnemonic, MnemonicType, Seed};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::PipelineError;

/// Number of words in a recovery phrase
pub const MNEMONIC_WORDS: usize = 24;

/// Domain separator mixed into every address derivation
const ADDRESS_CONTEXT: &[u8] = b"meridian-addr-v1";

/// Signing material unlocked from an identity.
///
/// Produced per operation by the unlock gate and dropped as soon as the
/// intent is signed; nothing here is cached across commands.
#[derive(Clone)]
pub struct SigningKeys {
    /// Recovery phrase, present only for mnemonic-derived identities.
    mnemonic_phrase: Option<Zeroizing<String>>,

    /// The derived ed25519 signing key.
    signing_key: SigningKey,
}

// Redacted: neither the phrase nor the secret key may reach logs or
// assertion output.
impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKeys(..)")
    }
}

impl SigningKeys {
    /// Generate fresh keys with a random 24-word mnemonic
    pub fn generate() -> Result<Self, PipelineError> {
        let mnemonic = Mnemonic::new(MnemonicType::Words24, Language::English);
        Self::from_mnemonic_internal(mnemonic)
    }

    /// Restore keys from a recovery phrase
    pub fn from_mnemonic(phrase: &str) -> Result<Self, PipelineError> {
        let word_count = phrase.split_whitespace().count();
        if word_count != MNEMONIC_WORDS {
            return Err(PipelineError::InvalidPayload(format!(
                "expected {} word recovery phrase, got {} words",
                MNEMONIC_WORDS, word_count
            )));
        }

        let mnemonic = Mnemonic::from_phrase(phrase, Language::English)
            .map_err(|e| PipelineError::InvalidPayload(format!("invalid recovery phrase: {e}")))?;

        Self::from_mnemonic_internal(mnemonic)
    }

    /// Restore keys from a raw 32-byte ed25519 secret key
    pub fn from_secret_key(bytes: &[u8]) -> Result<Self, PipelineError> {
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            PipelineError::InvalidPayload("secret key must be exactly 32 bytes".into())
        })?;

        Ok(Self {
            mnemonic_phrase: None,
            signing_key: SigningKey::from_bytes(&key),
        })
    }

    /// Internal constructor from a validated mnemonic
    fn from_mnemonic_internal(mnemonic: Mnemonic) -> Result<Self, PipelineError> {
        // Wrap immediately so the phrase is zeroed on drop
        let phrase = Zeroizing::new(mnemonic.phrase().to_string());

        // SLIP-0010 derivation at account index 0
        let seed = Seed::new(&mnemonic, "");
        let key = slip10_ed25519::derive_ed25519_private_key(seed.as_bytes(), &[0]);

        Ok(Self {
            mnemonic_phrase: Some(phrase),
            signing_key: SigningKey::from_bytes(&key),
        })
    }

    /// The recovery phrase, if this identity was derived from one
    pub fn mnemonic_phrase(&self) -> Option<&str> {
        self.mnemonic_phrase.as_ref().map(|p| p.as_str())
    }

    /// The mnemonic words, if present
    pub fn mnemonic_words(&self) -> Vec<&str> {
        self.mnemonic_phrase()
            .map(|p| p.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Raw secret key bytes (for export only)
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Public verification key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public key as lowercase hex
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// The human-readable account address for these keys
    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key_bytes())
    }

    /// Sign a message under a domain-separation context
    pub fn sign(&self, context: &[u8], message: &[u8]) -> Vec<u8> {
        let digest = signing_digest(context, message);
        let signature: Signature = self.signing_key.sign(&digest);
        signature.to_bytes().to_vec()
    }
}

/// Derive an address string from a public key.
///
/// Format: `mrd1<hex>` where the payload is the first 20 bytes of a
/// domain-separated SHA-256 of the public key.
pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ADDRESS_CONTEXT);
    hasher.update(public_key);
    let digest = hasher.finalize();
    format!("mrd1{}", hex::encode(&digest[..20]))
}

/// Verify a signature produced by [`SigningKeys::sign`]
pub fn verify_signature(
    public_key: &[u8; 32],
    context: &[u8],
    message: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };

    let digest = signing_digest(context, message);
    key.verify_strict(&digest, &signature).is_ok()
}

fn signing_digest(context: &[u8], message: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(context);
    hasher.update(message);
    hasher.finalize().into()
}

/// Validate a recovery phrase without deriving keys
pub fn validate_mnemonic(phrase: &str) -> Result<(), PipelineError> {
    let word_count = phrase.split_whitespace().count();
    if word_count != MNEMONIC_WORDS {
        return Err(PipelineError::InvalidPayload(format!(
            "expected {} words, got {}",
            MNEMONIC_WORDS, word_count
        )));
    }

    Mnemonic::from_phrase(phrase, Language::English)
        .map_err(|e| PipelineError::InvalidPayload(format!("invalid recovery phrase: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Standard BIP39 test vector (24 words)
    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    #[test]
    fn test_generate_keys() {
        let keys = SigningKeys::generate().unwrap();
        assert_eq!(keys.mnemonic_words().len(), 24);
        assert!(keys.address().starts_with("mrd1"));
    }

    #[test]
    fn test_restore_from_mnemonic() {
        let keys = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(keys.mnemonic_phrase(), Some(TEST_MNEMONIC));
    }

    #[test]
    fn test_deterministic_derivation() {
        let keys1 = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();
        let keys2 = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();

        assert_eq!(keys1.public_key_bytes(), keys2.public_key_bytes());
        assert_eq!(keys1.address(), keys2.address());
    }

    #[test]
    fn test_secret_key_roundtrip() {
        let keys = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();
        let exported = keys.secret_key_bytes();

        let imported = SigningKeys::from_secret_key(exported.as_ref()).unwrap();
        assert_eq!(imported.address(), keys.address());
        assert!(imported.mnemonic_phrase().is_none());
    }

    #[test]
    fn test_invalid_mnemonic() {
        // Wrong word count
        assert!(SigningKeys::from_mnemonic("abandon abandon abandon").is_err());
        // Invalid words
        assert!(SigningKeys::from_mnemonic(
            "not a valid phrase at all not a valid phrase at all not a valid \
             phrase at all not a valid phrase at all not a valid phrase at all"
        )
        .is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();
        let signature = keys.sign(b"test-context", b"test-message");

        assert_eq!(signature.len(), 64);
        assert!(verify_signature(
            &keys.public_key_bytes(),
            b"test-context",
            b"test-message",
            &signature
        ));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let keys = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();
        let signature = keys.sign(b"test-context", b"test-message");

        // Different message
        assert!(!verify_signature(
            &keys.public_key_bytes(),
            b"test-context",
            b"another-message",
            &signature
        ));
        // Different context
        assert!(!verify_signature(
            &keys.public_key_bytes(),
            b"other-context",
            b"test-message",
            &signature
        ));
        // Different key
        let other = SigningKeys::generate().unwrap();
        assert!(!verify_signature(
            &other.public_key_bytes(),
            b"test-context",
            b"test-message",
            &signature
        ));
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let keys = SigningKeys::from_mnemonic(TEST_MNEMONIC).unwrap();
        assert_eq!(format!("{:?}", keys), "SigningKeys(..)");
    }

    #[test]
    fn test_validate_mnemonic() {
        assert!(validate_mnemonic(TEST_MNEMONIC).is_ok());
        assert!(validate_mnemonic("abandon").is_err());
    }
}
