//! Identity Store
//!
//! A keystore of named identities, each holding password-encrypted key
//! material (a recovery phrase or an imported secret key). Creation and
//! import are atomic: the secret/confirmation check happens before any key
//! material is generated, and a failed save rolls the in-memory state back,
//! so a partial identity is never left behind.
//!
//! Unlocking is stateless per call: every mutating command re-unlocks and the
//! decrypted material lives only as long as the operation it authorizes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, ResourceKind};
use crate::keys::{validate_mnemonic, SigningKeys};
use crate::storage::{read_store, write_store, EncryptedSecret, Versioned};

/// Current keystore file format version
const KEYSTORE_VERSION: u32 = 1;

/// What kind of secret an identity's key material decrypts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KeyKind {
    /// A BIP39 recovery phrase
    Mnemonic,
    /// A raw 32-byte ed25519 secret key
    SecretKey,
}

/// An address-bearing account with locked signing material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Unique account address, derived from the public key
    pub address: String,

    /// Display name; renameable, never part of the address
    pub name: String,

    /// Public verification key (hex)
    pub public_key: String,

    /// Creation time (unix seconds)
    pub created_at: u64,

    key_kind: KeyKind,
    key_material: EncryptedSecret,
}

impl Identity {
    /// Unlock the identity's signing material with `secret`.
    ///
    /// Fails closed with `InvalidSecret` on a wrong password. The result is
    /// not cached anywhere; callers drop it after one operation.
    pub fn unlock(&self, secret: &str) -> Result<SigningKeys, PipelineError> {
        let plaintext = self.key_material.decrypt(secret)?;

        let keys = match self.key_kind {
            KeyKind::Mnemonic => {
                let phrase = std::str::from_utf8(&plaintext).map_err(|_| {
                    PipelineError::Storage("corrupt key material encoding".into())
                })?;
                SigningKeys::from_mnemonic(phrase)?
            }
            KeyKind::SecretKey => SigningKeys::from_secret_key(&plaintext)?,
        };

        // The decrypted material must reproduce the registered key.
        if keys.public_key_hex() != self.public_key {
            return Err(PipelineError::Storage(
                "key material does not match registered public key".into(),
            ));
        }

        Ok(keys)
    }

    /// Public key as raw bytes, for signature verification
    pub fn public_key_bytes(&self) -> Result<[u8; 32], PipelineError> {
        let bytes = hex::decode(&self.public_key)
            .map_err(|_| PipelineError::Storage("corrupt public key encoding".into()))?;
        bytes
            .try_into()
            .map_err(|_| PipelineError::Storage("corrupt public key length".into()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeystoreFile {
    version: u32,
    revision: u64,
    /// Address of the default identity; at most one.
    default: Option<String>,
    identities: Vec<Identity>,
}

impl Default for KeystoreFile {
    fn default() -> Self {
        Self {
            version: KEYSTORE_VERSION,
            revision: 0,
            default: None,
            identities: Vec::new(),
        }
    }
}

impl Versioned for KeystoreFile {
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

/// On-disk identity store.
pub struct IdentityStore {
    path: PathBuf,
    file: KeystoreFile,
}

impl IdentityStore {
    /// Open the keystore at `path`, starting empty if none exists
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let file: KeystoreFile = read_store(path)?;
        if file.version != KEYSTORE_VERSION {
            return Err(PipelineError::Storage(format!(
                "unsupported keystore version: {} (expected {})",
                file.version, KEYSTORE_VERSION
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Re-read the keystore from disk, discarding in-memory changes
    pub fn reload(&mut self) -> Result<(), PipelineError> {
        self.file = read_store(&self.path)?;
        Ok(())
    }

    fn persist(&mut self) -> Result<(), PipelineError> {
        let expected = self.file.revision;
        match write_store(&self.path, &mut self.file, expected) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Roll the in-memory state back so no partial mutation
                // survives a failed save.
                let _ = self.reload();
                Err(err)
            }
        }
    }

    /// All identities, in creation order
    pub fn list(&self) -> &[Identity] {
        &self.file.identities
    }

    /// Look up an identity by address
    pub fn get(&self, address: &str) -> Option<&Identity> {
        self.file.identities.iter().find(|i| i.address == address)
    }

    /// Look up an identity by address, failing with `NotFound`
    pub fn require(&self, address: &str) -> Result<&Identity, PipelineError> {
        self.get(address)
            .ok_or(PipelineError::NotFound(ResourceKind::Identity))
    }

    /// The store's default identity, if one is flagged
    pub fn default_identity(&self) -> Option<&Identity> {
        self.file
            .default
            .as_deref()
            .and_then(|addr| self.get(addr))
    }

    /// Create a new identity with fresh keys.
    ///
    /// Returns the identity and its unlocked keys so the caller can display
    /// the recovery phrase once. The secret/confirmation check runs before
    /// anything is generated or persisted.
    pub fn create(
        &mut self,
        name: &str,
        secret: &str,
        confirm: &str,
    ) -> Result<(Identity, SigningKeys), PipelineError> {
        if secret != confirm {
            return Err(PipelineError::SecretMismatch);
        }

        let keys = SigningKeys::generate()?;
        let phrase = keys
            .mnemonic_phrase()
            .ok_or_else(|| PipelineError::Storage("generated keys missing phrase".into()))?
            .to_string();

        let material = EncryptedSecret::encrypt(phrase.as_bytes(), secret)?;
        let identity = self.insert(name, &keys, KeyKind::Mnemonic, material)?;

        Ok((identity, keys))
    }

    /// Import an identity from a raw secret key
    pub fn import_secret_key(
        &mut self,
        name: &str,
        key_bytes: &[u8],
        secret: &str,
        confirm: &str,
    ) -> Result<Identity, PipelineError> {
        if secret != confirm {
            return Err(PipelineError::SecretMismatch);
        }

        let keys = SigningKeys::from_secret_key(key_bytes)?;
        let material = EncryptedSecret::encrypt(key_bytes, secret)?;
        self.insert(name, &keys, KeyKind::SecretKey, material)
    }

    /// Import an identity from a recovery phrase
    pub fn import_phrase(
        &mut self,
        name: &str,
        phrase: &str,
        secret: &str,
        confirm: &str,
    ) -> Result<Identity, PipelineError> {
        if secret != confirm {
            return Err(PipelineError::SecretMismatch);
        }

        validate_mnemonic(phrase)?;
        let keys = SigningKeys::from_mnemonic(phrase)?;
        let material = EncryptedSecret::encrypt(phrase.as_bytes(), secret)?;
        self.insert(name, &keys, KeyKind::Mnemonic, material)
    }

    fn insert(
        &mut self,
        name: &str,
        keys: &SigningKeys,
        key_kind: KeyKind,
        key_material: EncryptedSecret,
    ) -> Result<Identity, PipelineError> {
        let address = keys.address();

        // Addresses are unique across the store; an import of key material
        // that is already present is refused rather than duplicated.
        if self.get(&address).is_some() {
            return Err(PipelineError::InvalidPayload(format!(
                "identity already exists: {address}"
            )));
        }

        let identity = Identity {
            address: address.clone(),
            name: name.to_string(),
            public_key: keys.public_key_hex(),
            created_at: chrono::Utc::now().timestamp() as u64,
            key_kind,
            key_material,
        };

        self.file.identities.push(identity.clone());

        // The first identity in the store becomes the default.
        if self.file.default.is_none() {
            self.file.default = Some(address);
        }

        self.persist()?;
        Ok(identity)
    }

    /// Flag `address` as the store default, unflagging any previous one.
    ///
    /// Idempotent: re-running against the current default is a no-op.
    pub fn set_default(&mut self, address: &str) -> Result<(), PipelineError> {
        self.require(address)?;

        if self.file.default.as_deref() == Some(address) {
            return Ok(());
        }

        self.file.default = Some(address.to_string());
        self.persist()
    }

    /// Rename an identity; the address is stable through a rename
    pub fn rename(&mut self, address: &str, new_name: &str) -> Result<(), PipelineError> {
        let identity = self
            .file
            .identities
            .iter_mut()
            .find(|i| i.address == address)
            .ok_or(PipelineError::NotFound(ResourceKind::Identity))?;

        identity.name = new_name.to_string();
        self.persist()
    }

    /// Remove an identity. Removing the default leaves the store with no
    /// default flagged.
    pub fn remove(&mut self, address: &str) -> Result<(), PipelineError> {
        let before = self.file.identities.len();
        self.file.identities.retain(|i| i.address != address);

        if self.file.identities.len() == before {
            return Err(PipelineError::NotFound(ResourceKind::Identity));
        }

        if self.file.default.as_deref() == Some(address) {
            self.file.default = None;
        }

        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SECRET: &str = "test-password-123";

    fn open_store(dir: &TempDir) -> IdentityStore {
        IdentityStore::open(&dir.path().join("keystore.json")).unwrap()
    }

    #[test]
    fn test_create_and_unlock() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let (identity, _) = store.create("alice", SECRET, SECRET).unwrap();
        assert!(identity.address.starts_with("mrd1"));

        let unlocked = store.get(&identity.address).unwrap().unlock(SECRET).unwrap();
        assert_eq!(unlocked.address(), identity.address);
    }

    #[test]
    fn test_unlock_wrong_secret() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let (identity, _) = store.create("alice", SECRET, SECRET).unwrap();
        assert_eq!(
            store.get(&identity.address).unwrap().unlock("nope").unwrap_err(),
            PipelineError::InvalidSecret
        );
    }

    #[test]
    fn test_secret_mismatch_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert_eq!(
            store.create("alice", SECRET, "different").unwrap_err(),
            PipelineError::SecretMismatch
        );
        assert!(store.list().is_empty());

        // Nothing was persisted either.
        let reopened = open_store(&dir);
        assert!(reopened.list().is_empty());
    }

    #[test]
    fn test_first_identity_becomes_default() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let (alice, _) = store.create("alice", SECRET, SECRET).unwrap();
        let (_bob, _) = store.create("bob", SECRET, SECRET).unwrap();

        assert_eq!(store.default_identity().unwrap().address, alice.address);
    }

    #[test]
    fn test_set_default_is_exclusive_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let (_alice, _) = store.create("alice", SECRET, SECRET).unwrap();
        let (bob, _) = store.create("bob", SECRET, SECRET).unwrap();

        store.set_default(&bob.address).unwrap();
        store.set_default(&bob.address).unwrap();

        assert_eq!(store.default_identity().unwrap().address, bob.address);
        // Exactly one default exists by construction; reopening agrees.
        let reopened = open_store(&dir);
        assert_eq!(reopened.default_identity().unwrap().address, bob.address);
    }

    #[test]
    fn test_rename_keeps_address_and_default() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let (alice, _) = store.create("alice", SECRET, SECRET).unwrap();
        store.rename(&alice.address, "alicia").unwrap();

        let renamed = store.get(&alice.address).unwrap();
        assert_eq!(renamed.name, "alicia");
        assert_eq!(store.default_identity().unwrap().address, alice.address);
    }

    #[test]
    fn test_remove_default_clears_flag() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let (alice, _) = store.create("alice", SECRET, SECRET).unwrap();
        store.remove(&alice.address).unwrap();

        assert!(store.list().is_empty());
        assert!(store.default_identity().is_none());
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert_eq!(
            store.remove("mrd1unknown").unwrap_err(),
            PipelineError::NotFound(ResourceKind::Identity)
        );
    }

    #[test]
    fn test_import_phrase_roundtrip() {
        const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let identity = store.import_phrase("alice", PHRASE, SECRET, SECRET).unwrap();
        let unlocked = store.get(&identity.address).unwrap().unlock(SECRET).unwrap();
        assert_eq!(unlocked.mnemonic_phrase(), Some(PHRASE));

        // Importing the same material again is refused, not duplicated.
        assert!(matches!(
            store.import_phrase("alice2", PHRASE, SECRET, SECRET),
            Err(PipelineError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_import_secret_key() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let keys = SigningKeys::generate().unwrap();
        let identity = store
            .import_secret_key("cold", keys.secret_key_bytes().as_ref(), SECRET, SECRET)
            .unwrap();

        assert_eq!(identity.address, keys.address());
        // Key-imported identities have no recovery phrase.
        let unlocked = store.get(&identity.address).unwrap().unlock(SECRET).unwrap();
        assert!(unlocked.mnemonic_phrase().is_none());
    }
}
