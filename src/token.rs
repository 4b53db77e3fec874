//! Token Resources
//!
//! Tokens carry an explicit capability grant map and per-address balances.
//! Every mutating field changes only through [`TokenRegistry::apply`], which
//! re-validates and applies a signed transaction intent all-or-nothing; no
//! other write path exists.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::authz::Capability;
use crate::error::{PipelineError, ResourceKind};
use crate::intent::{Operation, TransactionIntent};
use crate::storage::{read_store, write_store, Versioned};

/// Current token registry file format version
const REGISTRY_VERSION: u32 = 1;

/// Closed set of token kinds; unknown kinds are rejected at the CLI
/// parsing boundary, never deep in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Fungible,
    NonFungible,
    SemiFungible,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Fungible => write!(f, "fungible"),
            TokenType::NonFungible => write!(f, "non-fungible"),
            TokenType::SemiFungible => write!(f, "semi-fungible"),
        }
    }
}

/// A token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub token_type: TokenType,
    pub supply: u64,
    /// Upper bound on supply; `None` means unlimited
    pub max_supply: Option<u64>,
    pub decimals: u8,
    pub owner: String,
    pub created_at: u64,

    /// Explicit capability grants. Seeded with the owner for every
    /// capability at creation; each entry is independently revocable.
    grants: BTreeMap<Capability, BTreeSet<String>>,

    /// Per-address balances; the sum of all balances equals `supply`.
    balances: BTreeMap<String, u64>,

    /// Free-form metadata
    pub metadata: BTreeMap<String, String>,
}

impl Token {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        symbol: String,
        token_type: TokenType,
        owner: String,
        initial_supply: u64,
        max_supply: Option<u64>,
        decimals: u8,
        created_at: u64,
    ) -> Self {
        let id = token_id(&name, &symbol, &owner, created_at);

        let mut grants: BTreeMap<Capability, BTreeSet<String>> = BTreeMap::new();
        for cap in Capability::ALL {
            grants.entry(cap).or_default().insert(owner.clone());
        }

        let mut balances = BTreeMap::new();
        if initial_supply > 0 {
            balances.insert(owner.clone(), initial_supply);
        }

        Self {
            id,
            name,
            symbol,
            token_type,
            supply: initial_supply,
            max_supply,
            decimals,
            owner,
            created_at,
            grants,
            balances,
            metadata: BTreeMap::new(),
        }
    }

    /// Whether `address` currently holds `capability`
    pub fn has_capability(&self, address: &str, capability: Capability) -> bool {
        self.grants
            .get(&capability)
            .map(|set| set.contains(address))
            .unwrap_or(false)
    }

    /// Current balance for `address`
    pub fn balance_of(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Capability grants, for display
    pub fn grants(&self) -> &BTreeMap<Capability, BTreeSet<String>> {
        &self.grants
    }

    /// Balances, for display
    pub fn balances(&self) -> &BTreeMap<String, u64> {
        &self.balances
    }

    pub(crate) fn grant(&mut self, address: &str, capability: Capability) {
        self.grants
            .entry(capability)
            .or_default()
            .insert(address.to_string());
    }

    pub(crate) fn revoke(&mut self, address: &str, capability: Capability) {
        if let Some(set) = self.grants.get_mut(&capability) {
            set.remove(address);
        }
    }

    /// Validate an operation payload against this token's constraints.
    ///
    /// Pure check: nothing is mutated. Amounts are integers; fractional
    /// minting does not exist at this layer.
    pub fn validate(&self, from: &str, operation: &Operation) -> Result<(), PipelineError> {
        match operation {
            Operation::TokenMint { amount, .. } => {
                require_positive(*amount)?;
                let new_supply = self.supply.checked_add(*amount).ok_or_else(|| {
                    PipelineError::InvalidPayload(format!(
                        "mint of {} would overflow total supply",
                        amount
                    ))
                })?;
                if let Some(max) = self.max_supply {
                    if new_supply > max {
                        return Err(PipelineError::InvalidPayload(format!(
                            "mint of {} would exceed max supply {} (current supply {})",
                            amount, max, self.supply
                        )));
                    }
                }
                Ok(())
            }
            Operation::TokenBurn { amount } => {
                require_positive(*amount)?;
                let balance = self.balance_of(from);
                if *amount > balance {
                    return Err(PipelineError::InvalidPayload(format!(
                        "burn of {} exceeds balance {}",
                        amount, balance
                    )));
                }
                Ok(())
            }
            Operation::TokenTransfer { to, amount } => {
                require_positive(*amount)?;
                if to.is_empty() {
                    return Err(PipelineError::InvalidPayload(
                        "recipient address is empty".into(),
                    ));
                }
                let balance = self.balance_of(from);
                if *amount > balance {
                    return Err(PipelineError::InvalidPayload(format!(
                        "transfer of {} exceeds balance {}",
                        amount, balance
                    )));
                }
                Ok(())
            }
            Operation::TokenSetMetadata { key, .. } => {
                if key.is_empty() {
                    return Err(PipelineError::InvalidPayload("metadata key is empty".into()));
                }
                Ok(())
            }
            Operation::TokenGrant { address, .. } | Operation::TokenRevoke { address, .. } => {
                if address.is_empty() {
                    return Err(PipelineError::InvalidPayload("grantee address is empty".into()));
                }
                Ok(())
            }
            _ => Err(PipelineError::InvalidPayload(
                "not a token operation".into(),
            )),
        }
    }
}

fn require_positive(amount: u64) -> Result<(), PipelineError> {
    if amount == 0 {
        return Err(PipelineError::InvalidPayload(
            "amount must be greater than 0".into(),
        ));
    }
    Ok(())
}

/// Derive an opaque token id from its creation parameters
fn token_id(name: &str, symbol: &str, owner: &str, created_at: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"meridian-token-v1");
    hasher.update(name.as_bytes());
    hasher.update(symbol.as_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(created_at.to_le_bytes());
    hasher.update(rand::random::<[u8; 8]>());
    let digest = hasher.finalize();
    format!("tok1{}", hex::encode(&digest[..12]))
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    revision: u64,
    tokens: BTreeMap<String, Token>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            revision: 0,
            tokens: BTreeMap::new(),
        }
    }
}

impl Versioned for RegistryFile {
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

/// On-disk token registry; the only write path for token state.
pub struct TokenRegistry {
    path: PathBuf,
    file: RegistryFile,
}

impl TokenRegistry {
    /// Open the registry at `path`, starting empty if none exists
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let file: RegistryFile = read_store(path)?;
        if file.version != REGISTRY_VERSION {
            return Err(PipelineError::Storage(format!(
                "unsupported token registry version: {} (expected {})",
                file.version, REGISTRY_VERSION
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Re-read the registry from disk, discarding in-memory changes
    pub fn reload(&mut self) -> Result<(), PipelineError> {
        self.file = read_store(&self.path)?;
        Ok(())
    }

    fn persist(&mut self) -> Result<(), PipelineError> {
        let expected = self.file.revision;
        match write_store(&self.path, &mut self.file, expected) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.reload();
                Err(err)
            }
        }
    }

    /// All tokens, ordered by id
    pub fn list(&self) -> impl Iterator<Item = &Token> {
        self.file.tokens.values()
    }

    /// Tokens owned by `address`
    pub fn list_by_owner<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a Token> {
        self.list().filter(move |t| t.owner == address)
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.file.tokens.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Token, PipelineError> {
        self.get(id).ok_or(PipelineError::NotFound(ResourceKind::Token))
    }

    /// Create a new token owned by `owner`.
    ///
    /// Creation seeds the owner's grants and balance; subsequent mutation
    /// happens only through [`TokenRegistry::apply`].
    #[allow(clippy::too_many_arguments)]
    pub fn create_token(
        &mut self,
        name: &str,
        symbol: &str,
        token_type: TokenType,
        owner: &str,
        initial_supply: u64,
        max_supply: Option<u64>,
        decimals: u8,
    ) -> Result<Token, PipelineError> {
        if name.is_empty() || symbol.is_empty() {
            return Err(PipelineError::InvalidPayload(
                "token name and symbol are required".into(),
            ));
        }
        if let Some(max) = max_supply {
            if initial_supply > max {
                return Err(PipelineError::InvalidPayload(format!(
                    "initial supply {} exceeds max supply {}",
                    initial_supply, max
                )));
            }
        }

        let token = Token::new(
            name.to_string(),
            symbol.to_string(),
            token_type,
            owner.to_string(),
            initial_supply,
            max_supply,
            decimals,
            chrono::Utc::now().timestamp() as u64,
        );

        self.file.tokens.insert(token.id.clone(), token.clone());
        self.persist()?;
        Ok(token)
    }

    /// Apply a verified intent to the targeted token.
    ///
    /// Re-validates before mutating so that a failure leaves the token
    /// untouched; the intent is applied in full or not at all.
    pub fn apply(&mut self, intent: &TransactionIntent) -> Result<(), PipelineError> {
        let token = self
            .file
            .tokens
            .get_mut(&intent.target)
            .ok_or(PipelineError::NotFound(ResourceKind::Token))?;

        token.validate(&intent.from, &intent.operation)?;

        match &intent.operation {
            Operation::TokenMint { to, amount } => {
                token.supply += amount;
                *token.balances.entry(to.clone()).or_insert(0) += amount;
            }
            Operation::TokenBurn { amount } => {
                token.supply -= amount;
                let balance = token.balances.entry(intent.from.clone()).or_insert(0);
                *balance -= amount;
                if *balance == 0 {
                    token.balances.remove(&intent.from);
                }
            }
            Operation::TokenTransfer { to, amount } => {
                let balance = token.balances.entry(intent.from.clone()).or_insert(0);
                *balance -= amount;
                if *balance == 0 {
                    token.balances.remove(&intent.from);
                }
                *token.balances.entry(to.clone()).or_insert(0) += amount;
            }
            Operation::TokenSetMetadata { key, value } => {
                token.metadata.insert(key.clone(), value.clone());
            }
            Operation::TokenGrant {
                address,
                capability,
            } => {
                token.grant(address, *capability);
            }
            Operation::TokenRevoke {
                address,
                capability,
            } => {
                token.revoke(address, *capability);
            }
            _ => {
                return Err(PipelineError::InvalidPayload(
                    "not a token operation".into(),
                ));
            }
        }

        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "mrd1alice";
    const BOB: &str = "mrd1bob";

    fn test_token() -> Token {
        Token::new(
            "Coin".into(),
            "COIN".into(),
            TokenType::Fungible,
            ALICE.into(),
            1000,
            Some(5000),
            18,
            0,
        )
    }

    #[test]
    fn test_creation_seeds_owner() {
        let token = test_token();
        assert_eq!(token.supply, 1000);
        assert_eq!(token.balance_of(ALICE), 1000);
        for cap in Capability::ALL {
            assert!(token.has_capability(ALICE, cap));
        }
        assert!(!token.has_capability(BOB, Capability::Mint));
    }

    #[test]
    fn test_mint_headroom() {
        let token = test_token();

        // supply 1000, max 5000: headroom is 4000
        assert!(token
            .validate(ALICE, &Operation::TokenMint { to: ALICE.into(), amount: 4000 })
            .is_ok());
        assert!(matches!(
            token.validate(ALICE, &Operation::TokenMint { to: ALICE.into(), amount: 4001 }),
            Err(PipelineError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_unlimited_supply_when_no_max() {
        let mut token = test_token();
        token.max_supply = None;
        assert!(token
            .validate(ALICE, &Operation::TokenMint { to: ALICE.into(), amount: u64::MAX / 2 })
            .is_ok());
    }

    #[test]
    fn test_mint_overflow_rejected() {
        // No max supply still bounds minting at u64 capacity.
        let mut token = test_token();
        token.max_supply = None;

        assert!(matches!(
            token.validate(ALICE, &Operation::TokenMint { to: ALICE.into(), amount: u64::MAX }),
            Err(PipelineError::InvalidPayload(_))
        ));

        // The registry write path refuses it too, mutating nothing.
        let dir = tempfile::TempDir::new().unwrap();
        let mut registry = TokenRegistry::open(&dir.path().join("tokens.json")).unwrap();
        let token = registry
            .create_token("Coin", "COIN", TokenType::Fungible, ALICE, 1000, None, 18)
            .unwrap();

        let intent = TransactionIntent::unsigned_for_tests(
            ALICE,
            Operation::TokenMint { to: ALICE.into(), amount: u64::MAX },
            &token.id,
        );
        assert!(matches!(
            registry.apply(&intent),
            Err(PipelineError::InvalidPayload(_))
        ));
        assert_eq!(registry.get(&token.id).unwrap().supply, 1000);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let token = test_token();
        for op in [
            Operation::TokenMint { to: ALICE.into(), amount: 0 },
            Operation::TokenBurn { amount: 0 },
            Operation::TokenTransfer { to: BOB.into(), amount: 0 },
        ] {
            assert!(matches!(
                token.validate(ALICE, &op),
                Err(PipelineError::InvalidPayload(_))
            ));
        }
    }

    #[test]
    fn test_burn_and_transfer_bounded_by_balance() {
        let token = test_token();

        assert!(token.validate(ALICE, &Operation::TokenBurn { amount: 1000 }).is_ok());
        assert!(token.validate(ALICE, &Operation::TokenBurn { amount: 1001 }).is_err());

        // Bob holds nothing.
        assert!(token
            .validate(BOB, &Operation::TokenTransfer { to: ALICE.into(), amount: 1 })
            .is_err());
    }

    #[test]
    fn test_registry_apply_mint() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut registry = TokenRegistry::open(&dir.path().join("tokens.json")).unwrap();

        let token = registry
            .create_token("Coin", "COIN", TokenType::Fungible, ALICE, 1000, Some(5000), 18)
            .unwrap();

        let intent = TransactionIntent::unsigned_for_tests(
            ALICE,
            Operation::TokenMint { to: BOB.into(), amount: 500 },
            &token.id,
        );
        registry.apply(&intent).unwrap();

        let token = registry.get(&token.id).unwrap();
        assert_eq!(token.supply, 1500);
        assert_eq!(token.balance_of(BOB), 500);
        assert_eq!(token.balance_of(ALICE), 1000);
    }

    #[test]
    fn test_registry_apply_failure_mutates_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut registry = TokenRegistry::open(&dir.path().join("tokens.json")).unwrap();

        let token = registry
            .create_token("Coin", "COIN", TokenType::Fungible, ALICE, 1000, Some(5000), 18)
            .unwrap();

        let intent = TransactionIntent::unsigned_for_tests(
            ALICE,
            Operation::TokenBurn { amount: 2000 },
            &token.id,
        );
        assert!(registry.apply(&intent).is_err());

        let token = registry.get(&token.id).unwrap();
        assert_eq!(token.supply, 1000);
        assert_eq!(token.balance_of(ALICE), 1000);
    }

    #[test]
    fn test_initial_supply_over_max_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut registry = TokenRegistry::open(&dir.path().join("tokens.json")).unwrap();

        assert!(registry
            .create_token("Coin", "COIN", TokenType::Fungible, ALICE, 10_000, Some(5000), 18)
            .is_err());
    }
}
