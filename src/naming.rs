//! Naming System
//!
//! Domain records for the Meridian naming system. A domain's status is a
//! pure function of its expiration timestamp and the current time; it is
//! recomputed on every read and never cached. All mutating fields change
//! only through [`DomainRegistry::apply`].

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, ResourceKind};
use crate::intent::{Operation, TransactionIntent};
use crate::storage::{read_store, write_store, Versioned};

/// Current domain registry file format version
const REGISTRY_VERSION: u32 = 1;

/// Default registration/renewal period
pub const DEFAULT_PERIOD_DAYS: u64 = 365;

/// Post-expiration grace period during which the owner may still renew
pub const GRACE_PERIOD_SECS: u64 = 30 * 86_400;

const SECS_PER_DAY: u64 = 86_400;

/// Closed set of record types; unknown types are rejected at the CLI
/// parsing boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Account address the name resolves to
    Address,
    /// Canonical name alias
    Cname,
    /// Free-form text record
    Text,
    /// Content hash pointer
    ContentHash,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::Address => write!(f, "address"),
            RecordType::Cname => write!(f, "cname"),
            RecordType::Text => write!(f, "text"),
            RecordType::ContentHash => write!(f, "content-hash"),
        }
    }
}

/// Lifecycle state, derived from `expires_at` on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStatus {
    Available,
    Registered,
    Grace,
    Expired,
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainStatus::Available => write!(f, "available"),
            DomainStatus::Registered => write!(f, "registered"),
            DomainStatus::Grace => write!(f, "grace"),
            DomainStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A registered domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    /// Normalized (lowercase) name, unique in the registry
    pub name: String,
    pub owner: String,
    pub registered_at: u64,
    pub expires_at: u64,
    /// Optional resolver contract/address
    pub resolver: Option<String>,
    records: BTreeMap<RecordType, String>,
}

impl Domain {
    // Callers validate the period via `period_secs` first; saturation here
    // only guards the constructor itself.
    pub(crate) fn new(name: String, owner: String, now: u64, period_days: u64) -> Self {
        Self {
            name,
            owner,
            registered_at: now,
            expires_at: now.saturating_add(period_days.saturating_mul(SECS_PER_DAY)),
            resolver: None,
            records: BTreeMap::new(),
        }
    }

    /// Status at `now`; pure, never cached
    pub fn status_at(&self, now: u64) -> DomainStatus {
        if now < self.expires_at {
            DomainStatus::Registered
        } else if now < self.expires_at + GRACE_PERIOD_SECS {
            DomainStatus::Grace
        } else {
            DomainStatus::Expired
        }
    }

    /// Status right now
    pub fn status(&self) -> DomainStatus {
        self.status_at(unix_now())
    }

    /// Value of one record, if set
    pub fn record(&self, record_type: RecordType) -> Option<&str> {
        self.records.get(&record_type).map(String::as_str)
    }

    /// All records, for display
    pub fn records(&self) -> &BTreeMap<RecordType, String> {
        &self.records
    }

    /// Validate an operation payload against this domain at `now`.
    pub fn validate(&self, operation: &Operation, now: u64) -> Result<(), PipelineError> {
        let status = self.status_at(now);

        match operation {
            Operation::DomainRenew { period_days } => {
                let secs = period_secs(*period_days)?;
                if status == DomainStatus::Expired {
                    return Err(PipelineError::InvalidPayload(
                        "registration lapsed past the grace period".into(),
                    ));
                }
                // The extended expiry must stay representable.
                self.expires_at.max(now).checked_add(secs).ok_or_else(|| {
                    PipelineError::InvalidPayload("renewal period too large".into())
                })?;
                Ok(())
            }
            Operation::DomainTransfer { to } => {
                if to.is_empty() {
                    return Err(PipelineError::InvalidPayload(
                        "new owner address is empty".into(),
                    ));
                }
                if status == DomainStatus::Expired {
                    return Err(PipelineError::InvalidPayload(
                        "cannot transfer an expired domain".into(),
                    ));
                }
                Ok(())
            }
            Operation::DomainSetRecord { value, .. } => {
                if value.is_empty() {
                    return Err(PipelineError::InvalidPayload("record value is empty".into()));
                }
                Ok(())
            }
            Operation::DomainRemoveRecord { record } => {
                if self.record(*record).is_none() {
                    return Err(PipelineError::InvalidPayload(format!(
                        "record not set: {record}"
                    )));
                }
                Ok(())
            }
            Operation::DomainSetResolver { .. } => Ok(()),
            _ => Err(PipelineError::InvalidPayload(
                "not a domain operation".into(),
            )),
        }
    }
}

/// Normalize and validate a domain name.
///
/// Names are case-insensitive; 3 to 63 characters from `[a-z0-9-]`, no
/// leading or trailing hyphen.
pub fn normalize_name(name: &str) -> Result<String, PipelineError> {
    let name = name.trim().to_lowercase();

    if name.len() < 3 || name.len() > 63 {
        return Err(PipelineError::InvalidPayload(
            "domain name must be 3 to 63 characters".into(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(PipelineError::InvalidPayload(
            "domain name cannot start or end with a hyphen".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(PipelineError::InvalidPayload(
            "domain name may only contain a-z, 0-9, and hyphens".into(),
        ));
    }

    Ok(name)
}

/// Convert a registration/renewal period to seconds, rejecting periods
/// that cannot be represented.
pub(crate) fn period_secs(period_days: u64) -> Result<u64, PipelineError> {
    if period_days == 0 {
        return Err(PipelineError::InvalidPayload(
            "period must be greater than 0".into(),
        ));
    }
    period_days
        .checked_mul(SECS_PER_DAY)
        .ok_or_else(|| PipelineError::InvalidPayload("period too large".into()))
}

pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    revision: u64,
    domains: BTreeMap<String, Domain>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            revision: 0,
            domains: BTreeMap::new(),
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

/// On-disk domain registry; the only write path for domain state.
pub struct DomainRegistry {
    path: PathBuf,
    file: RegistryFile,
}

impl DomainRegistry {
    /// Open the registry at `path`, starting empty if none exists
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let file: RegistryFile = read_store(path)?;
        if file.version != REGISTRY_VERSION {
            return Err(PipelineError::Storage(format!(
                "unsupported domain registry version: {} (expected {})",
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

    /// All domains, ordered by name
    pub fn list(&self) -> impl Iterator<Item = &Domain> {
        self.file.domains.values()
    }

    /// Domains owned by `address`
    pub fn list_by_owner<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a Domain> {
        self.list().filter(move |d| d.owner == address)
    }

    /// Look up a domain by (unnormalized) name
    pub fn get(&self, name: &str) -> Option<&Domain> {
        let name = normalize_name(name).ok()?;
        self.file.domains.get(&name)
    }

    pub fn require(&self, name: &str) -> Result<&Domain, PipelineError> {
        self.get(name)
            .ok_or(PipelineError::NotFound(ResourceKind::Domain))
    }

    /// Check whether `name` can be registered at `now`.
    ///
    /// A name is available when it was never registered or when a previous
    /// registration has lapsed past its grace period.
    pub fn check_available(&self, name: &str, now: u64) -> Result<(), PipelineError> {
        let name = normalize_name(name)?;

        if let Some(domain) = self.file.domains.get(&name) {
            match domain.status_at(now) {
                DomainStatus::Expired => Ok(()),
                status => Err(PipelineError::InvalidPayload(format!(
                    "domain is not available (status: {status})"
                ))),
            }
        } else {
            Ok(())
        }
    }

    /// Resolve a name to the address in its `address` record.
    ///
    /// Only registered (non-lapsed) domains resolve.
    pub fn resolve(&self, name: &str, now: u64) -> Option<&str> {
        let domain = self.get(name)?;
        if domain.status_at(now) != DomainStatus::Registered {
            return None;
        }
        domain.record(RecordType::Address)
    }

    /// Reverse-resolve an address to the first registered name pointing at it
    pub fn reverse_resolve(&self, address: &str, now: u64) -> Option<&str> {
        self.list()
            .filter(|d| d.status_at(now) == DomainStatus::Registered)
            .find(|d| d.record(RecordType::Address) == Some(address))
            .map(|d| d.name.as_str())
    }

    /// Apply a verified intent to the targeted domain.
    ///
    /// Registration inserts (or replaces a lapsed registration); every other
    /// operation re-validates against the existing record first. All-or-
    /// nothing: a failure leaves the registry untouched.
    pub fn apply(&mut self, intent: &TransactionIntent, now: u64) -> Result<(), PipelineError> {
        match &intent.operation {
            Operation::DomainRegister { period_days } => {
                let secs = period_secs(*period_days)?;
                now.checked_add(secs).ok_or_else(|| {
                    PipelineError::InvalidPayload("registration period too large".into())
                })?;
                self.check_available(&intent.target, now)?;

                let name = normalize_name(&intent.target)?;
                let mut domain = Domain::new(name.clone(), intent.from.clone(), now, *period_days);
                // Seed the address record so the name resolves to its owner.
                domain
                    .records
                    .insert(RecordType::Address, intent.from.clone());

                self.file.domains.insert(name, domain);
            }
            op => {
                let name = normalize_name(&intent.target)?;
                let domain = self
                    .file
                    .domains
                    .get_mut(&name)
                    .ok_or(PipelineError::NotFound(ResourceKind::Domain))?;

                domain.validate(op, now)?;

                match op {
                    Operation::DomainRenew { period_days } => {
                        // Renewal in grace restarts from now; otherwise it
                        // extends the current term. The bound was checked in
                        // validate above.
                        let base = domain.expires_at.max(now);
                        domain.expires_at =
                            base.saturating_add(period_days.saturating_mul(SECS_PER_DAY));
                    }
                    Operation::DomainTransfer { to } => {
                        domain.owner = to.clone();
                    }
                    Operation::DomainSetRecord { record, value } => {
                        domain.records.insert(*record, value.clone());
                    }
                    Operation::DomainRemoveRecord { record } => {
                        domain.records.remove(record);
                    }
                    Operation::DomainSetResolver { resolver } => {
                        domain.resolver = resolver.clone();
                    }
                    _ => {
                        return Err(PipelineError::InvalidPayload(
                            "not a domain operation".into(),
                        ));
                    }
                }
            }
        }

        self.persist()
    }
}
