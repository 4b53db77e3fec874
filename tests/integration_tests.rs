//! Integration tests for meridian-wallet
//!
//! These tests run the full pipeline end to end:
//! - Identity lifecycle (create, unlock, default selection)
//! - Token authorization, minting, burning, and transfers
//! - Domain registration, transfer, and renewal
//! - Error taxonomy across the pipeline stages

use meridian_wallet::{
    config,
    dispatch::{DispatchOutcome, Dispatcher, RunMode},
    error::{PipelineError, ResourceKind},
    intent::{IntentBuilder, Operation},
    naming::DomainRegistry,
    rpc::RpcClient,
    token::{TokenRegistry, TokenType},
    IdentityStore, Session,
};
use tempfile::TempDir;

const TEST_PASSWORD: &str = "secure-test-password-123!";

/// Full local environment: keystore plus both registries in one temp dir.
struct Harness {
    _dir: TempDir,
    identities: IdentityStore,
    tokens: TokenRegistry,
    domains: DomainRegistry,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let identities = IdentityStore::open(&config::keystore_path(dir.path())).unwrap();
        let tokens = TokenRegistry::open(&config::tokens_path(dir.path())).unwrap();
        let domains = DomainRegistry::open(&config::domains_path(dir.path())).unwrap();
        Self {
            _dir: dir,
            identities,
            tokens,
            domains,
        }
    }

    fn create_identity(&mut self, name: &str) -> String {
        let (identity, _) = self
            .identities
            .create(name, TEST_PASSWORD, TEST_PASSWORD)
            .unwrap();
        identity.address
    }

    /// Build and offline-dispatch one operation as `address`
    async fn dispatch_as(
        &mut self,
        address: &str,
        operation: Operation,
        target: &str,
    ) -> Result<DispatchOutcome, PipelineError> {
        self.dispatch_with_secret(address, operation, target, TEST_PASSWORD)
            .await
    }

    async fn dispatch_with_secret(
        &mut self,
        address: &str,
        operation: Operation,
        target: &str,
        secret: &str,
    ) -> Result<DispatchOutcome, PipelineError> {
        let mut session = Session::initialize(&self.identities, RunMode::Offline);
        session.switch_active(&self.identities, address)?;

        let intent = IntentBuilder::new(&self.identities, &self.tokens, &self.domains).build(
            &session, operation, target, secret,
        )?;

        // Offline dispatch never touches the channel.
        let channel = RpcClient::new("http://127.0.0.1:1").unwrap();
        Dispatcher::new(RunMode::Offline)
            .dispatch(
                &intent,
                &self.identities,
                &mut self.tokens,
                &mut self.domains,
                &channel,
            )
            .await
    }
}

// ============================================================================
// Identity Lifecycle Tests
// ============================================================================

mod identity_lifecycle {
    use super::*;

    #[test]
    fn test_create_and_unlock() {
        let mut h = Harness::new();

        let alice = h.create_identity("alice");
        let bob = h.create_identity("bob");

        // Fresh keys every time: addresses never collide.
        assert_ne!(alice, bob);
        assert!(alice.starts_with("mrd1"));

        // The right password unlocks; a wrong one fails closed.
        let identity = h.identities.get(&alice).unwrap();
        assert!(identity.unlock(TEST_PASSWORD).is_ok());
        assert_eq!(
            identity.unlock("wrong").unwrap_err(),
            PipelineError::InvalidSecret
        );
    }

    #[test]
    fn test_set_default_is_idempotent() {
        let mut h = Harness::new();

        let _alice = h.create_identity("alice");
        let bob = h.create_identity("bob");

        h.identities.set_default(&bob).unwrap();
        h.identities.set_default(&bob).unwrap();
        h.identities.set_default(&bob).unwrap();

        // Exactly one default, and reopening the store agrees.
        assert_eq!(h.identities.default_identity().unwrap().address, bob);
        let reopened =
            IdentityStore::open(&config::keystore_path(h._dir.path())).unwrap();
        assert_eq!(reopened.default_identity().unwrap().address, bob);
    }

    #[test]
    fn test_session_tracks_keystore_default() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");

        let session = Session::initialize(&h.identities, RunMode::Offline);
        assert_eq!(session.active(), Some(alice.as_str()));
    }
}

// ============================================================================
// Token Scenario Tests
// ============================================================================

mod token_scenarios {
    use super::*;
    use meridian_wallet::authz::Capability;

    #[tokio::test]
    async fn test_mint_and_burn_scenario() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");

        // Coin with initial supply 1000 and max supply 5000.
        let token = h
            .tokens
            .create_token("Coin", "COIN", TokenType::Fungible, &alice, 1000, Some(5000), 18)
            .unwrap();

        // Mint 500: allowed, supply becomes 1500.
        h.dispatch_as(&alice, Operation::TokenMint { to: alice.clone(), amount: 500 }, &token.id)
            .await
            .unwrap();
        assert_eq!(h.tokens.get(&token.id).unwrap().supply, 1500);

        // Mint 4000: would land at 5500 > 5000, rejected.
        let err = h
            .dispatch_as(&alice, Operation::TokenMint { to: alice.clone(), amount: 4000 }, &token.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
        assert_eq!(h.tokens.get(&token.id).unwrap().supply, 1500);

        // Burn 2000: exceeds the 1500 balance, rejected.
        let err = h
            .dispatch_as(&alice, Operation::TokenBurn { amount: 2000 }, &token.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
        assert_eq!(h.tokens.get(&token.id).unwrap().supply, 1500);
        assert_eq!(h.tokens.get(&token.id).unwrap().balance_of(&alice), 1500);
    }

    #[tokio::test]
    async fn test_transfer_requires_grant_and_balance() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");
        let bob = h.create_identity("bob");

        let token = h
            .tokens
            .create_token("Coin", "COIN", TokenType::Fungible, &alice, 1000, Some(5000), 18)
            .unwrap();

        // Bob has no transfer grant: denied before any balance check.
        let err = h
            .dispatch_as(&bob, Operation::TokenTransfer { to: alice.clone(), amount: 1 }, &token.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));

        // Grant bob transfer rights; he still holds nothing.
        h.dispatch_as(
            &alice,
            Operation::TokenGrant { address: bob.clone(), capability: Capability::Transfer },
            &token.id,
        )
        .await
        .unwrap();

        let err = h
            .dispatch_as(&bob, Operation::TokenTransfer { to: alice.clone(), amount: 1 }, &token.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));

        // Fund bob, then his transfer goes through.
        h.dispatch_as(&alice, Operation::TokenTransfer { to: bob.clone(), amount: 100 }, &token.id)
            .await
            .unwrap();
        h.dispatch_as(&bob, Operation::TokenTransfer { to: alice.clone(), amount: 40 }, &token.id)
            .await
            .unwrap();

        let token = h.tokens.get(&token.id).unwrap();
        assert_eq!(token.balance_of(&bob), 60);
        assert_eq!(token.balance_of(&alice), 940);
        // Supply is conserved by transfers.
        assert_eq!(token.supply, 1000);
    }

    #[tokio::test]
    async fn test_owner_revocation_is_respected() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");

        let token = h
            .tokens
            .create_token("Coin", "COIN", TokenType::Fungible, &alice, 1000, None, 18)
            .unwrap();

        // The owner revokes their own transfer grant.
        h.dispatch_as(
            &alice,
            Operation::TokenRevoke { address: alice.clone(), capability: Capability::Transfer },
            &token.id,
        )
        .await
        .unwrap();

        // Ownership does not override the grant set.
        let err = h
            .dispatch_as(
                &alice,
                Operation::TokenTransfer { to: "mrd1somebody".into(), amount: 1 },
                &token.id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));

        // Other capabilities are untouched.
        h.dispatch_as(&alice, Operation::TokenMint { to: alice.clone(), amount: 10 }, &token.id)
            .await
            .unwrap();
    }
}

// ============================================================================
// Domain Scenario Tests
// ============================================================================

mod domain_scenarios {
    use super::*;
    use meridian_wallet::naming::RecordType;

    #[tokio::test]
    async fn test_register_transfer_renew_scenario() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");
        let bob = h.create_identity("bob");

        // Alice registers the name.
        h.dispatch_as(&alice, Operation::DomainRegister { period_days: 365 }, "example")
            .await
            .unwrap();
        assert_eq!(h.domains.get("example").unwrap().owner, alice);

        // Bob cannot register the same name while it is held.
        let err = h
            .dispatch_as(&bob, Operation::DomainRegister { period_days: 365 }, "example")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));

        // Alice transfers the name to bob.
        h.dispatch_as(&alice, Operation::DomainTransfer { to: bob.clone() }, "example")
            .await
            .unwrap();
        assert_eq!(h.domains.get("example").unwrap().owner, bob);

        // Alice no longer owns it: her renewal is denied.
        let err = h
            .dispatch_as(&alice, Operation::DomainRenew { period_days: 365 }, "example")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));

        // Bob's renewal extends the term.
        let before = h.domains.get("example").unwrap().expires_at;
        h.dispatch_as(&bob, Operation::DomainRenew { period_days: 30 }, "example")
            .await
            .unwrap();
        assert_eq!(
            h.domains.get("example").unwrap().expires_at,
            before + 30 * 86_400
        );
    }

    #[tokio::test]
    async fn test_registration_resolves_to_owner() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");

        // Mixed case in, normalized name out.
        h.dispatch_as(&alice, Operation::DomainRegister { period_days: 365 }, "Example")
            .await
            .unwrap();

        let now = chrono::Utc::now().timestamp() as u64;
        assert_eq!(h.domains.resolve("example", now), Some(alice.as_str()));
        assert_eq!(h.domains.reverse_resolve(&alice, now), Some("example"));
    }

    #[tokio::test]
    async fn test_only_owner_manages_records() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");
        let bob = h.create_identity("bob");

        h.dispatch_as(&alice, Operation::DomainRegister { period_days: 365 }, "example")
            .await
            .unwrap();

        let err = h
            .dispatch_as(
                &bob,
                Operation::DomainSetRecord { record: RecordType::Text, value: "mine now".into() },
                "example",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));

        h.dispatch_as(
            &alice,
            Operation::DomainSetRecord { record: RecordType::Text, value: "hello".into() },
            "example",
        )
        .await
        .unwrap();
        assert_eq!(
            h.domains.get("example").unwrap().record(RecordType::Text),
            Some("hello")
        );
    }
}

// ============================================================================
// Pipeline Error Tests
// ============================================================================

mod pipeline_errors {
    use super::*;

    #[tokio::test]
    async fn test_no_active_identity() {
        let h = Harness::new();

        let session = Session::initialize(&h.identities, RunMode::Offline);
        let err = IntentBuilder::new(&h.identities, &h.tokens, &h.domains)
            .build(
                &session,
                Operation::DomainRegister { period_days: 365 },
                "example",
                TEST_PASSWORD,
            )
            .unwrap_err();
        assert_eq!(err, PipelineError::NoActiveIdentity);
    }

    #[tokio::test]
    async fn test_wrong_password_applies_nothing() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");

        let token = h
            .tokens
            .create_token("Coin", "COIN", TokenType::Fungible, &alice, 1000, Some(5000), 18)
            .unwrap();

        let err = h
            .dispatch_with_secret(
                &alice,
                Operation::TokenMint { to: alice.clone(), amount: 500 },
                &token.id,
                "wrong-password",
            )
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::InvalidSecret);
        assert_eq!(h.tokens.get(&token.id).unwrap().supply, 1000);
    }

    #[tokio::test]
    async fn test_unknown_targets_are_not_found() {
        let mut h = Harness::new();
        let alice = h.create_identity("alice");

        let err = h
            .dispatch_as(&alice, Operation::TokenBurn { amount: 1 }, "tok1ffffffffffffffffffffffff")
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::NotFound(ResourceKind::Token));

        let err = h
            .dispatch_as(&alice, Operation::DomainRenew { period_days: 1 }, "nosuchname")
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::NotFound(ResourceKind::Domain));
    }
}
