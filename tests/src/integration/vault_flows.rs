//! # Vault Flows
//!
//! End-to-end behavior of the authorized vault on the in-memory host:
//!
//! 1. **Lifecycle**: unconfigured → one grant → sealed
//! 2. **Treasury**: withdrawals through the vault, waiting period, sweep
//! 3. **Atomicity**: failed forwards leave ledger, `LastInvocation` and events untouched
//! 4. **Reentrancy**: endpoints that call back into the vault
//! 5. **Concurrency**: independent tasks submitting at once, direct host calls

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use qc_18_authorized_vault::prelude::*;
    use std::sync::{Arc, OnceLock, Weak};

    type Vault = AuthorizedVaultService<InMemoryHost>;

    fn player() -> Address {
        Address::new([0x11; 20])
    }

    fn token() -> Address {
        Address::new([0x70; 20])
    }

    fn deployer(d: &InMemoryDeployment) -> Address {
        d.vault.config().authority
    }

    fn funded(config: VaultConfig) -> InMemoryDeployment {
        let d = deploy_in_memory(config, Timestamp::from_secs(1_700_000_000));
        d.host
            .ledger()
            .mint(token(), d.vault.address(), U256::exp10(24));
        d
    }

    // =============================================================================
    // TEST FIXTURES: RELAY ENDPOINT
    // =============================================================================

    /// Endpoint that submits a stored envelope back into the vault, as itself.
    struct Relay {
        address: Address,
        vault: OnceLock<Weak<Vault>>,
        inner: Vec<u8>,
        fail_after: bool,
    }

    #[async_trait]
    impl CallableEndpoint for Relay {
        async fn invoke(&self, call: ForwardCall) -> Result<Bytes, EndpointError> {
            let vault = self
                .vault
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| EndpointError::Reverted("vault gone".into()))?;

            // Nested forward failures bubble up unchanged; rejections
            // become a revert of this endpoint.
            let output = vault
                .submit(self.address, &self.inner)
                .await
                .map_err(|e| match e {
                    VaultError::Execution(ExecutionError::ForwardFailed(inner)) => inner,
                    other => EndpointError::Reverted(other.to_string()),
                })?;

            if self.fail_after {
                return Err(EndpointError::Reverted("relay aborted".into()));
            }
            Ok(output)
        }
    }

    const RELAY_OP: Selector = Selector::new([0xaa, 0xbb, 0xcc, 0xdd]);

    /// Vault with a relay that withdraws the limit to the player.
    async fn relay_setup(
        config: VaultConfig,
        inner: impl FnOnce(Address, Address) -> Vec<u8>,
        fail_after: bool,
    ) -> (InMemoryDeployment, Address) {
        let d = funded(config);
        let vault = d.vault.address();
        let relay_addr = Address::new([0x55; 20]);

        let relay = Arc::new(Relay {
            address: relay_addr,
            vault: OnceLock::new(),
            inner: inner(vault, relay_addr),
            fail_after,
        });
        let _ = relay.vault.set(Arc::downgrade(&d.vault));
        d.host.deploy(relay_addr, relay);

        d.vault
            .grant(
                deployer(&d),
                vec![
                    PermissionKey::derive(RELAY_OP, player(), relay_addr),
                    PermissionKey::derive(RELAY_OP, relay_addr, relay_addr),
                    PermissionKey::derive(selectors::withdraw(), relay_addr, vault),
                ],
            )
            .await
            .expect("grant");
        d.clock.advance(WAITING_PERIOD + 1);
        (d, relay_addr)
    }

    fn inner_withdraw(vault: Address, _relay: Address) -> Vec<u8> {
        encode(vault, &calls::withdraw(token(), player(), withdrawal_limit())).into_vec()
    }

    fn relay_envelope(relay: Address) -> Bytes {
        encode(relay, &Payload::with_args(RELAY_OP, &[]))
    }

    fn self_relay(_vault: Address, relay: Address) -> Vec<u8> {
        relay_envelope(relay).into_vec()
    }

    // =============================================================================
    // TEST FIXTURES: MINTING ENDPOINTS
    // =============================================================================

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    /// Mints `amount` of the token to alice.
    struct Minter {
        ledger: Arc<InMemoryLedger>,
        amount: U256,
    }

    #[async_trait]
    impl CallableEndpoint for Minter {
        async fn invoke(&self, _call: ForwardCall) -> Result<Bytes, EndpointError> {
            self.ledger.mint(token(), alice(), self.amount);
            Ok(Bytes::default())
        }
    }

    /// Mints to alice, yields to the scheduler, then reverts.
    struct LateFailure {
        ledger: Arc<InMemoryLedger>,
    }

    #[async_trait]
    impl CallableEndpoint for LateFailure {
        async fn invoke(&self, _call: ForwardCall) -> Result<Bytes, EndpointError> {
            self.ledger.mint(token(), alice(), U256::from(1_000));
            tokio::task::yield_now().await;
            Err(EndpointError::Reverted("late failure".into()))
        }
    }

    // =============================================================================
    // LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_lifecycle() {
        let d = funded(VaultConfig::default());
        let vault = d.vault.address();
        let envelope = encode(vault, &calls::withdraw(token(), player(), withdrawal_limit()));

        // Unconfigured: everything is NotInitialized.
        let err = d.vault.submit(player(), envelope.as_slice()).await.unwrap_err();
        assert_eq!(err, VaultError::from(ConfigurationError::NotInitialized));

        // Only the authority may grant; a failed attempt does not seal.
        let key = PermissionKey::derive(selectors::withdraw(), player(), vault);
        let err = d.vault.grant(player(), vec![key]).await.unwrap_err();
        assert!(matches!(
            err,
            VaultError::Authorization(AuthorizationError::CallerNotAllowed { .. })
        ));
        assert_eq!(d.vault.state().await, ExecutorState::Unconfigured);

        assert_eq!(d.vault.grant(deployer(&d), vec![key]).await.unwrap(), 1);
        assert_eq!(d.vault.state().await, ExecutorState::Configured);
        assert!(matches!(
            d.vault.events().first(),
            Some(VaultEvent::Initialized { keys, .. }) if keys == &vec![key]
        ));

        // Sealed for good.
        let err = d.vault.grant(deployer(&d), Vec::new()).await.unwrap_err();
        assert_eq!(err, VaultError::from(ConfigurationError::AlreadyInitialized));
    }

    // =============================================================================
    // TREASURY THROUGH THE VAULT
    // =============================================================================

    #[tokio::test]
    async fn test_withdraw_waiting_period_and_last_invocation() {
        let d = funded(VaultConfig::default());
        let vault = d.vault.address();
        d.vault
            .grant(
                deployer(&d),
                vec![PermissionKey::derive(selectors::withdraw(), player(), vault)],
            )
            .await
            .unwrap();
        let deployed_at = d.vault.last_invocation().await;
        let envelope = encode(vault, &calls::withdraw(token(), player(), withdrawal_limit()));

        d.clock.advance(WAITING_PERIOD + 1);
        d.vault.submit(player(), envelope.as_slice()).await.unwrap();
        let first = d.vault.last_invocation().await;
        assert!(first > deployed_at);
        assert_eq!(first, d.clock.now());

        // A second withdrawal inside the window fails and changes nothing.
        d.clock.advance(60);
        let snapshot = d.host.ledger().snapshot();
        let err = d.vault.submit(player(), envelope.as_slice()).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::from(EndpointError::WithdrawalWaitingPeriodNotEnded)
        );
        assert!(!err.is_rejection());
        assert_eq!(d.host.ledger().snapshot(), snapshot);
        assert_eq!(d.vault.last_invocation().await, first);

        // The treasury getter is reachable by anyone, directly.
        let out = d
            .host
            .call(player(), vault, calls::last_withdrawal_timestamp())
            .await
            .unwrap();
        assert_eq!(U256::from_big_endian(out.as_slice()), U256::from(first.as_secs()));
    }

    #[tokio::test]
    async fn test_bare_opcode_forwarded() {
        let d = funded(VaultConfig::default());
        let vault = d.vault.address();
        d.vault
            .grant(
                deployer(&d),
                vec![PermissionKey::derive(
                    selectors::last_withdrawal_timestamp(),
                    player(),
                    vault,
                )],
            )
            .await
            .unwrap();
        let deployed_at = d.vault.last_invocation().await;

        let getter = calls::last_withdrawal_timestamp();
        assert_eq!(getter.len(), 4);
        d.clock.advance(30);

        let out = d
            .vault
            .submit(player(), encode(vault, &getter).as_slice())
            .await
            .expect("four-byte payload forwarded");

        assert_eq!(
            U256::from_big_endian(out.as_slice()),
            U256::from(deployed_at.as_secs())
        );
        assert_eq!(d.vault.last_invocation().await, d.clock.now());
        assert_eq!(d.vault.stats().await.forwarded, 1);
    }

    #[tokio::test]
    async fn test_boundary_payload_sizes() {
        let d = funded(VaultConfig::default());
        let vault = d.vault.address();
        d.vault
            .grant(
                deployer(&d),
                vec![PermissionKey::derive(selectors::withdraw(), player(), vault)],
            )
            .await
            .unwrap();

        // Four bytes: decodes, authorizes, then the treasury rejects the
        // missing arguments and the forward is rolled back.
        let bare = Payload::new(selectors::withdraw().as_bytes().to_vec()).unwrap();
        let err = d
            .vault
            .submit(player(), encode(vault, &bare).as_slice())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::Execution(ExecutionError::ForwardFailed(
                EndpointError::InvalidArguments(_)
            ))
        ));

        // Three bytes: malformed before any permission lookup.
        let mut envelope = encode(vault, &bare).into_vec();
        envelope[4 + 2 * 32 + 31] = 3;
        let err = d.vault.submit(player(), &envelope).await.unwrap_err();
        assert_eq!(err, VaultError::from(MalformedReason::MissingOpcode));
    }

    // =============================================================================
    // REENTRANCY
    // =============================================================================

    #[tokio::test]
    async fn test_reentrant_submit() {
        let (d, relay) = relay_setup(VaultConfig::default(), inner_withdraw, false).await;

        d.vault
            .submit(player(), relay_envelope(relay).as_slice())
            .await
            .expect("relay forward");

        assert_eq!(
            d.host.ledger().balance_of(token(), player()),
            withdrawal_limit()
        );
        let forwarded: Vec<_> = d
            .vault
            .events()
            .into_iter()
            .filter(|e| matches!(e, VaultEvent::Forwarded { .. }))
            .collect();
        assert_eq!(forwarded.len(), 2);
        assert_eq!(d.vault.stats().await.forwarded, 2);
    }

    #[tokio::test]
    async fn test_outer_failure_reverts_nested_success() {
        let (d, relay) = relay_setup(VaultConfig::default(), inner_withdraw, true).await;
        let snapshot = d.host.ledger().snapshot();
        let last = d.vault.last_invocation().await;
        let events = d.vault.events();

        let err = d
            .vault
            .submit(player(), relay_envelope(relay).as_slice())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            VaultError::from(EndpointError::Reverted("relay aborted".into()))
        );
        assert_eq!(d.host.ledger().snapshot(), snapshot);
        assert_eq!(d.vault.last_invocation().await, last);
        assert_eq!(d.vault.events(), events);
    }

    #[tokio::test]
    async fn test_reentrant_caller_still_checked() {
        // The relay re-enters with a sweep it was never granted.
        let (d, relay) = relay_setup(
            VaultConfig::default(),
            |vault, relay| encode(vault, &calls::sweep_funds(relay, token())).into_vec(),
            false,
        )
        .await;
        let snapshot = d.host.ledger().snapshot();

        let err = d
            .vault
            .submit(player(), relay_envelope(relay).as_slice())
            .await
            .unwrap_err();

        match err {
            VaultError::Execution(ExecutionError::ForwardFailed(EndpointError::Reverted(msg))) => {
                assert!(msg.contains("not allowed"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(d.host.ledger().snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_call_depth_limit() {
        let config = VaultConfig {
            max_call_depth: 8,
            ..VaultConfig::default()
        };
        // The relay re-submits the envelope that reached it, forever.
        let (d, relay) = relay_setup(config, self_relay, false).await;

        let err = d
            .vault
            .submit(player(), relay_envelope(relay).as_slice())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::from(EndpointError::CallDepthExceeded { depth: 9, max: 8 })
        );

        // Depth unwinds: a fresh top-level call sees depth 1 again.
        let err = d
            .vault
            .submit(player(), relay_envelope(relay).as_slice())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("call depth"), "{err}");
        assert_eq!(d.host.ledger().balance_of(token(), player()), U256::zero());
    }

    #[tokio::test]
    async fn test_self_relay_stops_at_default_depth() {
        let (d, relay) = relay_setup(VaultConfig::default(), self_relay, false).await;
        let snapshot = d.host.ledger().snapshot();
        let events = d.vault.events();

        let err = d
            .vault
            .submit(player(), relay_envelope(relay).as_slice())
            .await
            .unwrap_err();

        let max = limits::MAX_CALL_DEPTH;
        assert_eq!(
            err,
            VaultError::from(EndpointError::CallDepthExceeded {
                depth: max + 1,
                max
            })
        );
        assert_eq!(d.host.ledger().snapshot(), snapshot);
        assert_eq!(d.vault.events(), events);
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[tokio::test]
    async fn test_direct_call_not_lost_to_vault_revert() {
        let d = funded(VaultConfig::default());
        let failing = Address::new([0x66; 20]);
        let minter = Address::new([0x77; 20]);
        d.host.deploy(
            failing,
            Arc::new(LateFailure {
                ledger: d.host.ledger(),
            }),
        );
        d.host.deploy(
            minter,
            Arc::new(Minter {
                ledger: d.host.ledger(),
                amount: U256::from(100),
            }),
        );

        let op = Selector::new([0x01, 0x02, 0x03, 0x04]);
        d.vault
            .grant(
                deployer(&d),
                vec![PermissionKey::derive(op, player(), failing)],
            )
            .await
            .unwrap();

        let envelope = encode(failing, &Payload::with_args(op, &[]));
        let (through_vault, direct) = tokio::join!(
            d.vault.submit(player(), envelope.as_slice()),
            d.host.call(player(), minter, Payload::with_args(op, &[])),
        );

        assert_eq!(
            through_vault.unwrap_err(),
            VaultError::from(EndpointError::Reverted("late failure".into()))
        );
        assert!(direct.is_ok());
        assert_eq!(
            d.host.ledger().balance_of(token(), alice()),
            U256::from(100)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_withdrawals_single_winner() {
        let d = funded(VaultConfig::default());
        let vault = d.vault.address();
        d.vault
            .grant(
                deployer(&d),
                vec![PermissionKey::derive(selectors::withdraw(), player(), vault)],
            )
            .await
            .unwrap();
        d.clock.advance(WAITING_PERIOD + 1);

        let envelope = encode(vault, &calls::withdraw(token(), player(), withdrawal_limit()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let vault = d.vault.clone();
                let envelope = envelope.clone();
                tokio::spawn(async move { vault.submit(player(), envelope.as_slice()).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("join").is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(
            d.host.ledger().balance_of(token(), player()),
            withdrawal_limit()
        );
        let stats = d.vault.stats().await;
        assert_eq!(stats.submitted, 16);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.forward_failures, 15);
    }
}
