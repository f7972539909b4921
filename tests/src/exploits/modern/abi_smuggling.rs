//! # ABI Smuggling
//!
//! **Target:** qc-18 Authorized Vault
//! **Class:** Offset confusion between the permission check and the call
//!
//! ## Attack
//!
//! The vault grants `withdraw` to the player and `sweepFunds` to the
//! deployer only. A gateway that reads the opcode at a fixed byte position
//! (`4 + 32 * 3`) while forwarding whatever the offset word points to can be
//! fooled: the player places the `withdraw` selector at the fixed position
//! and points the offset past it to a `sweepFunds` payload.
//!
//! ```text
//! 0x000  1cff79cd                                   execute(address,bytes)
//! 0x004  000..000 <vault>                           target
//! 0x024  000..080                                   payload offset (0x80)
//! 0x044  000..000                                   padding
//! 0x064  d9caed12 000..000                          decoy: withdraw
//! 0x084  000..044                                   payload length (68)
//! 0x0a4  85fb709d <recovery> <token>                real: sweepFunds
//! ```
//!
//! ## Expected Defense
//!
//! The vault derives the opcode from the decoded payload, so it checks
//! `sweepFunds` for the player, rejects with `CallerNotAllowed` and leaves
//! every balance untouched.

#[cfg(test)]
mod tests {
    use qc_18_authorized_vault::domain::envelope::{address_word, u256_word, WORD_SIZE};
    use qc_18_authorized_vault::prelude::*;

    /// Where a fixed-offset reader looks for the opcode.
    const NAIVE_OPCODE_POSITION: usize = 4 + 3 * WORD_SIZE;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Scenario {
        d: InMemoryDeployment,
        deployer: Address,
        player: Address,
        recovery: Address,
        token: Address,
    }

    impl Scenario {
        fn vault(&self) -> Address {
            self.d.vault.address()
        }

        fn balance(&self, holder: Address) -> U256 {
            self.d.host.ledger().balance_of(self.token, holder)
        }
    }

    /// Vault holding one million tokens, configured with the two grants.
    async fn setup() -> Scenario {
        let d = create_test_vault();
        let deployer = d.vault.config().authority;
        let player = Address::new([0x11; 20]);
        let recovery = Address::new([0x22; 20]);
        let token = Address::new([0x70; 20]);
        let vault = d.vault.address();

        d.host.ledger().mint(token, vault, U256::exp10(24));
        d.vault
            .grant(
                deployer,
                vec![
                    PermissionKey::derive(selectors::sweep_funds(), deployer, vault),
                    PermissionKey::derive(selectors::withdraw(), player, vault),
                ],
            )
            .await
            .expect("grant");

        Scenario {
            d,
            deployer,
            player,
            recovery,
            token,
        }
    }

    /// Builds the attack envelope with an arbitrary payload offset.
    fn smuggle(target: Address, offset: usize, decoy: Selector, payload: &Payload) -> Vec<u8> {
        let mut envelope = Vec::new();
        envelope.extend_from_slice(selectors::execute().as_bytes());
        envelope.extend_from_slice(&address_word(target));
        envelope.extend_from_slice(&u256_word(U256::from(offset)));
        envelope.extend_from_slice(&[0u8; WORD_SIZE]);

        let mut decoy_word = [0u8; WORD_SIZE];
        decoy_word[..4].copy_from_slice(decoy.as_bytes());
        envelope.extend_from_slice(&decoy_word);

        envelope.extend_from_slice(&u256_word(U256::from(payload.len())));
        envelope.extend_from_slice(payload.as_bytes());
        envelope
    }

    fn naive_opcode(envelope: &[u8]) -> Selector {
        Selector::from_prefix(&envelope[NAIVE_OPCODE_POSITION..]).expect("naive read")
    }

    // =============================================================================
    // EXPLOIT TESTS
    // =============================================================================

    #[test]
    fn test_envelope_layout_matches_known_attack() {
        let vault = Address::new([0x0f; 20]);
        let payload = calls::sweep_funds(Address::new([0x22; 20]), Address::new([0x70; 20]));
        let envelope = smuggle(vault, 0x80, selectors::withdraw(), &payload);

        assert_eq!(hex::encode(&envelope[..4]), "1cff79cd");
        assert_eq!(hex::encode(&envelope[0x64..0x68]), "d9caed12");
        assert_eq!(envelope[0x84 + 31], 0x44);
        assert_eq!(hex::encode(&envelope[0xa4..0xa8]), "85fb709d");
    }

    #[test]
    fn test_fixed_offset_reader_is_fooled() {
        let vault = Address::new([0x0f; 20]);
        let payload = calls::sweep_funds(Address::new([0x22; 20]), Address::new([0x70; 20]));
        let envelope = smuggle(vault, 0x80, selectors::withdraw(), &payload);

        // What a naive gateway would authorize.
        assert_eq!(naive_opcode(&envelope), selectors::withdraw());

        // What the single decoder yields, and what would be executed.
        let decoded = decode(&envelope).expect("well-formed");
        assert_eq!(decoded.target, vault);
        assert_eq!(decoded.opcode(), selectors::sweep_funds());
        assert_eq!(decoded.payload, payload);
    }

    #[tokio::test]
    async fn test_smuggled_sweep_rejected() {
        let s = setup().await;
        let vault = s.vault();
        let last = s.d.vault.last_invocation().await;
        let envelope = smuggle(
            vault,
            0x80,
            selectors::withdraw(),
            &calls::sweep_funds(s.recovery, s.token),
        );

        let err = s.d.vault.submit(s.player, &envelope).await.unwrap_err();

        assert_eq!(
            err,
            VaultError::from(AuthorizationError::CallerNotAllowed {
                caller: s.player,
                opcode: selectors::sweep_funds(),
                target: vault,
            })
        );
        assert_eq!(s.balance(vault), U256::exp10(24));
        assert_eq!(s.balance(s.recovery), U256::zero());
        assert_eq!(s.d.vault.last_invocation().await, last);
        assert_eq!(s.d.vault.stats().await.forwarded, 0);
    }

    #[tokio::test]
    async fn test_smuggled_sweep_rejected_after_waiting_period() {
        let s = setup().await;
        s.d.clock.advance(WAITING_PERIOD + 1);
        let envelope = smuggle(
            s.vault(),
            0x80,
            selectors::withdraw(),
            &calls::sweep_funds(s.recovery, s.token),
        );

        let err = s.d.vault.submit(s.player, &envelope).await.unwrap_err();

        assert!(matches!(
            err,
            VaultError::Authorization(AuthorizationError::CallerNotAllowed { .. })
        ));
        assert_eq!(s.balance(s.vault()), U256::exp10(24));
    }

    #[tokio::test]
    async fn test_offset_into_decoy_is_malformed() {
        let s = setup().await;
        // Offset 0x60 makes the decoy word the length word.
        let envelope = smuggle(
            s.vault(),
            0x60,
            selectors::withdraw(),
            &calls::sweep_funds(s.recovery, s.token),
        );

        let err = s.d.vault.submit(s.player, &envelope).await.unwrap_err();

        assert_eq!(
            err,
            VaultError::from(MalformedReason::PayloadOutOfBounds)
        );
        assert_eq!(s.balance(s.vault()), U256::exp10(24));
    }

    #[tokio::test]
    async fn test_player_cannot_sweep_directly() {
        let s = setup().await;
        let envelope = encode(s.vault(), &calls::sweep_funds(s.recovery, s.token));

        let err = s.d.vault.submit(s.player, envelope.as_slice()).await.unwrap_err();
        assert!(err.is_rejection());

        // Nor by calling the treasury without the vault in between.
        let err = s
            .d
            .host
            .call(s.player, s.vault(), calls::sweep_funds(s.recovery, s.token))
            .await
            .unwrap_err();
        assert_eq!(err, EndpointError::CallerNotAllowed(s.player));
        assert_eq!(s.balance(s.recovery), U256::zero());
    }

    #[tokio::test]
    async fn test_deployer_sweep_still_works() {
        let s = setup().await;
        let envelope = encode(s.vault(), &calls::sweep_funds(s.recovery, s.token));

        s.d.vault
            .submit(s.deployer, envelope.as_slice())
            .await
            .expect("authorized sweep");

        assert_eq!(s.balance(s.vault()), U256::zero());
        assert_eq!(s.balance(s.recovery), U256::exp10(24));
    }

    #[tokio::test]
    async fn test_smuggled_registry_call_forbidden() {
        let s = setup().await;
        let grant_payload = Payload::with_args(selectors::set_permissions(), &[0u8; 64]);
        let envelope = smuggle(s.vault(), 0x80, selectors::withdraw(), &grant_payload);

        let err = s.d.vault.submit(s.player, &envelope).await.unwrap_err();

        assert_eq!(
            err,
            VaultError::from(AuthorizationError::Forbidden {
                opcode: selectors::set_permissions()
            })
        );
        assert!(!s
            .d
            .vault
            .is_granted(selectors::sweep_funds(), s.player, s.vault())
            .await);
    }
}
