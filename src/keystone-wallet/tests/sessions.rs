mod common;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use common::*;
use eyre::{ensure, eyre, Result};
use keystone_wallet::interfaces::{ISessionKeyManager, ISessionKeyManagerHybrid, IERC20};
use keystone_wallet::session::validators::erc20::encode_config;
use keystone_wallet::{FailureKind, HybridSessionManager, OpOutcome};
use keystone_wallet_encoder::{
    encode_abi_permission, encode_batched_session_use, encode_enable_and_use, encode_envelope,
    encode_pre_enabled_use, encode_session_enable_data, encode_session_key_use, merkle_proof_bytes,
    BatchedSessionInput, LocalSigner, SessionTree,
};
use keystone_wallet_types::{
    AbiPermission, Condition, ParamRule, SessionApproval, SessionLeaf, UserOperation,
};

const MAX_PER_TRANSFER: u64 = 5_000_000;

fn recipient(i: usize) -> Address {
    let mut bytes = [0u8; 20];
    bytes[16..].copy_from_slice(&(i as u32 + 1).to_be_bytes());
    Address::from(bytes)
}

fn transfer_leaf(key: &LocalSigner, i: usize, valid_until: u64, valid_after: u64) -> SessionLeaf {
    SessionLeaf::new(
        valid_until,
        valid_after,
        ERC20_SV,
        encode_config(key.address(), TOKEN, recipient(i), U256::from(MAX_PER_TRANSFER)),
    )
    .unwrap()
}

fn rejected_kind(outcome: &OpOutcome) -> Option<FailureKind> {
    match outcome {
        OpOutcome::Rejected(failed) => Some(failed.kind),
        OpOutcome::Executed { .. } => None,
    }
}

fn set_merkle_root(h: &mut Harness, root: B256) -> Result<()> {
    let set = ISessionKeyManager::setMerkleRootCall { merkleRoot: root };
    h.run_as_owner(execute(MERKLE, U256::ZERO, set.abi_encode()))
}

fn router_op(
    h: &Harness,
    key: &LocalSigner,
    tree: &SessionTree,
    leaves: &[SessionLeaf],
    transfers: &[(usize, u64)],
) -> Result<UserOperation> {
    let calls = transfers
        .iter()
        .map(|&(i, amount)| (TOKEN, erc20_transfer(recipient(i), amount)))
        .collect();
    let mut op = h.op(execute_batch(calls));
    let sessions = transfers
        .iter()
        .map(|&(i, _)| {
            let proof = tree.proof(i).ok_or_else(|| eyre!("no proof for leaf {i}"))?;
            Ok(BatchedSessionInput {
                leaf: leaves[i].clone(),
                proof: merkle_proof_bytes(&proof),
                call_specific_data: Bytes::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let sig = key.sign_eth_message(h.hash(&op))?;
    op.signature = encode_envelope(encode_batched_session_use(MERKLE, &sessions, sig), ROUTER);
    Ok(op)
}

#[test]
fn router_batch_checks_positions_and_signer() -> Result<()> {
    let mut h = Harness::new()?;
    let key = LocalSigner::from_label("session-key");
    let leaves: Vec<SessionLeaf> = (0..64)
        .map(|i| transfer_leaf(&key, i, GENESIS + 3_600, 0))
        .collect();
    let tree = SessionTree::from_leaves(&leaves);
    h.enable_module(MERKLE)?;
    h.enable_module(ROUTER)?;
    set_merkle_root(&mut h, tree.root())?;

    let op = router_op(&h, &key, &tree, &leaves, &[(17, 10), (42, 20), (63, 30)])?;
    ensure!(h.handle(op).is_success(), "batch should execute");
    assert_eq!(h.token_balance(recipient(17)), U256::from(10));
    assert_eq!(h.token_balance(recipient(42)), U256::from(20));
    assert_eq!(h.token_balance(recipient(63)), U256::from(30));
    assert_eq!(h.token_balance(ACCOUNT), U256::from(INITIAL_TOKENS - 60));

    // Sessions out of position fail the scope check.
    let swapped = router_op(&h, &key, &tree, &leaves, &[(17, 1), (42, 1)])?;
    let mut swapped_calls = swapped.clone();
    swapped_calls.callData = execute_batch(vec![
        (TOKEN, erc20_transfer(recipient(42), 1)),
        (TOKEN, erc20_transfer(recipient(17), 1)),
    ]);
    assert_eq!(rejected_kind(&h.handle(swapped_calls)), Some(FailureKind::Denied));

    // Signed by someone else.
    let mut forged = router_op(&h, &key, &tree, &leaves, &[(1, 1)])?;
    let mallory = LocalSigner::from_label("mallory");
    let proof = tree.proof(1).ok_or_else(|| eyre!("no proof"))?;
    let sessions = [BatchedSessionInput {
        leaf: leaves[1].clone(),
        proof: merkle_proof_bytes(&proof),
        call_specific_data: Bytes::new(),
    }];
    let sig = mallory.sign_eth_message(h.hash(&forged))?;
    forged.signature = encode_envelope(encode_batched_session_use(MERKLE, &sessions, sig), ROUTER);
    assert_eq!(rejected_kind(&h.handle(forged)), Some(FailureKind::SignatureFailed));
    Ok(())
}

#[test]
fn failing_call_reverts_the_whole_batch() -> Result<()> {
    let mut h = Harness::new()?;
    let key = LocalSigner::from_label("session-key");
    let leaves: Vec<SessionLeaf> = (0..3).map(|i| transfer_leaf(&key, i, 0, 0)).collect();
    let tree = SessionTree::from_leaves(&leaves);
    h.enable_module(MERKLE)?;
    h.enable_module(ROUTER)?;
    set_merkle_root(&mut h, tree.root())?;

    let nonce_before = h.entry_point.get_nonce(&h.ledger, ACCOUNT, U256::ZERO);
    let op = router_op(&h, &key, &tree, &leaves, &[(0, 10), (1, 10), (2, INITIAL_TOKENS)])?;
    match h.handle(op) {
        OpOutcome::Executed {
            success: false,
            revert_reason: Some(reason),
            ..
        } => assert!(reason.contains("exceeds balance"), "{reason}"),
        other => panic!("expected execution revert, got {other:?}"),
    }
    assert_eq!(h.token_balance(ACCOUNT), U256::from(INITIAL_TOKENS));
    assert_eq!(h.token_balance(recipient(0)), U256::ZERO);
    assert_eq!(h.token_balance(recipient(1)), U256::ZERO);
    assert_eq!(
        h.entry_point.get_nonce(&h.ledger, ACCOUNT, U256::ZERO),
        nonce_before + U256::from(1)
    );
    Ok(())
}

#[test]
fn session_window_is_half_open() -> Result<()> {
    let mut h = Harness::new()?;
    let key = LocalSigner::from_label("session-key");
    let leaves = vec![transfer_leaf(&key, 0, GENESIS + 100, GENESIS + 10)];
    let tree = SessionTree::from_leaves(&leaves);
    h.enable_module(MERKLE)?;
    set_merkle_root(&mut h, tree.root())?;
    let proof = tree.proof(0).ok_or_else(|| eyre!("no proof"))?;

    let attempt = |h: &mut Harness, at: u64| -> Result<OpOutcome> {
        h.ledger.set_timestamp(at);
        let mut op = h.op(execute(TOKEN, U256::ZERO, erc20_transfer(recipient(0), 1)));
        let sig = key.sign_eth_message(h.hash(&op))?;
        op.signature = encode_envelope(encode_session_key_use(&leaves[0], &proof, sig), MERKLE);
        Ok(h.handle(op))
    };

    assert_eq!(rejected_kind(&attempt(&mut h, GENESIS + 9)?), Some(FailureKind::OutOfTimeRange));
    ensure!(attempt(&mut h, GENESIS + 10)?.is_success(), "validAfter is inclusive");
    ensure!(attempt(&mut h, GENESIS + 99)?.is_success(), "last valid second");
    assert_eq!(rejected_kind(&attempt(&mut h, GENESIS + 100)?), Some(FailureKind::OutOfTimeRange));
    assert_eq!(h.token_balance(recipient(0)), U256::from(2));
    Ok(())
}

#[test]
fn approve_deposit_and_nft_approval_from_a_large_tree() -> Result<()> {
    let mut h = Harness::new()?;
    let key = LocalSigner::from_label("session-key");
    let operator = Address::repeat_byte(0x0b);
    let word = |value: u64| B256::from(U256::from(value).to_be_bytes::<32>());
    let rule = |offset: u16, condition: Condition, reference: B256| ParamRule {
        offset,
        condition,
        reference,
    };
    let permission = |destination: Address, selector: [u8; 4], rules: Vec<ParamRule>| AbiPermission {
        session_key: key.address(),
        destination,
        selector,
        value_limit: 0,
        rules,
    };

    let approve = permission(
        TOKEN,
        IERC20::approveCall::SELECTOR,
        vec![
            rule(0, Condition::Equal, VAULT.into_word()),
            rule(32, Condition::LessThanOrEqual, word(100)),
        ],
    );
    let deposit = permission(
        VAULT,
        IVault::depositCall::SELECTOR,
        vec![rule(0, Condition::LessThanOrEqual, word(100))],
    );
    let nft = permission(
        NFT,
        IERC721::setApprovalForAllCall::SELECTOR,
        vec![
            rule(0, Condition::Equal, operator.into_word()),
            rule(32, Condition::Equal, word(1)),
        ],
    );

    // Transfer sessions everywhere except three interior positions.
    let positions = [3_141usize, 3_142, 7_777];
    let mut leaves: Vec<SessionLeaf> = (0..10_000)
        .map(|i| transfer_leaf(&key, i, GENESIS + 3_600, 0))
        .collect();
    for (&position, scope) in positions.iter().zip([&approve, &deposit, &nft]) {
        leaves[position] = SessionLeaf::new(GENESIS + 3_600, 0, ABI_SV, encode_abi_permission(scope)?)?;
    }
    let tree = SessionTree::from_leaves(&leaves);
    h.enable_module(MERKLE)?;
    h.enable_module(ROUTER)?;
    set_merkle_root(&mut h, tree.root())?;

    let batch = |amount: u64| {
        execute_batch(vec![
            (
                TOKEN,
                IERC20::approveCall {
                    spender: VAULT,
                    amount: U256::from(amount),
                }
                .abi_encode()
                .into(),
            ),
            (
                VAULT,
                IVault::depositCall {
                    amount: U256::from(amount),
                }
                .abi_encode()
                .into(),
            ),
            (
                NFT,
                IERC721::setApprovalForAllCall {
                    operator,
                    approved: true,
                }
                .abi_encode()
                .into(),
            ),
        ])
    };
    let sign = |h: &Harness, call_data: Bytes| -> Result<UserOperation> {
        let mut op = h.op(call_data);
        let sessions = positions
            .iter()
            .map(|&i| {
                Ok(BatchedSessionInput {
                    leaf: leaves[i].clone(),
                    proof: merkle_proof_bytes(&tree.proof(i).ok_or_else(|| eyre!("no proof"))?),
                    call_specific_data: Bytes::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let sig = key.sign_eth_message(h.hash(&op))?;
        op.signature = encode_envelope(encode_batched_session_use(MERKLE, &sessions, sig), ROUTER);
        Ok(op)
    };

    let over = sign(&h, batch(101))?;
    assert_eq!(rejected_kind(&h.handle(over)), Some(FailureKind::Denied));
    assert!(!MockErc721::is_approved_for_all(&h.ledger, NFT, ACCOUNT, operator));

    let op = sign(&h, batch(100))?;
    ensure!(h.handle(op).is_success(), "approve, deposit and NFT approval within scope");
    assert_eq!(MockVault::deposits(&h.ledger, VAULT, ACCOUNT), U256::from(100));
    assert_eq!(h.token_balance(VAULT), U256::from(100));
    assert_eq!(h.token_balance(ACCOUNT), U256::from(INITIAL_TOKENS - 100));
    assert!(MockErc721::is_approved_for_all(&h.ledger, NFT, ACCOUNT, operator));
    Ok(())
}

struct HybridFixture {
    key: LocalSigner,
    leaf: SessionLeaf,
}

impl HybridFixture {
    fn new() -> Self {
        let key = LocalSigner::from_label("hybrid-key");
        let leaf = transfer_leaf(&key, 7, 0, 0);
        Self { key, leaf }
    }

    fn approvals(&self, chains: &[u64]) -> Vec<SessionApproval> {
        chains
            .iter()
            .map(|&chain_id| SessionApproval {
                chain_id,
                digest: self.leaf.digest(),
            })
            .collect()
    }

    fn enable_and_use(
        &self,
        h: &Harness,
        index: u8,
        enable_data: &Bytes,
        owner_signature: &Bytes,
    ) -> Result<UserOperation> {
        let mut op = h.op(execute(TOKEN, U256::ZERO, erc20_transfer(recipient(7), 1)));
        let sig = self.key.sign_eth_message(h.hash(&op))?;
        let payload = encode_enable_and_use(&self.leaf, index, enable_data.clone(), owner_signature.clone(), sig);
        op.signature = encode_envelope(payload, HYBRID);
        Ok(op)
    }

    fn pre_enabled(&self, h: &Harness) -> Result<UserOperation> {
        let mut op = h.op(execute(TOKEN, U256::ZERO, erc20_transfer(recipient(7), 1)));
        let sig = self.key.sign_eth_message(h.hash(&op))?;
        op.signature = encode_envelope(encode_pre_enabled_use(&self.leaf, sig), HYBRID);
        Ok(op)
    }
}

fn owner_signature(h: &Harness, data: &Bytes) -> Result<Bytes> {
    Ok(encode_envelope(h.owner.sign_eth_message(keccak256(data))?, OWNERSHIP))
}

#[test]
fn hybrid_multichain_batch_enables_only_on_its_own_chain() -> Result<()> {
    let fixture = HybridFixture::new();
    let mut devnet = Harness::on_chain(1337)?;
    let mut mainnet = Harness::on_chain(1)?;
    devnet.enable_module(HYBRID)?;
    mainnet.enable_module(HYBRID)?;

    let data = encode_session_enable_data(&fixture.approvals(&[1337, 1]))?;
    let signature = owner_signature(&devnet, &data)?;

    let op = fixture.enable_and_use(&devnet, 0, &data, &signature)?;
    ensure!(devnet.handle(op).is_success(), "devnet entry should enable");
    assert!(HybridSessionManager::is_session_enabled(
        &devnet.ledger,
        HYBRID,
        ACCOUNT,
        fixture.leaf.digest()
    ));

    // Replaying the devnet entry on chain 1 fails the chain check.
    let replay = fixture.enable_and_use(&mainnet, 0, &data, &signature)?;
    assert_eq!(rejected_kind(&mainnet.handle(replay)), Some(FailureKind::Denied));
    assert!(!HybridSessionManager::is_session_enabled(
        &mainnet.ledger,
        HYBRID,
        ACCOUNT,
        fixture.leaf.digest()
    ));

    // The same signed batch carries a chain 1 entry of its own.
    let own = fixture.enable_and_use(&mainnet, 1, &data, &signature)?;
    ensure!(mainnet.handle(own).is_success(), "chain 1 entry should enable");
    Ok(())
}

#[test]
fn tampered_chain_list_breaks_the_owner_signature() -> Result<()> {
    let fixture = HybridFixture::new();
    let mut h = Harness::on_chain(1)?;
    h.enable_module(HYBRID)?;

    // Signed for 1337, relabelled as chain 1.
    let signed = encode_session_enable_data(&fixture.approvals(&[1337]))?;
    let signature = owner_signature(&h, &signed)?;
    let tampered = encode_session_enable_data(&fixture.approvals(&[1]))?;
    let op = fixture.enable_and_use(&h, 0, &tampered, &signature)?;
    match h.handle(op) {
        OpOutcome::Rejected(failed) => {
            assert_eq!(failed.kind, FailureKind::Denied);
            assert!(failed.reason.contains("AA23"), "{}", failed.reason);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    Ok(())
}

#[test]
fn hybrid_enable_is_idempotent_and_disable_revokes() -> Result<()> {
    let fixture = HybridFixture::new();
    let mut h = Harness::new()?;
    h.enable_module(HYBRID)?;

    // Not enabled yet.
    let early = fixture.pre_enabled(&h)?;
    assert_eq!(rejected_kind(&h.handle(early)), Some(FailureKind::Denied));

    let data = encode_session_enable_data(&fixture.approvals(&[CHAIN_ID]))?;
    let signature = owner_signature(&h, &data)?;
    for _ in 0..2 {
        let op = fixture.enable_and_use(&h, 0, &data, &signature)?;
        ensure!(h.handle(op).is_success(), "enable-and-use should succeed repeatedly");
    }
    let pre = fixture.pre_enabled(&h)?;
    ensure!(h.handle(pre).is_success(), "pre-enabled use after enable");
    assert_eq!(h.token_balance(recipient(7)), U256::from(3));

    let disable = ISessionKeyManagerHybrid::disableSessionCall {
        sessionDataDigest: fixture.leaf.digest(),
    };
    h.run_as_owner(execute(HYBRID, U256::ZERO, disable.abi_encode()))?;
    let after = fixture.pre_enabled(&h)?;
    assert_eq!(rejected_kind(&h.handle(after)), Some(FailureKind::Denied));

    // A relayer holding the old approval cannot switch the session back on.
    let replay = fixture.enable_and_use(&h, 0, &data, &signature)?;
    assert_eq!(rejected_kind(&h.handle(replay)), Some(FailureKind::Denied));
    assert_eq!(h.token_balance(recipient(7)), U256::from(3));
    Ok(())
}

#[test]
fn owner_can_enable_hybrid_session_directly() -> Result<()> {
    let fixture = HybridFixture::new();
    let mut h = Harness::new()?;
    h.enable_module(HYBRID)?;
    let (valid_until, valid_after) = fixture.leaf.wire_bounds();
    let enable = ISessionKeyManagerHybrid::enableSessionCall {
        validUntil: valid_until,
        validAfter: valid_after,
        sessionValidationModule: fixture.leaf.validator,
        sessionKeyData: fixture.leaf.config.clone(),
    };
    h.run_as_owner(execute(HYBRID, U256::ZERO, enable.abi_encode()))?;
    let op = fixture.pre_enabled(&h)?;
    ensure!(h.handle(op).is_success(), "directly enabled session should work");
    Ok(())
}
