//! Integration test: stake accounting across the stake ledger, token and
//! vault.
//!
//! 1. The aggregate equals the sum of node stakes after every call
//! 2. Over-withdrawal fails and leaves every counter and balance unchanged
//! 3. Slashing moves stake into the auction client
//! 4. An upgraded stake ledger rejects calls

mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rpool_engine::EngineError;
use rpool_ledger::{TokenLedger, Vault};
use rpool_stake::StakeError;
use rpool_types::{derive_address, names, Address, U256};

use common::*;

#[test]
fn random_operations_keep_total_equal_to_node_sum() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut d = deploy();
    let nodes: Vec<Address> = (0..6)
        .map(|i| add_node(&mut d, &format!("node-{i}"), 10_000, DEPLOY_BLOCK))
        .collect();
    let auction = derive_address(names::AUCTION);

    for step in 0..500u64 {
        let block = DEPLOY_BLOCK + 1 + step;
        let node = nodes[rng.gen_range(0..nodes.len())];
        let amount = U256::from(rng.gen_range(1..5_000u64));
        let _ = match rng.gen_range(0..4) {
            0 => {
                let _ = d.transfer(treasury(), node, amount);
                d.approve(node, d.stake_ledger().address(), amount)
                    .and_then(|()| d.stake(&ctx(node, block), amount))
            }
            1 | 2 => d.withdraw_stake(&ctx(node, block), amount),
            _ => d.slash_stake(&ctx(auction, block), node, amount),
        };
        assert_stake_invariant(&d);
    }
}

#[test]
fn over_withdrawal_leaves_state_unchanged() {
    let mut d = deploy();
    let node = add_node(&mut d, "node-1", 1_000, DEPLOY_BLOCK);
    let other = add_node(&mut d, "node-2", 500, DEPLOY_BLOCK);
    let wallet = d.token().balance_of(&node);
    let events = d.events().len();

    let result = d.withdraw_stake(&ctx(node, DEPLOY_BLOCK + 1), U256::from(1_001u64));

    assert!(matches!(
        result,
        Err(EngineError::Stake(StakeError::InsufficientStake { .. }))
    ));
    assert_eq!(d.node_stake(&node), U256::from(1_000u64));
    assert_eq!(d.node_stake(&other), U256::from(500u64));
    assert_eq!(d.total_stake(), U256::from(1_500u64));
    assert_eq!(d.token().balance_of(&node), wallet);
    assert_eq!(d.events().len(), events);
    assert_stake_invariant(&d);
}

#[test]
fn unregistered_node_cannot_stake() {
    let mut d = deploy();
    let stranger = derive_address("stranger");
    d.transfer(treasury(), stranger, U256::from(100u64))
        .expect("fund");
    d.approve(stranger, d.stake_ledger().address(), U256::from(100u64))
        .expect("approve");

    let result = d.stake(&ctx(stranger, DEPLOY_BLOCK + 1), U256::from(100u64));
    assert!(matches!(
        result,
        Err(EngineError::Stake(StakeError::Unauthorized(_)))
    ));
    assert_eq!(d.total_stake(), U256::ZERO);
}

#[test]
fn slashing_moves_stake_to_auction() {
    let mut d = deploy();
    let node = add_node(&mut d, "node-1", 1_000, DEPLOY_BLOCK);
    let auction = derive_address(names::AUCTION);

    d.slash_stake(&ctx(auction, DEPLOY_BLOCK + 1), node, U256::from(400u64))
        .expect("slash");

    assert_eq!(d.node_stake(&node), U256::from(600u64));
    assert_eq!(
        d.vault().balance_of(names::AUCTION, &d.token().address()),
        U256::from(400u64)
    );
    assert_stake_invariant(&d);
}

#[test]
fn upgraded_stake_ledger_rejects_calls() {
    let mut d = deploy();
    let node = add_node(&mut d, "node-1", 1_000, DEPLOY_BLOCK);
    d.register_contract(names::STAKE_LEDGER, derive_address("stake_ledger-v2"))
        .expect("upgrade");

    let result = d.withdraw_stake(&ctx(node, DEPLOY_BLOCK + 1), U256::from(1u64));
    assert!(matches!(
        result,
        Err(EngineError::Stake(StakeError::NotLatestContract { .. }))
    ));
    assert_eq!(d.node_stake(&node), U256::from(1_000u64));
}
