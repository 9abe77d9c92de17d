//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use rpool_engine::{Deployment, LocalDeployment};
use rpool_ledger::{
    DaoSettings, InflationSchedule, InflationToken, TokenLedger, TokenVault, Vault,
};
use rpool_types::{derive_address, names, Address, BlockNumber, CallContext, BASE, U256};

/// Block the test deployments are created at.
pub const DEPLOY_BLOCK: BlockNumber = 1000;

/// Claim interval length used by the test deployments.
pub const INTERVAL: u64 = 100;

/// Genesis supply held by the treasury.
pub const GENESIS_SUPPLY: u64 = 1_000_000_000;

/// A fraction in tenths, scaled by BASE.
pub fn tenths(n: u64) -> U256 {
    BASE * U256::from(n) / U256::from(10u64)
}

pub fn treasury() -> Address {
    derive_address("treasury")
}

pub fn ctx(sender: Address, block: BlockNumber) -> CallContext {
    CallContext::new(sender, block, 1_700_000_000 + block * 12)
}

/// Settings giving nodes 50%, trusted members 20% and the DAO 30%.
pub fn settings() -> DaoSettings {
    let mut settings = DaoSettings::new(INTERVAL).expect("settings");
    settings
        .set_claim_percentage(names::CLAIM_NODE, tenths(5))
        .expect("node share");
    settings
        .set_claim_percentage(names::CLAIM_TRUSTED_NODE, tenths(2))
        .expect("trusted share");
    settings
        .set_claim_percentage(names::CLAIM_DAO, tenths(3))
        .expect("dao share");
    settings
}

pub fn token(schedule: InflationSchedule) -> InflationToken {
    InflationToken::new(
        derive_address("token"),
        treasury(),
        U256::from(GENESIS_SUPPLY),
        schedule,
    )
    .expect("token")
}

pub fn vault() -> TokenVault {
    TokenVault::new(derive_address("vault"))
}

/// A deployment with inflation disabled.
pub fn deploy() -> LocalDeployment {
    LocalDeployment::genesis(
        settings(),
        token(InflationSchedule::disabled()),
        vault(),
        treasury(),
        DEPLOY_BLOCK,
    )
    .expect("genesis")
}

/// Register `label` as a node and stake `amount` for it at `block`.
pub fn add_node<V: Vault + Clone>(
    d: &mut Deployment<DaoSettings, InflationToken, V>,
    label: &str,
    amount: u64,
    block: BlockNumber,
) -> Address {
    let node = derive_address(label);
    let amount = U256::from(amount);
    d.register_node(node).expect("register node");
    d.transfer(treasury(), node, amount).expect("fund node");
    d.approve(node, d.stake_ledger().address(), amount)
        .expect("approve");
    d.stake(&ctx(node, block), amount).expect("stake");
    node
}

/// Deposit `amount` into the rewards pool from the treasury.
pub fn fund_pool<V: Vault + Clone>(
    d: &mut Deployment<DaoSettings, InflationToken, V>,
    amount: u64,
    block: BlockNumber,
) {
    d.fund_rewards(&ctx(treasury(), block), U256::from(amount))
        .expect("fund rewards");
}

/// Pool balance held in the vault.
pub fn pool_balance<V: Vault + Clone>(d: &Deployment<DaoSettings, InflationToken, V>) -> U256 {
    d.vault()
        .balance_of(names::REWARDS_POOL, &d.token().address())
}

/// Total stake equals the sum of node stakes and the stake held in the vault.
pub fn assert_stake_invariant<V: Vault + Clone>(d: &Deployment<DaoSettings, InflationToken, V>) {
    let sum = d
        .stake_ledger()
        .node_stakes()
        .fold(U256::ZERO, |acc, (_, s)| acc + *s);
    assert_eq!(d.total_stake(), sum, "total stake must equal the node sum");
    assert_eq!(
        d.vault()
            .balance_of(names::STAKE_LEDGER, &d.token().address()),
        sum,
        "vault must hold exactly the staked amount"
    );
}
