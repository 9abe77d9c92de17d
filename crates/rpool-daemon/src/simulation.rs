//! Block-by-block simulation of node activity.
//!
//! Each block, every node may try to claim its rewards, trusted members may
//! claim theirs, the DAO share is collected as soon as there is one, and
//! nodes occasionally top up or withdraw stake. Claims are only attempted
//! when the forecast says they will pay out; any call that still fails is
//! logged and the block carries on.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use tracing::{debug, info};

use rpool_engine::{EngineError, LocalDeployment};
use rpool_ledger::TokenLedger;
use rpool_types::{derive_address, Address, BlockNumber, CallContext, U256};

use crate::config::{tokens, SimulationConfig};
use crate::events::EventBus;

/// Unix time of block zero.
const GENESIS_TIME: u64 = 1_700_000_000;

/// What happened in one block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Successful claims.
    pub claims: usize,
    /// Tokens paid out.
    pub claimed: U256,
    /// Stake top-ups and withdrawals.
    pub restakes: usize,
    /// Calls that were rolled back.
    pub failures: usize,
}

/// Simulated node operators.
pub struct Simulation {
    config: SimulationConfig,
    rng: StdRng,
    nodes: Vec<Address>,
    treasury: Address,
}

impl Simulation {
    /// Create a simulation with `config.nodes` deterministic node addresses.
    pub fn new(config: SimulationConfig, treasury: Address) -> anyhow::Result<Self> {
        for (name, p) in [
            ("claim_probability", config.claim_probability),
            ("restake_probability", config.restake_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("simulation.{name} must be within [0, 1], got {p}");
            }
        }
        if config.min_stake == 0 || config.min_stake > config.max_stake {
            anyhow::bail!(
                "simulation stake range {}..={} is empty",
                config.min_stake,
                config.max_stake
            );
        }
        if config.trusted_nodes > config.nodes {
            anyhow::bail!(
                "simulation.trusted_nodes ({}) exceeds nodes ({})",
                config.trusted_nodes,
                config.nodes
            );
        }

        let nodes = (0..config.nodes)
            .map(|i| derive_address(&format!("node-{i}")))
            .collect();
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            nodes,
            treasury,
        })
    }

    /// Simulated node addresses.
    pub fn nodes(&self) -> &[Address] {
        &self.nodes
    }

    fn ctx(&self, sender: Address, block: BlockNumber) -> CallContext {
        CallContext::new(
            sender,
            block,
            GENESIS_TIME + block * self.config.block_time_secs,
        )
    }

    /// Register and fund any node the deployment does not know yet, stake a
    /// random amount for it, and mark the first `trusted_nodes` as trusted.
    pub fn bootstrap(&mut self, d: &mut LocalDeployment, block: BlockNumber) -> anyhow::Result<()> {
        let stake_ledger = d.stake_ledger().address();
        for (i, node) in self.nodes.clone().into_iter().enumerate() {
            if d.registry().is_node(&node) {
                continue;
            }
            let amount = tokens(
                self.rng
                    .gen_range(self.config.min_stake..=self.config.max_stake),
            );
            d.register_node(node)?;
            d.transfer(self.treasury, node, amount)?;
            d.approve(node, stake_ledger, amount)?;
            d.stake(&self.ctx(node, block), amount)?;
            if (i as u32) < self.config.trusted_nodes {
                d.set_trusted(node, true)?;
            }
        }
        info!(
            nodes = d.registry().node_count(),
            trusted = d.registry().trusted_count(),
            total_stake = %d.total_stake(),
            "simulation bootstrapped"
        );
        Ok(())
    }

    /// Run one block of activity.
    pub fn step(&mut self, d: &mut LocalDeployment, block: BlockNumber) -> StepReport {
        let mut report = StepReport::default();

        if d.dao_claim_amount(block).is_ok_and(|amount| !amount.is_zero()) {
            let ctx = self.ctx(self.treasury, block);
            record(&mut report, d.claim_dao(&ctx).map(|r| r.amount));
        }

        for node in self.nodes.clone() {
            if d.registry().is_trusted(&node)
                && self.rng.gen_bool(self.config.claim_probability)
                && d.trusted_node_claim_possible(&node, block)
            {
                let ctx = self.ctx(node, block);
                record(&mut report, d.claim_trusted_node(&ctx).map(|r| r.amount));
            }

            if self.rng.gen_bool(self.config.claim_probability)
                && d.node_claim_possible(&node, block)
            {
                let ctx = self.ctx(node, block);
                record(&mut report, d.claim_node(&ctx).map(|r| r.amount));
            }

            if self.rng.gen_bool(self.config.restake_probability) {
                match self.restake(d, node, block) {
                    Ok(true) => report.restakes += 1,
                    Ok(false) => {}
                    Err(e) => {
                        debug!(%node, block, error = %e, "restake rolled back");
                        report.failures += 1;
                    }
                }
            }
        }

        report
    }

    /// Top up from the node's wallet or withdraw part of its stake.
    fn restake(
        &mut self,
        d: &mut LocalDeployment,
        node: Address,
        block: BlockNumber,
    ) -> Result<bool, EngineError> {
        let divisor = U256::from(self.rng.gen_range(2..=10u64));
        let ctx = self.ctx(node, block);
        if self.rng.gen_bool(0.5) {
            let amount = d.token().balance_of(&node) / divisor;
            if amount.is_zero() {
                return Ok(false);
            }
            d.approve(node, d.stake_ledger().address(), amount)?;
            d.stake(&ctx, amount)?;
        } else {
            let amount = d.node_stake(&node) / divisor;
            if amount.is_zero() {
                return Ok(false);
            }
            d.withdraw_stake(&ctx, amount)?;
        }
        Ok(true)
    }
}

fn record(report: &mut StepReport, result: Result<U256, EngineError>) {
    match result {
        Ok(amount) => {
            report.claims += 1;
            report.claimed = report.claimed.saturating_add(amount);
        }
        Err(e) => {
            debug!(error = %e, "claim rolled back");
            report.failures += 1;
        }
    }
}

/// Drive the simulation from `start_block`, publishing committed events and
/// persisting every `persist_every` blocks. Returns the last block run.
///
/// Runs `config.blocks` blocks, or forever when that is zero.
pub async fn run(
    sim: &mut Simulation,
    d: &mut LocalDeployment,
    conn: &mut Connection,
    bus: &EventBus,
    start_block: BlockNumber,
) -> anyhow::Result<BlockNumber> {
    let blocks = sim.config.blocks;
    let persist_every = sim.config.persist_every.max(1);
    let tick = std::time::Duration::from_millis(sim.config.tick_ms);

    let mut block = start_block;
    let mut total = StepReport::default();
    loop {
        let report = sim.step(d, block);
        bus.publish(block, d.take_events());

        total.claims += report.claims;
        total.claimed = total.claimed.saturating_add(report.claimed);
        total.restakes += report.restakes;
        total.failures += report.failures;

        let ran = block - start_block + 1;
        if ran % persist_every == 0 {
            rpool_db::save_deployment(conn, d)?;
            info!(
                block,
                claims = total.claims,
                claimed = %total.claimed,
                total_stake = %d.total_stake(),
                "checkpoint"
            );
        }
        if blocks != 0 && ran >= blocks {
            break;
        }
        block += 1;
        if !tick.is_zero() {
            tokio::time::sleep(tick).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    rpool_db::save_deployment(conn, d)?;
    info!(
        last_block = block,
        claims = total.claims,
        claimed = %total.claimed,
        restakes = total.restakes,
        failures = total.failures,
        "simulation finished"
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpool_ledger::{InflationToken, RewardsSettings, TokenVault, Vault};
    use rpool_types::names;

    use crate::config::DaemonConfig;

    fn deployment(config: &DaemonConfig) -> LocalDeployment {
        let treasury = config.rewards.treasury_address().expect("treasury");
        let token = InflationToken::new(
            derive_address("token"),
            treasury,
            tokens(config.token.genesis_supply),
            config.token.schedule(0).expect("schedule"),
        )
        .expect("token");
        LocalDeployment::genesis(
            config.rewards.dao_settings().expect("settings"),
            token,
            TokenVault::new(derive_address("vault")),
            treasury,
            0,
        )
        .expect("genesis")
    }

    fn simulation(config: &DaemonConfig) -> Simulation {
        Simulation::new(
            config.simulation.clone(),
            config.rewards.treasury_address().expect("treasury"),
        )
        .expect("simulation")
    }

    fn assert_stake_invariant(d: &LocalDeployment) {
        let sum = d
            .stake_ledger()
            .node_stakes()
            .fold(U256::ZERO, |acc, (_, s)| acc + *s);
        assert_eq!(d.total_stake(), sum);
        assert_eq!(
            d.vault()
                .balance_of(names::STAKE_LEDGER, &d.token().address()),
            sum
        );
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let mut config = DaemonConfig::default();
        config.simulation.claim_probability = 1.5;
        let result = Simulation::new(config.simulation, derive_address("treasury"));
        assert!(result.is_err());
    }

    #[test]
    fn test_bootstrap_registers_and_stakes() {
        let config = DaemonConfig::default();
        let mut d = deployment(&config);
        let mut sim = simulation(&config);
        sim.bootstrap(&mut d, 1).expect("bootstrap");

        assert_eq!(d.registry().node_count(), 8);
        assert_eq!(d.registry().trusted_count(), 3);
        for node in sim.nodes() {
            assert!(d.node_stake(node) >= tokens(config.simulation.min_stake));
        }
        assert_stake_invariant(&d);

        // A second bootstrap leaves known nodes alone.
        let total = d.total_stake();
        sim.bootstrap(&mut d, 2).expect("rerun");
        assert_eq!(d.total_stake(), total);
    }

    #[test]
    fn test_steps_claim_and_keep_invariant() {
        let mut config = DaemonConfig::default();
        config.simulation.claim_probability = 0.5;
        config.simulation.restake_probability = 0.2;
        let mut d = deployment(&config);
        let mut sim = simulation(&config);
        sim.bootstrap(&mut d, 1).expect("bootstrap");

        let interval = d.settings().claim_interval_blocks();
        let mut claims = 0;
        for block in 2..(interval * 3) {
            let report = sim.step(&mut d, block);
            claims += report.claims;
            assert_stake_invariant(&d);
        }
        assert!(claims > 0);
        assert!(d.token().balance_of(&derive_address("treasury")) > U256::ZERO);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let config = DaemonConfig::default();
        let outcome = || {
            let mut d = deployment(&config);
            let mut sim = simulation(&config);
            sim.bootstrap(&mut d, 1).expect("bootstrap");
            for block in 2..250 {
                sim.step(&mut d, block);
            }
            (d.total_stake(), d.pool().to_parts())
        };
        assert_eq!(outcome(), outcome());
    }

    #[tokio::test]
    async fn test_run_persists_state() {
        let mut config = DaemonConfig::default();
        config.simulation.blocks = 250;
        config.simulation.claim_probability = 0.3;
        let mut d = deployment(&config);
        let mut sim = simulation(&config);
        sim.bootstrap(&mut d, 1).expect("bootstrap");

        let mut conn = rpool_db::open_memory().expect("db");
        let bus = EventBus::new(10_000);
        let mut rx = bus.subscribe();
        let subscriber = tokio::spawn(async move {
            let mut last_sequence = 0;
            while let Ok(event) = rx.recv().await {
                assert_eq!(event.sequence, last_sequence + 1);
                last_sequence = event.sequence;
            }
            last_sequence
        });

        let last = run(&mut sim, &mut d, &mut conn, &bus, 2)
            .await
            .expect("run");
        assert_eq!(last, 251);
        let published = bus.published();
        assert!(published > 0);
        drop(bus);
        assert_eq!(subscriber.await.expect("subscriber"), published);

        let loaded = rpool_db::load_deployment(
            &conn,
            config.rewards.dao_settings().expect("settings"),
            config.rewards.treasury_address().expect("treasury"),
        )
        .expect("load")
        .expect("saved");
        assert_eq!(loaded.total_stake(), d.total_stake());
        assert_eq!(loaded.pool().to_parts(), d.pool().to_parts());
    }
}
