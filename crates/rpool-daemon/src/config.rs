//! Configuration file management.

use std::path::PathBuf;

use anyhow::Context;

use serde::{Deserialize, Serialize};

use rpool_ledger::{DaoSettings, InflationSchedule};
use rpool_types::{derive_address, names, Address, BASE, U256};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Rewards pool settings.
    #[serde(default)]
    pub rewards: RewardsConfig,
    /// Token supply and inflation.
    #[serde(default)]
    pub token: TokenConfig,
    /// Simulated node activity.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Where state is kept.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rewards pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Claim interval length in blocks.
    #[serde(default = "default_claim_interval_blocks")]
    pub claim_interval_blocks: u64,
    /// Node operators' share, as a fraction of 1.
    #[serde(default = "default_node_percentage")]
    pub node_percentage: f64,
    /// Trusted members' share, as a fraction of 1.
    #[serde(default = "default_trusted_node_percentage")]
    pub trusted_node_percentage: f64,
    /// DAO treasury share, as a fraction of 1.
    #[serde(default = "default_dao_percentage")]
    pub dao_percentage: f64,
    /// Treasury address as `0x` hex. Empty = derived from "treasury".
    #[serde(default)]
    pub treasury: String,
}

/// Token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Genesis supply in whole tokens, held by the treasury.
    #[serde(default = "default_genesis_supply")]
    pub genesis_supply: u64,
    /// Supply multiplier per inflation interval. 1.0 disables inflation.
    #[serde(default = "default_inflation_rate")]
    pub inflation_rate_per_interval: f64,
    /// Inflation interval length in blocks.
    #[serde(default = "default_inflation_interval_blocks")]
    pub inflation_interval_blocks: u64,
}

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of node operators.
    #[serde(default = "default_nodes")]
    pub nodes: u32,
    /// How many of them are trusted members.
    #[serde(default = "default_trusted_nodes")]
    pub trusted_nodes: u32,
    /// Blocks to run before exiting. 0 = until Ctrl-C.
    #[serde(default = "default_blocks")]
    pub blocks: u64,
    /// RNG seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Smallest initial stake in whole tokens.
    #[serde(default = "default_min_stake")]
    pub min_stake: u64,
    /// Largest initial stake in whole tokens.
    #[serde(default = "default_max_stake")]
    pub max_stake: u64,
    /// Chance per block that a given node tries to claim.
    #[serde(default = "default_claim_probability")]
    pub claim_probability: f64,
    /// Chance per block that a given node changes its stake.
    #[serde(default = "default_restake_probability")]
    pub restake_probability: f64,
    /// Simulated seconds per block, used for event timestamps.
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,
    /// Real milliseconds to wait between blocks.
    #[serde(default)]
    pub tick_ms: u64,
    /// Persist state every this many blocks.
    #[serde(default = "default_persist_every")]
    pub persist_every: u64,
}

/// Storage location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `rpool.db`. Empty means the default data directory.
    #[serde(default)]
    pub data_dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the `rpool` crates; `RUST_LOG` directives still apply.
    #[serde(default = "default_log_level")]
    pub level: String,
}


fn default_claim_interval_blocks() -> u64 {
    100
}

fn default_node_percentage() -> f64 {
    0.7
}

fn default_trusted_node_percentage() -> f64 {
    0.1
}

fn default_dao_percentage() -> f64 {
    0.2
}

fn default_genesis_supply() -> u64 {
    18_000_000
}

fn default_inflation_rate() -> f64 {
    1.000_05
}

fn default_inflation_interval_blocks() -> u64 {
    50
}

fn default_nodes() -> u32 {
    8
}

fn default_trusted_nodes() -> u32 {
    3
}

fn default_blocks() -> u64 {
    1_000
}

fn default_seed() -> u64 {
    42
}

fn default_min_stake() -> u64 {
    1_000
}

fn default_max_stake() -> u64 {
    50_000
}

fn default_claim_probability() -> f64 {
    0.05
}

fn default_restake_probability() -> f64 {
    0.01
}

fn default_block_time_secs() -> u64 {
    12
}

fn default_persist_every() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            claim_interval_blocks: default_claim_interval_blocks(),
            node_percentage: default_node_percentage(),
            trusted_node_percentage: default_trusted_node_percentage(),
            dao_percentage: default_dao_percentage(),
            treasury: String::new(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            genesis_supply: default_genesis_supply(),
            inflation_rate_per_interval: default_inflation_rate(),
            inflation_interval_blocks: default_inflation_interval_blocks(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            trusted_nodes: default_trusted_nodes(),
            blocks: default_blocks(),
            seed: default_seed(),
            min_stake: default_min_stake(),
            max_stake: default_max_stake(),
            claim_probability: default_claim_probability(),
            restake_probability: default_restake_probability(),
            block_time_secs: default_block_time_secs(),
            tick_ms: 0,
            persist_every: default_persist_every(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Convert a fraction of 1 into a BASE-scaled fixed-point value, to six
/// decimal places.
pub fn fixed_point(fraction: f64) -> anyhow::Result<U256> {
    if !fraction.is_finite() || fraction < 0.0 {
        anyhow::bail!("{fraction} is not a non-negative fraction");
    }
    let micros = (fraction * 1_000_000.0).round() as u64;
    Ok(U256::from(micros) * BASE / U256::from(1_000_000u64))
}

/// Whole tokens to base units.
pub fn tokens(whole: u64) -> U256 {
    U256::from(whole) * BASE
}

impl RewardsConfig {
    /// Build DAO settings from the configured interval and shares.
    pub fn dao_settings(&self) -> anyhow::Result<DaoSettings> {
        let mut settings = DaoSettings::new(self.claim_interval_blocks)?;
        for (name, fraction) in [
            (names::CLAIM_NODE, self.node_percentage),
            (names::CLAIM_TRUSTED_NODE, self.trusted_node_percentage),
            (names::CLAIM_DAO, self.dao_percentage),
        ] {
            settings.set_claim_percentage(name, fixed_point(fraction)?)?;
        }
        Ok(settings)
    }

    /// The configured treasury address.
    pub fn treasury_address(&self) -> anyhow::Result<Address> {
        if self.treasury.is_empty() {
            return Ok(derive_address("treasury"));
        }
        Ok(rpool_db::keys::decode_address(&self.treasury)?)
    }
}

impl TokenConfig {
    /// Inflation schedule starting at `start_block`.
    pub fn schedule(&self, start_block: u64) -> anyhow::Result<InflationSchedule> {
        Ok(InflationSchedule {
            rate_per_interval: fixed_point(self.inflation_rate_per_interval)?,
            interval_blocks: self.inflation_interval_blocks,
            start_block,
        })
    }
}

/// Config file name inside the default data directory.
const CONFIG_FILE: &str = "config.toml";

impl DaemonConfig {
    /// Read `config.toml` from the default data directory. A missing file
    /// yields the defaults; an unreadable or malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = default_data_dir().join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("reading {}", path.display()))),
        }
    }

    /// Directory holding the database.
    pub fn data_dir(&self) -> PathBuf {
        match self.storage.data_dir.as_str() {
            "" => default_data_dir(),
            dir => PathBuf::from(dir),
        }
    }
}

/// `$RPOOL_DATA_DIR`, else `~/.rpool`.
fn default_data_dir() -> PathBuf {
    std::env::var_os("RPOOL_DATA_DIR")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".rpool")))
        .unwrap_or_else(|| std::env::temp_dir().join("rpool"))
}
