//! Error taxonomy shared across the engine.
//!
//! Every error propagates synchronously to the caller. The engine never
//! retries or silently recovers: a silently corrected run would no longer
//! describe the economics it claims to.

use thiserror::Error;

use crate::chain::{ChainId, PoolId};

/// Invalid experimental setup. A driver receiving this should abort the run
/// rather than start it with parameters that cannot mean what was intended.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("base price {0} must be positive")]
    NonPositiveBasePrice(f64),
    #[error("base fee {0} must be positive")]
    NonPositiveBaseFee(f64),
    #[error("congestion multiplier {0} must be non-negative")]
    NegativeCongestionMultiplier(f64),
    #[error("price blend weights sum to {0}, not 1.0")]
    BadBlendWeights(f64),
    #[error("max price change {0} per update is not in the range 0.0..=1.0")]
    BadMaxPriceChange(f64),
    #[error("no pools were given")]
    EmptyRoster,
    #[error("duplicate pool id {0}")]
    DuplicatePool(PoolId),
    #[error("hashrate share {1} of pool {0} is not in the range 0.0..=100.0")]
    BadHashrateShare(PoolId, f64),
    #[error("hashrate shares sum to {0}, not 100.0")]
    BadHashrateSum(f64),
    #[error("ideology strength {1} of pool {0} is not in the range 0.0..=1.0")]
    BadIdeologyStrength(PoolId, f64),
    #[error("loss fraction {1} of pool {0} is not in the range 0.0..=1.0")]
    BadLossFraction(PoolId, f64),
    #[error("loss cap {1} of pool {0} must be non-negative")]
    NegativeLossCap(PoolId, f64),
    #[error("pool {0} has no entry in the node topology")]
    MissingPoolMapping(PoolId),
    #[error("pool {0} has no node on chain {1}")]
    MissingNodeMapping(PoolId, ChainId),
    #[error("pool {0} prefers chain {1}, which is not part of the run")]
    UnknownPreferenceChain(PoolId, ChainId),
    #[error("blocks per interval {0} must be positive")]
    BadBlocksPerInterval(f64),
    #[error("block capacity {0} must be positive")]
    BadBlockCapacity(f64),
    #[error("manipulation spend {0} must be positive")]
    NonPositiveManipulationSpend(f64),
    #[error("manipulation duration must be at least one block")]
    ZeroManipulationDuration,
    #[error("decision interval must be at least one tick")]
    ZeroDecisionInterval,
    #[error("exactly two distinct chains are required")]
    BadChainPair,
    #[error("no fundamentals were given for chain {0}")]
    MissingFundamentals(ChainId),
}

/// Observed chain heights that contradict the recorded fork point. Usually
/// an RPC race in the orchestration layer rather than a bad setup; drivers
/// may log and skip the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidStateError {
    #[error("negative chain height {0}")]
    NegativeHeight(i64),
    #[error("negative common-ancestor height {0}")]
    NegativeAncestorHeight(i64),
}

/// Lookup of a chain or pool the engine was never configured with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("unknown chain {0}")]
    Chain(ChainId),
    #[error("unknown pool {0}")]
    Pool(PoolId),
}

/// A pool allocated to a chain it has no node on. Selection must fail loudly
/// here: skipping the pool would bias every result derived from the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pool {pool} is allocated to chain {chain} but has no node there")]
pub struct MissingInfrastructureError {
    pub pool: PoolId,
    pub chain: ChainId,
}

/// Any failure the engine can surface.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    MissingInfrastructure(#[from] MissingInfrastructureError),
    #[error("could not create hashrate-weighted index")]
    WeightedIndex(#[from] rand::distributions::WeightedError),
}

/// Engine component a tick failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    ForkTracker,
    PriceOracle,
    FeeOracle,
    Strategy,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::ForkTracker => "fork tracker",
            Component::PriceOracle => "price oracle",
            Component::FeeOracle => "fee oracle",
            Component::Strategy => "mining pool strategy",
        };
        write!(f, "{name}")
    }
}

/// A failed tick, annotated with where in the run it happened so a halted
/// run can report the offending tick and component.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("tick {tick} ({component}): {source}")]
pub struct TickError {
    pub tick: u64,
    pub component: Component,
    #[source]
    pub source: EngineError,
}
