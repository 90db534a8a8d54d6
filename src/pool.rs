//! Mining pool profiles, roster validation, and the pool-to-node topology.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    chain::{ChainId, NodeHandle, PoolId},
    error::{ConfigurationError, MissingInfrastructureError},
};

/// A pool's ideological stance toward the competing chains.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Preference {
    /// Purely profit-driven.
    #[default]
    None,
    /// Willing to sacrifice profit to mine the named chain.
    Chain(ChainId),
}

impl Preference {
    /// Returns the preferred chain, if any.
    pub fn chain(&self) -> Option<&ChainId> {
        match self {
            Preference::None => None,
            Preference::Chain(chain) => Some(chain),
        }
    }
}

/// Static description of one mining pool. Immutable once the roster is
/// built; everything that changes during a run lives in the strategy state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolProfile {
    pub id: PoolId,
    /// Share of total network hashrate, in percent. Shares across the
    /// roster must sum to ~100.
    pub hashrate_share: f64,
    pub preference: Preference,
    /// Fraction of potential profit the pool will sacrifice for its
    /// preference, from 0.0 (none) to 1.0 (its full loss tolerance).
    pub ideology_strength: f64,
    /// Absolute cap on cumulative opportunity cost, in USD.
    pub max_loss_usd: f64,
    /// Cap on the per-decision loss as a fraction of rational profit.
    pub max_loss_pct: f64,
    /// Profit advantage, as a fraction of current-chain profit, that a pool
    /// with no preference demands before abandoning its current chain.
    pub switch_threshold: f64,
}

/// The validated set of pools taking part in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRoster {
    pools: Vec<PoolProfile>,
}

impl PoolRoster {
    /// Allowable distance between the hashrate share sum and 100 percent.
    pub const EPSILON_SHARE: f64 = 0.5;

    /// Validates and wraps a set of pool profiles.
    pub fn new(pools: Vec<PoolProfile>) -> Result<Self, ConfigurationError> {
        use ConfigurationError::*;

        if pools.is_empty() {
            return Err(EmptyRoster);
        }

        let mut seen = BTreeMap::new();
        for pool in &pools {
            if seen.insert(pool.id.clone(), ()).is_some() {
                return Err(DuplicatePool(pool.id.clone()));
            }

            let share = pool.hashrate_share;
            if share.is_nan() || !(0.0..=100.0).contains(&share) || share == 0.0
            {
                return Err(BadHashrateShare(pool.id.clone(), share));
            }

            let strength = pool.ideology_strength;
            if strength.is_nan() || !(0.0..=1.0).contains(&strength) {
                return Err(BadIdeologyStrength(pool.id.clone(), strength));
            }

            for fraction in [pool.max_loss_pct, pool.switch_threshold] {
                if fraction.is_nan() || !(0.0..=1.0).contains(&fraction) {
                    return Err(BadLossFraction(pool.id.clone(), fraction));
                }
            }

            if pool.max_loss_usd.is_nan() || pool.max_loss_usd < 0.0 {
                return Err(NegativeLossCap(
                    pool.id.clone(),
                    pool.max_loss_usd,
                ));
            }
        }

        let sum: f64 = pools.iter().map(|p| p.hashrate_share).sum();
        if f64::abs(sum - 100.0) > Self::EPSILON_SHARE {
            return Err(BadHashrateSum(sum));
        }

        Ok(PoolRoster { pools })
    }

    #[inline]
    pub fn pools(&self) -> &[PoolProfile] {
        &self.pools
    }

    /// Returns the profile of `id`, if the pool is part of this roster.
    pub fn get(&self, id: &PoolId) -> Option<&PoolProfile> {
        self.pools.iter().find(|p| &p.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Sum of all hashrate shares in the roster.
    pub fn total_share(&self) -> f64 {
        self.pools.iter().map(|p| p.hashrate_share).sum()
    }
}

/// Which node serves each pool on each chain. Loaded once per run from the
/// declarative network description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    nodes: BTreeMap<PoolId, BTreeMap<ChainId, NodeHandle>>,
}

impl Topology {
    pub fn new(
        nodes: BTreeMap<PoolId, BTreeMap<ChainId, NodeHandle>>,
    ) -> Self {
        Topology { nodes }
    }

    /// Adds one pool-chain-node mapping.
    pub fn insert(
        &mut self,
        pool: PoolId,
        chain: ChainId,
        node: NodeHandle,
    ) {
        self.nodes.entry(pool).or_default().insert(chain, node);
    }

    /// Requires every roster pool to have a node on each of the given
    /// chains. Any pool can end up reallocated to either chain mid-run, so
    /// a run that could strand a pool on a chain without a node must not
    /// start.
    pub fn validate(
        &self,
        roster: &PoolRoster,
        chains: &[ChainId],
    ) -> Result<(), ConfigurationError> {
        for pool in roster.pools() {
            let nodes = self.nodes.get(&pool.id).ok_or_else(|| {
                ConfigurationError::MissingPoolMapping(pool.id.clone())
            })?;

            for chain in chains {
                if !nodes.contains_key(chain) {
                    return Err(ConfigurationError::MissingNodeMapping(
                        pool.id.clone(),
                        chain.clone(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Resolves the node `pool` mines through on `chain`.
    pub fn node_for(
        &self,
        pool: &PoolId,
        chain: &ChainId,
    ) -> Result<&NodeHandle, MissingInfrastructureError> {
        self.nodes
            .get(pool)
            .and_then(|chains| chains.get(chain))
            .ok_or_else(|| MissingInfrastructureError {
                pool: pool.clone(),
                chain: chain.clone(),
            })
    }
}
