//! The decision core: which chain each pool mines, and what ideology costs.
//!
//! One function with explicit branches (rational, ideological override,
//! forced switch) rather than a strategy trait per pool type, so every
//! allocation a run produces is auditable as a pure data transform over the
//! decision log.

use std::collections::BTreeMap;

use rand::{
    distributions::{Distribution, WeightedIndex},
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    chain::{ChainId, NodeHandle, PoolId},
    error::{ConfigurationError, EngineError},
    fee::FeeOracle,
    pool::{PoolRoster, Topology},
    price::PriceOracle,
};

/// Default expected blocks mined per hour across the whole network.
pub const DEFAULT_BLOCKS_PER_HOUR: f64 = 6.0;
/// Default block subsidy in BTC.
pub const DEFAULT_BLOCK_SUBSIDY: f64 = 3.125;
/// Default hourly mining cost in USD per percentage point of hashrate.
pub const DEFAULT_COST_PER_SHARE_POINT: f64 = 2_000.0;

/// Economic constants of the profit computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitModel {
    pub blocks_per_hour: f64,
    pub block_subsidy: f64,
    /// Hourly mining cost in USD per percentage point of hashrate share.
    pub cost_per_share_point: f64,
}

impl Default for ProfitModel {
    fn default() -> Self {
        ProfitModel {
            blocks_per_hour: DEFAULT_BLOCKS_PER_HOUR,
            block_subsidy: DEFAULT_BLOCK_SUBSIDY,
            cost_per_share_point: DEFAULT_COST_PER_SHARE_POINT,
        }
    }
}

impl ProfitModel {
    /// Expected hourly USD profit of a pool with `share` percent of the
    /// hashrate, if it mines a chain with the given price and fee revenue.
    pub fn hourly_profit(&self, share: f64, price: f64, fee: f64) -> f64 {
        let share_fraction = share / 100.0;

        share_fraction
            * self.blocks_per_hour
            * (self.block_subsidy + fee)
            * price
            - share * self.cost_per_share_point
    }
}

/// Which branch of the decision produced an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    /// The profit-maximizing chain, with no conflict to resolve.
    Rational,
    /// A preference-free pool kept its chain because the rival's profit
    /// advantage stayed under its switch threshold.
    HeldPosition,
    /// Ideology beat profit within the pool's loss tolerance.
    IdeologyOverride,
    /// Ideology lost: the loss exceeded what the pool tolerates.
    ForcedSwitch,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DecisionReason::Rational => "rational choice",
            DecisionReason::HeldPosition => "held position under switch threshold",
            DecisionReason::IdeologyOverride => "ideology override within loss tolerance",
            DecisionReason::ForcedSwitch => "forced switch, loss tolerance exceeded",
        };
        write!(f, "{text}")
    }
}

/// One pool's allocation decision at one recompute, as appended to the
/// decision log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub timestamp: u64,
    pub pool: PoolId,
    pub chosen: ChainId,
    pub rational: ChainId,
    /// Hourly profit the pool would make on each chain.
    pub profits: BTreeMap<ChainId, f64>,
    pub overridden: bool,
    /// Opportunity cost of this decision alone, in USD.
    pub incremental_cost: f64,
    /// The pool's total opportunity cost after this decision, in USD.
    pub cumulative_cost: f64,
    pub reason: DecisionReason,
}

/// Per-pool cost bookkeeping. Every field is monotonically non-decreasing
/// over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoolCosts {
    pub cumulative_cost_usd: f64,
    pub forced_switches: u64,
    pub ideology_overrides: u64,
}

/// Mining pool strategy state for one run: the roster, where each pool
/// currently mines, what its choices have cost it so far, and the seeded
/// generator behind the block-proposer draw.
#[derive(Debug, Clone)]
pub struct PoolStrategy {
    chain_a: ChainId,
    chain_b: ChainId,
    roster: PoolRoster,
    topology: Topology,
    model: ProfitModel,
    allocations: BTreeMap<PoolId, ChainId>,
    ledger: BTreeMap<PoolId, PoolCosts>,
    decisions: Vec<Decision>,
    weights: WeightedIndex<f64>,
    rng: ChaCha8Rng,
}

impl PoolStrategy {
    /// Creates the strategy state over a validated roster and topology.
    /// Pools start on their preferred chain, or the first chain when they
    /// hold no preference. A preference for a chain outside the run's pair,
    /// or a pool without a node on both chains, is a configuration error.
    pub fn new(
        roster: PoolRoster,
        topology: Topology,
        chain_a: ChainId,
        chain_b: ChainId,
        model: ProfitModel,
        seed: u64,
    ) -> Result<Self, EngineError> {
        topology.validate(&roster, &[chain_a.clone(), chain_b.clone()])?;

        let weights = WeightedIndex::new(
            roster.pools().iter().map(|p| p.hashrate_share),
        )?;

        let mut allocations = BTreeMap::new();
        let mut ledger = BTreeMap::new();
        for pool in roster.pools() {
            if let Some(pref) = pool.preference.chain() {
                if *pref != chain_a && *pref != chain_b {
                    return Err(ConfigurationError::UnknownPreferenceChain(
                        pool.id.clone(),
                        pref.clone(),
                    )
                    .into());
                }
            }

            let start = pool
                .preference
                .chain()
                .cloned()
                .unwrap_or_else(|| chain_a.clone());
            allocations.insert(pool.id.clone(), start);
            ledger.insert(pool.id.clone(), PoolCosts::default());
        }

        Ok(PoolStrategy {
            chain_a,
            chain_b,
            roster,
            topology,
            model,
            allocations,
            ledger,
            decisions: Vec::new(),
            weights,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    #[inline]
    pub fn roster(&self) -> &PoolRoster {
        &self.roster
    }

    #[inline]
    pub fn allocations(&self) -> &BTreeMap<PoolId, ChainId> {
        &self.allocations
    }

    #[inline]
    pub fn ledger(&self) -> &BTreeMap<PoolId, PoolCosts> {
        &self.ledger
    }

    /// Full decision log of the run so far, in decision order.
    #[inline]
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Total hashrate share currently allocated to `chain`, in percent.
    pub fn allocated_share(&self, chain: &ChainId) -> f64 {
        self.roster
            .pools()
            .iter()
            .filter(|pool| self.allocations[&pool.id] == *chain)
            .map(|pool| pool.hashrate_share)
            .sum()
    }

    /// Recomputes every pool's allocation against the current tick's prices
    /// and fees, returning the batch of decisions made.
    ///
    /// Decisions are staged and committed wholesale: a failed oracle lookup
    /// leaves allocations, ledger and log untouched.
    pub fn recompute_allocations(
        &mut self,
        now: u64,
        price: &PriceOracle,
        fee: &FeeOracle,
    ) -> Result<Vec<Decision>, EngineError> {
        let price_a = price.price(&self.chain_a)?;
        let price_b = price.price(&self.chain_b)?;
        let fee_a = fee.fee(&self.chain_a)?;
        let fee_b = fee.fee(&self.chain_b)?;

        let mut staged_allocations = BTreeMap::new();
        let mut staged_ledger = BTreeMap::new();
        let mut batch = Vec::with_capacity(self.roster.len());

        for pool in self.roster.pools() {
            let profit_a =
                self.model.hourly_profit(pool.hashrate_share, price_a, fee_a);
            let profit_b =
                self.model.hourly_profit(pool.hashrate_share, price_b, fee_b);
            let current = self.allocations[&pool.id].clone();

            // Ties resolve to the current chain so an unchanged market
            // never moves a pool.
            let (rational, rational_profit) = if profit_a > profit_b {
                (self.chain_a.clone(), profit_a)
            } else if profit_b > profit_a {
                (self.chain_b.clone(), profit_b)
            } else {
                let profit = profit_a;
                (current.clone(), profit)
            };

            let profit_on = |chain: &ChainId| {
                if *chain == self.chain_a {
                    profit_a
                } else {
                    profit_b
                }
            };

            let mut costs = self.ledger[&pool.id];
            let preferred = pool.preference.chain().cloned();

            let (chosen, incremental, overridden, reason) = match preferred {
                Some(pref) if pref != rational => {
                    let loss = rational_profit - profit_on(&pref);
                    // Tolerance is undefined when the rational chain itself
                    // mines at a loss; no override is granted there.
                    let loss_pct = if rational_profit > 0.0 {
                        loss / rational_profit
                    } else {
                        f64::INFINITY
                    };
                    let tolerance =
                        pool.ideology_strength * pool.max_loss_pct;
                    let within_cap = costs.cumulative_cost_usd + loss
                        <= pool.max_loss_usd;

                    if loss_pct <= tolerance && within_cap {
                        costs.cumulative_cost_usd += loss;
                        costs.ideology_overrides += 1;
                        info!(
                            pool = %pool.id,
                            chain = %pref,
                            loss,
                            "pool sacrifices profit for its preferred chain"
                        );
                        (pref, loss, true, DecisionReason::IdeologyOverride)
                    } else {
                        costs.forced_switches += 1;
                        info!(
                            pool = %pool.id,
                            chain = %rational,
                            loss,
                            "loss tolerance exceeded, pool forced to rational chain"
                        );
                        (
                            rational.clone(),
                            0.0,
                            false,
                            DecisionReason::ForcedSwitch,
                        )
                    }
                }
                Some(_) => {
                    // Preference and profit agree.
                    (rational.clone(), 0.0, false, DecisionReason::Rational)
                }
                None => {
                    // Anti-thrash margin: a profit-driven pool abandons its
                    // current chain only for an advantage above its switch
                    // threshold.
                    let advantage = rational_profit - profit_on(&current);
                    let demanded =
                        pool.switch_threshold * rational_profit.abs();

                    if rational != current && advantage <= demanded {
                        debug!(
                            pool = %pool.id,
                            chain = %current,
                            advantage,
                            "profit advantage under switch threshold, holding"
                        );
                        (
                            current.clone(),
                            0.0,
                            false,
                            DecisionReason::HeldPosition,
                        )
                    } else {
                        (
                            rational.clone(),
                            0.0,
                            false,
                            DecisionReason::Rational,
                        )
                    }
                }
            };

            let profits = BTreeMap::from([
                (self.chain_a.clone(), profit_a),
                (self.chain_b.clone(), profit_b),
            ]);

            batch.push(Decision {
                timestamp: now,
                pool: pool.id.clone(),
                chosen: chosen.clone(),
                rational,
                profits,
                overridden,
                incremental_cost: incremental,
                cumulative_cost: costs.cumulative_cost_usd,
                reason,
            });
            staged_allocations.insert(pool.id.clone(), chosen);
            staged_ledger.insert(pool.id.clone(), costs);
        }

        self.allocations = staged_allocations;
        self.ledger = staged_ledger;
        self.decisions.extend(batch.iter().cloned());

        Ok(batch)
    }

    /// Draws which pool mines the next block, weighted by hashrate share,
    /// and resolves the node it mines through on its allocated chain.
    ///
    /// A pool with no node on its allocated chain is an error, never a
    /// re-draw: silently skipping it would bias the selection frequencies
    /// every result rests on.
    pub fn select_mining_pool(
        &mut self,
    ) -> Result<(PoolId, ChainId, NodeHandle), EngineError> {
        let index = self.weights.sample(&mut self.rng);
        let pool = &self.roster.pools()[index];
        let chain = self.allocations[&pool.id].clone();
        let node = self.topology.node_for(&pool.id, &chain)?.clone();

        Ok((pool.id.clone(), chain, node))
    }
}
