//! Simulated USD price discovery for the competing chains.
//!
//! Both chains share one base price until the fork tracker reports a
//! sustained fork. Only then does each chain's price move toward a target
//! blended from its relative fundamentals, and never by more than a capped
//! fraction per update. Divergence applies forward only: nothing is
//! rewritten retroactively when the flag flips.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chain::ChainId,
    error::{ConfigurationError, NotFoundError},
    fork::ForkRecord,
};

/// Default cap on the fractional price change of a single update.
pub const DEFAULT_MAX_CHANGE: f64 = 0.05;
/// Default blend weight of relative chain-height progress.
pub const DEFAULT_CHAIN_WEIGHT: f64 = 0.3;
/// Default blend weight of relative economic weight (custody and volume).
pub const DEFAULT_ECONOMIC_WEIGHT: f64 = 0.5;
/// Default blend weight of relative hashrate share.
pub const DEFAULT_HASHRATE_WEIGHT: f64 = 0.2;

/// Tunable parameters of the price model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceParams {
    pub max_change: f64,
    pub chain_weight: f64,
    pub economic_weight: f64,
    pub hashrate_weight: f64,
}

impl Default for PriceParams {
    fn default() -> Self {
        PriceParams {
            max_change: DEFAULT_MAX_CHANGE,
            chain_weight: DEFAULT_CHAIN_WEIGHT,
            economic_weight: DEFAULT_ECONOMIC_WEIGHT,
            hashrate_weight: DEFAULT_HASHRATE_WEIGHT,
        }
    }
}

/// One chain's standing at price-update time, assembled by the engine from
/// the current tick's fork record, fundamentals, and allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainStanding {
    pub height: u64,
    pub custody_btc: f64,
    pub daily_tx_volume: f64,
    pub hashrate_share: f64,
}

/// One observed price, tagged with whether the fork was sustained when it
/// was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: u64,
    pub price: f64,
    pub sustained: bool,
}

/// Per-chain USD price oracle for one run.
#[derive(Debug, Clone)]
pub struct PriceOracle {
    base_price: f64,
    params: PriceParams,
    prices: BTreeMap<ChainId, f64>,
    history: BTreeMap<ChainId, Vec<PricePoint>>,
}

impl PriceOracle {
    /// Allowable difference between the blend weight sum and 1.0.
    const EPSILON_WEIGHT: f64 = 1e-6;

    /// Creates an oracle quoting `base_price` for every chain in `chains`.
    pub fn new<I>(
        chains: I,
        base_price: f64,
        params: PriceParams,
    ) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = ChainId>,
    {
        use ConfigurationError::*;

        if !(base_price > 0.0) {
            return Err(NonPositiveBasePrice(base_price));
        }
        if params.max_change.is_nan()
            || !(0.0..=1.0).contains(&params.max_change)
        {
            return Err(BadMaxPriceChange(params.max_change));
        }

        let weight_sum =
            params.chain_weight + params.economic_weight + params.hashrate_weight;
        if weight_sum.is_nan()
            || f64::abs(weight_sum - 1.0) > Self::EPSILON_WEIGHT
        {
            return Err(BadBlendWeights(weight_sum));
        }

        let mut prices = BTreeMap::new();
        let mut history = BTreeMap::new();
        for chain in chains {
            prices.insert(chain.clone(), base_price);
            history.insert(chain, Vec::new());
        }

        Ok(PriceOracle { base_price, params, prices, history })
    }

    #[inline]
    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Returns the current price of `chain`.
    pub fn price(&self, chain: &ChainId) -> Result<f64, NotFoundError> {
        self.prices
            .get(chain)
            .copied()
            .ok_or_else(|| NotFoundError::Chain(chain.clone()))
    }

    /// Returns the full observed price history of `chain`.
    pub fn history(
        &self,
        chain: &ChainId,
    ) -> Result<&[PricePoint], NotFoundError> {
        self.history
            .get(chain)
            .map(Vec::as_slice)
            .ok_or_else(|| NotFoundError::Chain(chain.clone()))
    }

    /// Advances `chain`'s price by one tick and records it.
    ///
    /// While the fork is not sustained the price is forced back to the base
    /// price, whatever the fundamentals say. Once sustained, the price steps
    /// toward the blended target, capped at `max_change` of the current
    /// price per update.
    pub fn update(
        &mut self,
        chain: &ChainId,
        fork: &ForkRecord,
        own: &ChainStanding,
        rival: &ChainStanding,
        now: u64,
    ) -> Result<f64, NotFoundError> {
        let current = self.price(chain)?;

        let next = if !fork.sustained {
            self.base_price
        } else {
            let target = self.target_price(fork, own, rival);
            let cap = self.params.max_change * current;
            let step = (target - current).clamp(-cap, cap);

            debug!(
                chain = %chain,
                current,
                target,
                step,
                "price moving toward fundamentals target"
            );
            current + step
        };

        self.prices.insert(chain.clone(), next);
        self.history.entry(chain.clone()).or_default().push(PricePoint {
            timestamp: now,
            price: next,
            sustained: fork.sustained,
        });

        Ok(next)
    }

    /// Target price for a chain once divergence is allowed: twice the base
    /// price scaled by the blended relative factor, so an even split on all
    /// factors targets the base price itself.
    fn target_price(
        &self,
        fork: &ForkRecord,
        own: &ChainStanding,
        rival: &ChainStanding,
    ) -> f64 {
        let own_progress =
            own.height.saturating_sub(fork.ancestor_height) as f64;
        let rival_progress =
            rival.height.saturating_sub(fork.ancestor_height) as f64;

        let chain_factor = share_of(own_progress, rival_progress);
        let economic_factor = 0.5
            * (share_of(own.custody_btc, rival.custody_btc)
                + share_of(own.daily_tx_volume, rival.daily_tx_volume));
        let hashrate_factor =
            share_of(own.hashrate_share, rival.hashrate_share);

        let blend = self.params.chain_weight * chain_factor
            + self.params.economic_weight * economic_factor
            + self.params.hashrate_weight * hashrate_factor;

        2.0 * self.base_price * blend
    }
}

/// Fraction of a two-sided quantity held by `own`. Neutral when neither
/// side reports anything, so an empty factor cannot skew the blend.
fn share_of(own: f64, rival: f64) -> f64 {
    let total = own + rival;
    if total <= 0.0 {
        0.5
    } else {
        own / total
    }
}
