//! Simulated fee revenue per block, driven by congestion and optional
//! manipulation.
//!
//! Fees are deliberately not gated on the sustained-fork flag: real fee
//! markets react to mempool pressure immediately, whether or not the price
//! layer has accepted the fork as genuine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    chain::ChainId,
    error::{ConfigurationError, EngineError, NotFoundError},
};

/// Default baseline fee revenue per block, in BTC.
pub const DEFAULT_BASE_FEE: f64 = 0.05;
/// Default scaling of congestion into fee pressure.
pub const DEFAULT_CONGESTION_MULTIPLIER: f64 = 2.0;

/// One observed fee level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeePoint {
    pub timestamp: u64,
    pub fee: f64,
}

/// An active fee-manipulation campaign on one chain: `spend` BTC of
/// artificial fee pressure spread over a fixed number of blocks, decaying
/// linearly so the boost integrates to the full spend.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Manipulation {
    initial_boost: f64,
    duration: u64,
    remaining: u64,
}

impl Manipulation {
    fn new(spend: f64, duration_blocks: u64) -> Self {
        Manipulation {
            // Linear decay from 2*spend/(duration+1) sums to exactly `spend`.
            initial_boost: 2.0 * spend / (duration_blocks + 1) as f64,
            duration: duration_blocks,
            remaining: duration_blocks,
        }
    }

    /// Consumes one block of the campaign and returns its boost.
    fn next_boost(&mut self) -> f64 {
        if self.remaining == 0 {
            return 0.0;
        }
        let boost =
            self.initial_boost * self.remaining as f64 / self.duration as f64;
        self.remaining -= 1;

        boost
    }

    fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Per-chain fee oracle for one run. Fee values are BTC of fee revenue per
/// mined block.
#[derive(Debug, Clone)]
pub struct FeeOracle {
    base_fee: f64,
    congestion_multiplier: f64,
    fees: BTreeMap<ChainId, f64>,
    history: BTreeMap<ChainId, Vec<FeePoint>>,
    manipulations: BTreeMap<ChainId, Manipulation>,
}

impl FeeOracle {
    /// Creates an oracle quoting `base_fee` for every chain in `chains`.
    pub fn new<I>(
        chains: I,
        base_fee: f64,
        congestion_multiplier: f64,
    ) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = ChainId>,
    {
        use ConfigurationError::*;

        if !(base_fee > 0.0) {
            return Err(NonPositiveBaseFee(base_fee));
        }
        if !(congestion_multiplier >= 0.0) {
            return Err(NegativeCongestionMultiplier(congestion_multiplier));
        }

        let mut fees = BTreeMap::new();
        let mut history = BTreeMap::new();
        for chain in chains {
            fees.insert(chain.clone(), base_fee);
            history.insert(chain, Vec::new());
        }

        Ok(FeeOracle {
            base_fee,
            congestion_multiplier,
            fees,
            history,
            manipulations: BTreeMap::new(),
        })
    }

    #[inline]
    pub fn base_fee(&self) -> f64 {
        self.base_fee
    }

    /// Returns the current fee revenue per block on `chain`.
    pub fn fee(&self, chain: &ChainId) -> Result<f64, NotFoundError> {
        self.fees
            .get(chain)
            .copied()
            .ok_or_else(|| NotFoundError::Chain(chain.clone()))
    }

    /// Returns the full observed fee history of `chain`.
    pub fn history(
        &self,
        chain: &ChainId,
    ) -> Result<&[FeePoint], NotFoundError> {
        self.history
            .get(chain)
            .map(Vec::as_slice)
            .ok_or_else(|| NotFoundError::Chain(chain.clone()))
    }

    /// Starts a manipulation campaign on `chain`, replacing any remainder
    /// of an earlier campaign.
    pub fn apply_manipulation(
        &mut self,
        chain: &ChainId,
        spend: f64,
        duration_blocks: u64,
    ) -> Result<(), EngineError> {
        use ConfigurationError::*;

        if !self.fees.contains_key(chain) {
            return Err(NotFoundError::Chain(chain.clone()).into());
        }
        if !(spend > 0.0) {
            return Err(NonPositiveManipulationSpend(spend).into());
        }
        if duration_blocks == 0 {
            return Err(ZeroManipulationDuration.into());
        }

        self.manipulations
            .insert(chain.clone(), Manipulation::new(spend, duration_blocks));

        Ok(())
    }

    /// Advances `chain`'s fee by one tick from the observed transaction
    /// volume, then records it. Floored at the base fee.
    pub fn update(
        &mut self,
        chain: &ChainId,
        tx_volume: f64,
        blocks_per_interval: f64,
        block_capacity: f64,
        now: u64,
    ) -> Result<f64, EngineError> {
        use ConfigurationError::*;

        if !self.fees.contains_key(chain) {
            return Err(NotFoundError::Chain(chain.clone()).into());
        }
        if !(blocks_per_interval > 0.0) {
            return Err(BadBlocksPerInterval(blocks_per_interval).into());
        }
        if !(block_capacity > 0.0) {
            return Err(BadBlockCapacity(block_capacity).into());
        }

        let congestion =
            tx_volume.max(0.0) / (blocks_per_interval * block_capacity);

        let boost = match self.manipulations.get_mut(chain) {
            Some(manipulation) => {
                let boost = manipulation.next_boost();
                if manipulation.exhausted() {
                    self.manipulations.remove(chain);
                }
                boost
            }
            None => 0.0,
        };

        let fee = (self.base_fee
            * (1.0 + congestion * self.congestion_multiplier)
            + boost)
            .max(self.base_fee);

        self.fees.insert(chain.clone(), fee);
        self.history
            .entry(chain.clone())
            .or_default()
            .push(FeePoint { timestamp: now, fee });

        Ok(fee)
    }
}
