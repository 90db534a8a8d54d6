//! One simulation run: the tick driver that wires the fork tracker, both
//! oracles, and the pool strategy together in the required order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    chain::{ChainId, ChainObservation, Fundamentals, NodeHandle, PoolId},
    error::{Component, ConfigurationError, EngineError, TickError},
    fee::{FeeOracle, DEFAULT_BASE_FEE, DEFAULT_CONGESTION_MULTIPLIER},
    fork::{self, ForkRecord, DEFAULT_SUSTAINED_THRESHOLD},
    pool::{PoolRoster, Topology},
    price::{ChainStanding, PriceOracle, PriceParams},
    strategy::{Decision, PoolStrategy, ProfitModel},
};

/// Default number of block ticks between allocation recomputes. Pools react
/// on a slower cadence than the market moves.
pub const DEFAULT_DECISION_INTERVAL: u64 = 6;
/// Default per-block transaction capacity used by the fee model.
pub const DEFAULT_BLOCK_CAPACITY: f64 = 2_500.0;

/// Current price and fee of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketQuote {
    pub price: f64,
    pub fee: f64,
}

/// Everything one tick produced, applied atomically as observed by the
/// caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutcome {
    pub tick: u64,
    pub fork: ForkRecord,
    pub market: BTreeMap<ChainId, MarketQuote>,
    /// Allocation decisions made this tick; empty off the decision cadence.
    pub decisions: Vec<Decision>,
    /// The pool drawn to mine the next block, its chain, and its node.
    pub selected: (PoolId, ChainId, NodeHandle),
}

/// The economic-decision engine for a single run. Owns all of the run's
/// state; concurrent parameter sweeps each build their own instance.
#[derive(Debug, Clone)]
pub struct Engine {
    chain_a: ChainId,
    chain_b: ChainId,
    fundamentals: BTreeMap<ChainId, Fundamentals>,
    sustained_threshold: u64,
    decision_interval: u64,
    blocks_per_interval: f64,
    block_capacity: f64,
    price: PriceOracle,
    fee: FeeOracle,
    strategy: PoolStrategy,
    tick: u64,
    last_fork: Option<ForkRecord>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Advances the simulation by one block tick.
    ///
    /// Intra-tick order is fixed: the fork tracker runs first so the price
    /// gate sees a fresh sustained flag, fees update ungated, and on the
    /// decision cadence the strategy reads this tick's prices and fees,
    /// never a stale cache. The observation is validated before any state
    /// is touched, and build-time validation (known chains, full node
    /// coverage) leaves the later stages nothing to fail on, so a tick
    /// error never leaves partial state behind. Errors halt the run with
    /// the offending tick and component attached.
    pub fn tick(
        &mut self,
        observation: &ChainObservation,
    ) -> Result<TickOutcome, TickError> {
        let tick = self.tick;
        let fail = |component: Component| {
            move |source: EngineError| TickError { tick, component, source }
        };

        let fork = fork::evaluate(
            observation.height_a,
            observation.height_b,
            observation.ancestor_height,
            self.sustained_threshold,
        )
        .map_err(EngineError::from)
        .map_err(fail(Component::ForkTracker))?;

        let standing_a = self.standing(&self.chain_a, fork.height_a);
        let standing_b = self.standing(&self.chain_b, fork.height_b);

        for (chain, own, rival) in [
            (self.chain_a.clone(), &standing_a, &standing_b),
            (self.chain_b.clone(), &standing_b, &standing_a),
        ] {
            self.price
                .update(&chain, &fork, own, rival, tick)
                .map_err(EngineError::from)
                .map_err(fail(Component::PriceOracle))?;
        }

        for (chain, tx_volume) in [
            (self.chain_a.clone(), observation.tx_volume_a),
            (self.chain_b.clone(), observation.tx_volume_b),
        ] {
            self.fee
                .update(
                    &chain,
                    tx_volume,
                    self.blocks_per_interval,
                    self.block_capacity,
                    tick,
                )
                .map_err(fail(Component::FeeOracle))?;
        }

        let decisions = if tick % self.decision_interval == 0 {
            self.strategy
                .recompute_allocations(tick, &self.price, &self.fee)
                .map_err(fail(Component::Strategy))?
        } else {
            Vec::new()
        };

        let selected = self
            .strategy
            .select_mining_pool()
            .map_err(fail(Component::Strategy))?;

        let market = self
            .market_state()
            .map_err(EngineError::from)
            .map_err(fail(Component::PriceOracle))?;

        self.last_fork = Some(fork);
        self.tick += 1;

        Ok(TickOutcome { tick, fork, market, decisions, selected })
    }

    /// Current price and fee per chain.
    pub fn market_state(
        &self,
    ) -> Result<BTreeMap<ChainId, MarketQuote>, EngineError> {
        let mut market = BTreeMap::new();
        for chain in [&self.chain_a, &self.chain_b] {
            market.insert(
                chain.clone(),
                MarketQuote {
                    price: self.price.price(chain)?,
                    fee: self.fee.fee(chain)?,
                },
            );
        }

        Ok(market)
    }

    /// Fork record of the most recent completed tick.
    #[inline]
    pub fn last_fork(&self) -> Option<&ForkRecord> {
        self.last_fork.as_ref()
    }

    #[inline]
    pub fn chains(&self) -> (&ChainId, &ChainId) {
        (&self.chain_a, &self.chain_b)
    }

    #[inline]
    pub fn ticks_run(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub fn price_oracle(&self) -> &PriceOracle {
        &self.price
    }

    /// Mutable fee oracle access, for drivers that stage manipulation
    /// campaigns between ticks.
    #[inline]
    pub fn fee_oracle_mut(&mut self) -> &mut FeeOracle {
        &mut self.fee
    }

    #[inline]
    pub fn fee_oracle(&self) -> &FeeOracle {
        &self.fee
    }

    #[inline]
    pub fn strategy(&self) -> &PoolStrategy {
        &self.strategy
    }

    fn standing(&self, chain: &ChainId, height: u64) -> ChainStanding {
        // Fundamentals presence is validated at build time.
        let fundamentals = self.fundamentals[chain];

        ChainStanding {
            height,
            custody_btc: fundamentals.custody_btc,
            daily_tx_volume: fundamentals.daily_tx_volume,
            hashrate_share: self.strategy.allocated_share(chain),
        }
    }
}

/// Builds an [`Engine`], validating the whole setup up front so a run can
/// only start from a configuration that means what was intended.
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    chains: Option<(ChainId, ChainId)>,
    roster: Option<PoolRoster>,
    topology: Topology,
    fundamentals: BTreeMap<ChainId, Fundamentals>,
    base_price: Option<f64>,
    price_params: PriceParams,
    base_fee: Option<f64>,
    congestion_multiplier: Option<f64>,
    blocks_per_interval: Option<f64>,
    block_capacity: Option<f64>,
    profit_model: ProfitModel,
    sustained_threshold: Option<u64>,
    decision_interval: Option<u64>,
    seed: Option<u64>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the two competing chains.
    pub fn chains(mut self, chain_a: ChainId, chain_b: ChainId) -> Self {
        self.chains = Some((chain_a, chain_b));

        self
    }

    pub fn roster(mut self, roster: PoolRoster) -> Self {
        self.roster = Some(roster);

        self
    }

    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = topology;

        self
    }

    /// Sets one chain's static economic fundamentals.
    pub fn fundamentals(
        mut self,
        chain: ChainId,
        fundamentals: Fundamentals,
    ) -> Self {
        self.fundamentals.insert(chain, fundamentals);

        self
    }

    /// Shared base price both chains start from (and are pinned to while
    /// no fork is sustained).
    pub fn base_price(mut self, base_price: f64) -> Self {
        self.base_price = Some(base_price);

        self
    }

    pub fn price_params(mut self, params: PriceParams) -> Self {
        self.price_params = params;

        self
    }

    pub fn base_fee(mut self, base_fee: f64) -> Self {
        self.base_fee = Some(base_fee);

        self
    }

    pub fn congestion_multiplier(mut self, multiplier: f64) -> Self {
        self.congestion_multiplier = Some(multiplier);

        self
    }

    /// Fee model geometry: blocks per congestion interval and transactions
    /// per block.
    pub fn fee_capacity(
        mut self,
        blocks_per_interval: f64,
        block_capacity: f64,
    ) -> Self {
        self.blocks_per_interval = Some(blocks_per_interval);
        self.block_capacity = Some(block_capacity);

        self
    }

    pub fn profit_model(mut self, model: ProfitModel) -> Self {
        self.profit_model = model;

        self
    }

    /// Fork depth at which divergence is allowed (default 6).
    pub fn sustained_threshold(mut self, threshold: u64) -> Self {
        self.sustained_threshold = Some(threshold);

        self
    }

    /// Block ticks between allocation recomputes (default 6).
    pub fn decision_interval(mut self, interval: u64) -> Self {
        self.decision_interval = Some(interval);

        self
    }

    /// Seed for the pool-selection generator, for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    /// Creates an [`Engine`] from the specified parameters.
    pub fn build(self) -> Result<Engine, EngineError> {
        use ConfigurationError::*;

        let EngineBuilder {
            chains,
            roster,
            topology,
            fundamentals,
            base_price,
            price_params,
            base_fee,
            congestion_multiplier,
            blocks_per_interval,
            block_capacity,
            profit_model,
            sustained_threshold,
            decision_interval,
            seed,
        } = self;

        let (chain_a, chain_b) = chains.ok_or(BadChainPair)?;
        if chain_a == chain_b {
            return Err(BadChainPair.into());
        }
        let roster = roster.ok_or(EmptyRoster)?;

        for chain in [&chain_a, &chain_b] {
            if !fundamentals.contains_key(chain) {
                return Err(MissingFundamentals(chain.clone()).into());
            }
        }

        let decision_interval = match decision_interval {
            Some(0) => return Err(ZeroDecisionInterval.into()),
            Some(interval) => interval,
            None => DEFAULT_DECISION_INTERVAL,
        };

        let blocks_per_interval =
            blocks_per_interval.unwrap_or(profit_model.blocks_per_hour);
        if !(blocks_per_interval > 0.0) {
            return Err(BadBlocksPerInterval(blocks_per_interval).into());
        }
        let block_capacity = block_capacity.unwrap_or(DEFAULT_BLOCK_CAPACITY);
        if !(block_capacity > 0.0) {
            return Err(BadBlockCapacity(block_capacity).into());
        }

        let price = PriceOracle::new(
            [chain_a.clone(), chain_b.clone()],
            base_price.unwrap_or(50_000.0),
            price_params,
        )?;
        let fee = FeeOracle::new(
            [chain_a.clone(), chain_b.clone()],
            base_fee.unwrap_or(DEFAULT_BASE_FEE),
            congestion_multiplier.unwrap_or(DEFAULT_CONGESTION_MULTIPLIER),
        )?;
        let strategy = PoolStrategy::new(
            roster,
            topology,
            chain_a.clone(),
            chain_b.clone(),
            profit_model,
            seed.unwrap_or(0),
        )?;

        Ok(Engine {
            chain_a,
            chain_b,
            fundamentals,
            sustained_threshold: sustained_threshold
                .unwrap_or(DEFAULT_SUSTAINED_THRESHOLD),
            decision_interval,
            blocks_per_interval,
            block_capacity,
            price,
            fee,
            strategy,
            tick: 0,
            last_fork: None,
        })
    }
}
