//! Running many independent engine configurations over one scripted
//! scenario, for parameter sweeps.
//!
//! Each run builds its own [`Engine`]; nothing is shared between runs, so
//! they parallelize freely.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
    chain::{ChainObservation, PoolId},
    engine::EngineBuilder,
    error::{EngineError, NotFoundError, TickError},
    export::MarketSeries,
    fork::ForkRecord,
    strategy::{Decision, PoolCosts},
};

/// A scripted sequence of per-tick chain observations, standing in for the
/// live RPC polling a deployed run would do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub observations: Vec<ChainObservation>,
}

impl Scenario {
    pub fn new(observations: Vec<ChainObservation>) -> Self {
        Scenario { observations }
    }

    /// Both chains advancing in lockstep from `ancestor`, with constant
    /// transaction volume. The simplest way to script a fork of a given
    /// eventual depth.
    pub fn lockstep(ancestor: i64, ticks: usize, tx_volume: f64) -> Self {
        let observations = (1..=ticks as i64)
            .map(|i| ChainObservation {
                height_a: ancestor + i,
                height_b: ancestor + i,
                ancestor_height: ancestor,
                tx_volume_a: tx_volume,
                tx_volume_b: tx_volume,
            })
            .collect();

        Scenario { observations }
    }
}

/// Everything retained from one completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    pub label: String,
    pub final_fork: Option<ForkRecord>,
    pub ledger: BTreeMap<PoolId, PoolCosts>,
    pub decisions: Vec<Decision>,
    pub market: MarketSeries,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SweepError {
    #[error("run {label} failed to build: {source}")]
    Build {
        label: String,
        #[source]
        source: EngineError,
    },
    #[error("run {label} aborted: {source}")]
    Aborted {
        label: String,
        #[source]
        source: TickError,
    },
    #[error("run {label} could not export results: {source}")]
    Export {
        label: String,
        #[source]
        source: NotFoundError,
    },
}

/// A group of labelled engine configurations sharing one scenario.
#[derive(Debug, Clone)]
pub struct SweepGroup {
    scenario: Scenario,
    runs: Vec<(String, EngineBuilder)>,
}

impl SweepGroup {
    pub fn new(scenario: Scenario) -> Self {
        SweepGroup { scenario, runs: Vec::new() }
    }

    /// Adds one labelled configuration to the sweep.
    pub fn add<L: Into<String>>(
        mut self,
        label: L,
        builder: EngineBuilder,
    ) -> Self {
        self.runs.push((label.into(), builder));

        self
    }

    /// Executes every configured run against the shared scenario, each on
    /// its own engine instance. The first failing run aborts the sweep.
    pub fn run_all(self) -> Result<Vec<RunOutput>, SweepError> {
        let SweepGroup { scenario, runs } = self;
        let scenario = &scenario;

        #[cfg(feature = "rayon")]
        let outputs: Result<Vec<_>, _> = runs
            .into_par_iter()
            .map(|(label, builder)| run_one(label, builder, scenario))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let outputs: Result<Vec<_>, _> = runs
            .into_iter()
            .map(|(label, builder)| run_one(label, builder, scenario))
            .collect();

        outputs
    }
}

fn run_one(
    label: String,
    builder: EngineBuilder,
    scenario: &Scenario,
) -> Result<RunOutput, SweepError> {
    let mut engine = builder.build().map_err(|source| SweepError::Build {
        label: label.clone(),
        source,
    })?;

    for observation in &scenario.observations {
        engine.tick(observation).map_err(|source| SweepError::Aborted {
            label: label.clone(),
            source,
        })?;
    }

    let (chain_a, chain_b) = engine.chains();
    let chains = [chain_a.clone(), chain_b.clone()];
    let market = MarketSeries::from_oracles(
        engine.price_oracle(),
        engine.fee_oracle(),
        &chains,
    )
    .map_err(|source| SweepError::Export { label: label.clone(), source })?;

    Ok(RunOutput {
        label,
        final_fork: engine.last_fork().copied(),
        ledger: engine.strategy().ledger().clone(),
        decisions: engine.strategy().decisions().to_vec(),
        market,
    })
}
