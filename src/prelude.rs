/*!
Re-export of common values and datatypes used for building and running
fork-market simulations. Must be imported manually.

```
use fork_market_sim::prelude::*;
```
*/

use crate::{
    chain, engine, error, export, fee, fork, pool, price, strategy, sweep,
};

pub use chain::{ChainId, ChainObservation, Fundamentals, NodeHandle, PoolId};

pub use engine::{Engine, EngineBuilder, MarketQuote, TickOutcome};

pub use error::{
    Component, ConfigurationError, EngineError, InvalidStateError,
    MissingInfrastructureError, NotFoundError, TickError,
};

pub use export::{DecisionLog, MarketRow, MarketSeries};

pub use fee::FeeOracle;

pub use fork::{ForkRecord, DEFAULT_SUSTAINED_THRESHOLD};

pub use pool::{PoolProfile, PoolRoster, Preference, Topology};

pub use price::{ChainStanding, PriceOracle, PriceParams};

pub use strategy::{
    Decision, DecisionReason, PoolCosts, PoolStrategy, ProfitModel,
};

pub use sweep::{RunOutput, Scenario, SweepError, SweepGroup};
