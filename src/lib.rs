/*!
Simulator for market-driven resolution of blockchain forks.

Each block tick the engine computes simulated market state for two
competing chains and decides, for a roster of independent mining pools,
which chain each one mines. Price divergence is gated behind a
sustained-fork detector so transient tip disagreements never read as a
genuine economic fork, while fees react to congestion immediately. The
cost of every non-rational (ideological) allocation is tracked in a
per-pool ledger, and a hashrate-weighted draw picks which pool mines the
next block.

The engine is single-threaded and discrete-time: an external driver feeds
it one [`ChainObservation`](chain::ChainObservation) per tick and consumes
the resulting [`TickOutcome`](engine::TickOutcome). Parameter sweeps run
many independent engines in parallel via [`sweep::SweepGroup`].
*/

pub mod chain;
pub mod engine;
pub mod error;
pub mod export;
pub mod fee;
pub mod fork;
pub mod pool;
pub mod prelude;
pub mod price;
pub mod strategy;
pub mod sweep;
