//! Flat, serializable views of a run's output for offline analysis.
//!
//! The market history and decision log render as CSV through their
//! [`Display`] implementations, or as JSON via serde.

use std::fmt::Display;

use serde::Serialize;

use crate::{
    chain::ChainId,
    error::NotFoundError,
    fee::FeeOracle,
    price::PriceOracle,
    strategy::Decision,
};

/// Floating point precision of exported data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// One (timestamp, chain, price, fee) sample of the market history, tagged
/// with the sustained flag in force when the price was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRow {
    pub timestamp: u64,
    pub chain: ChainId,
    pub price: f64,
    pub fee: f64,
    pub sustained: bool,
}

/// The joined price/fee time series of a run, one row per chain per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSeries {
    rows: Vec<MarketRow>,
}

impl MarketSeries {
    /// Joins both oracles' histories over the given chains.
    ///
    /// The oracles must have been updated in lockstep, one entry each per
    /// tick, as [`Engine::tick`](crate::engine::Engine::tick) does: rows
    /// pair up by index and any unmatched tail of the longer history is
    /// dropped. Rows are ordered by timestamp, then by chain, matching
    /// tick order.
    pub fn from_oracles(
        price: &PriceOracle,
        fee: &FeeOracle,
        chains: &[ChainId],
    ) -> Result<Self, NotFoundError> {
        let mut rows = Vec::new();
        for chain in chains {
            let prices = price.history(chain)?;
            let fees = fee.history(chain)?;

            for (price_point, fee_point) in prices.iter().zip(fees) {
                rows.push(MarketRow {
                    timestamp: price_point.timestamp,
                    chain: chain.clone(),
                    price: price_point.price,
                    fee: fee_point.fee,
                    sustained: price_point.sustained,
                });
            }
        }
        rows.sort_by(|a, b| {
            (a.timestamp, &a.chain).cmp(&(b.timestamp, &b.chain))
        });

        Ok(MarketSeries { rows })
    }

    #[inline]
    pub fn rows(&self) -> &[MarketRow] {
        &self.rows
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows)
    }
}

impl Display for MarketSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timestamp,chain,price,fee,sustained")?;
        for row in &self.rows {
            writeln!(f)?;
            write!(
                f,
                "{},{},{:.4$},{:.4$},{5}",
                row.timestamp,
                row.chain,
                row.price,
                row.fee,
                FLOAT_PRECISION_DIGITS,
                row.sustained,
            )?;
        }

        Ok(())
    }
}

/// CSV/JSON view over a run's decision log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionLog<'a> {
    decisions: &'a [Decision],
}

impl<'a> DecisionLog<'a> {
    pub fn new(decisions: &'a [Decision]) -> Self {
        DecisionLog { decisions }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self.decisions)
    }
}

impl Display for DecisionLog<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Profit columns follow the chain order of the first decision;
        // every decision in one run quotes the same chain pair.
        let chains: Vec<&ChainId> = match self.decisions.first() {
            Some(first) => first.profits.keys().collect(),
            None => Vec::new(),
        };

        write!(f, "timestamp,pool,chosen,rational")?;
        for chain in &chains {
            write!(f, ",profit {chain}")?;
        }
        write!(f, ",override,incremental_cost,cumulative_cost,reason")?;

        for decision in self.decisions {
            writeln!(f)?;
            write!(
                f,
                "{},{},{},{}",
                decision.timestamp,
                decision.pool,
                decision.chosen,
                decision.rational,
            )?;
            for chain in &chains {
                let profit =
                    decision.profits.get(*chain).copied().unwrap_or(f64::NAN);
                write!(f, ",{profit:.0$}", FLOAT_PRECISION_DIGITS)?;
            }
            write!(
                f,
                ",{},{:.4$},{:.4$},{}",
                decision.overridden,
                decision.incremental_cost,
                decision.cumulative_cost,
                decision.reason,
                FLOAT_PRECISION_DIGITS,
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        chain::PoolId,
        fork::evaluate,
        price::{ChainStanding, PriceParams},
        strategy::DecisionReason,
    };

    #[test]
    fn market_series_joins_price_and_fee_histories() {
        let chains = [ChainId::from("btc-a"), ChainId::from("btc-b")];
        let mut price =
            PriceOracle::new(chains.clone(), 50_000.0, PriceParams::default())
                .unwrap();
        let mut fee = FeeOracle::new(chains.clone(), 0.05, 2.0).unwrap();

        let fork = evaluate(101, 101, 100, 6).unwrap();
        let standing = ChainStanding {
            height: 101,
            custody_btc: 50.0,
            daily_tx_volume: 50.0,
            hashrate_share: 50.0,
        };
        for now in 0..3 {
            for chain in &chains {
                price
                    .update(chain, &fork, &standing, &standing, now)
                    .unwrap();
                fee.update(chain, 1_000.0, 6.0, 500.0, now).unwrap();
            }
        }

        let series =
            MarketSeries::from_oracles(&price, &fee, &chains).unwrap();

        assert_eq!(series.rows().len(), 6);
        assert_eq!(series.rows()[0].timestamp, 0);
        assert_eq!(series.rows()[0].chain, chains[0]);
        assert_eq!(series.rows()[1].chain, chains[1]);

        let csv = series.to_string();
        assert!(csv.starts_with("timestamp,chain,price,fee,sustained"));
        assert_eq!(csv.lines().count(), 7);
    }

    #[test]
    fn unevenly_driven_oracles_pair_up_to_the_shorter_history() {
        let chains = [ChainId::from("btc-a")];
        let mut price =
            PriceOracle::new(chains.clone(), 50_000.0, PriceParams::default())
                .unwrap();
        let mut fee = FeeOracle::new(chains.clone(), 0.05, 2.0).unwrap();

        let fork = evaluate(101, 101, 100, 6).unwrap();
        let standing = ChainStanding {
            height: 101,
            custody_btc: 50.0,
            daily_tx_volume: 50.0,
            hashrate_share: 50.0,
        };
        for now in 0..3 {
            price
                .update(&chains[0], &fork, &standing, &standing, now)
                .unwrap();
        }
        for now in 0..2 {
            fee.update(&chains[0], 1_000.0, 6.0, 500.0, now).unwrap();
        }

        let series =
            MarketSeries::from_oracles(&price, &fee, &chains).unwrap();
        assert_eq!(series.rows().len(), 2);
    }

    #[test]
    fn decision_log_renders_one_profit_column_per_chain() {
        let decision = Decision {
            timestamp: 6,
            pool: PoolId::from("x"),
            chosen: ChainId::from("btc-b"),
            rational: ChainId::from("btc-a"),
            profits: BTreeMap::from([
                (ChainId::from("btc-a"), 450_000.0),
                (ChainId::from("btc-b"), 400_000.0),
            ]),
            overridden: true,
            incremental_cost: 50_000.0,
            cumulative_cost: 50_000.0,
            reason: DecisionReason::IdeologyOverride,
        };

        let log = vec![decision];
        let csv = DecisionLog::new(&log).to_string();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next().unwrap(),
            "timestamp,pool,chosen,rational,profit btc-a,profit btc-b,\
             override,incremental_cost,cumulative_cost,reason"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("6,x,btc-b,btc-a,450000.000000,400000.000000"));
        assert!(row.contains("ideology override"));
    }

    #[test]
    fn json_export_round_trips_through_serde() {
        let log: Vec<Decision> = Vec::new();
        assert_eq!(DecisionLog::new(&log).to_json().unwrap(), "[]");
    }
}
