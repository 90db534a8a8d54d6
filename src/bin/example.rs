use std::error::Error;

use fork_market_sim::prelude::*;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let chain_a = ChainId::from("btc-a");
    let chain_b = ChainId::from("btc-b");

    let roster = PoolRoster::new(vec![
        PoolProfile {
            id: PoolId::from("atlas"),
            hashrate_share: 35.0,
            preference: Preference::None,
            ideology_strength: 0.0,
            max_loss_usd: 0.0,
            max_loss_pct: 0.0,
            switch_threshold: 0.02,
        },
        PoolProfile {
            id: PoolId::from("meridian"),
            hashrate_share: 40.0,
            preference: Preference::None,
            ideology_strength: 0.0,
            max_loss_usd: 0.0,
            max_loss_pct: 0.0,
            switch_threshold: 0.02,
        },
        PoolProfile {
            id: PoolId::from("zealot"),
            hashrate_share: 25.0,
            preference: Preference::Chain(chain_b.clone()),
            ideology_strength: 0.8,
            max_loss_usd: 5_000_000.0,
            max_loss_pct: 0.25,
            switch_threshold: 0.0,
        },
    ])?;

    let mut topology = Topology::default();
    for pool in ["atlas", "meridian", "zealot"] {
        for chain in [&chain_a, &chain_b] {
            topology.insert(
                PoolId::from(pool),
                chain.clone(),
                NodeHandle::new(format!("{pool}-{chain}")),
            );
        }
    }

    let mut engine = Engine::builder()
        .chains(chain_a.clone(), chain_b.clone())
        .roster(roster)
        .topology(topology)
        .fundamentals(
            chain_a.clone(),
            Fundamentals { custody_btc: 140_000.0, daily_tx_volume: 320.0 },
        )
        .fundamentals(
            chain_b.clone(),
            Fundamentals { custody_btc: 60_000.0, daily_tx_volume: 130.0 },
        )
        .base_price(50_000.0)
        .decision_interval(6)
        .seed(2024)
        .build()?;

    // 48 lockstep blocks past the fork point: the first two ticks stay
    // under the sustained threshold, then prices start to diverge.
    for i in 1..=48 {
        let outcome = engine.tick(&ChainObservation {
            height_a: 840_000 + i,
            height_b: 840_000 + i,
            ancestor_height: 840_000,
            tx_volume_a: 9_000.0,
            tx_volume_b: 4_000.0,
        })?;

        let (pool, chain, node) = &outcome.selected;
        println!(
            "tick {:>2} depth {:>2} sustained {:5} -> {pool} mines {chain} via {node}",
            outcome.tick, outcome.fork.depth, outcome.fork.sustained,
        );
    }

    let chains = [chain_a, chain_b];
    let series = MarketSeries::from_oracles(
        engine.price_oracle(),
        engine.fee_oracle(),
        &chains,
    )?;
    println!("\n{series}");

    println!("\n{}", DecisionLog::new(engine.strategy().decisions()));

    for (pool, costs) in engine.strategy().ledger() {
        println!(
            "{pool}: opportunity cost ${:.2}, overrides {}, forced switches {}",
            costs.cumulative_cost_usd,
            costs.ideology_overrides,
            costs.forced_switches,
        );
    }

    Ok(())
}
