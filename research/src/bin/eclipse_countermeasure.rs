use anyhow::{Context, Result};
use p2p_mining_sim::prelude::*;
use tracing_subscriber::EnvFilter;

const PEERS: usize = 12;

fn run(countermeasure: bool) -> Result<SimulationOutput> {
    let output = SimulationBuilder::new()
        .peers(PEERS)
        .malicious(8..PEERS)
        .topology(StaticTopology::ring(PEERS))
        .eclipse_attack(true)
        .countermeasure(countermeasure)
        .horizon(30_000.0)
        .seed(42)
        .build_simulation()?
        .run();

    Ok(output)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    for countermeasure in [false, true] {
        let output = run(countermeasure)?;
        let ratios = ChainRatios::from_output(&output)
            .context("simulation has no peers")?;

        println!("countermeasure = {}", countermeasure);
        println!("{}", ratios);

        // Trust scores honest peer 0 keeps for its ring neighbours
        let peer = output.peer(PeerId::from(0)).context("missing peer 0")?;
        print!("{}", TrustReport::new(peer));
        println!();
    }

    Ok(())
}
