use anyhow::Result;
use p2p_mining_sim::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,p2p_mining_sim=info")),
        )
        .init();

    let simulation = SimulationBuilder::new()
        .peers(20)
        .malicious(15..20)
        .horizon(60_000.0)
        .repeat_all(8)
        .hashing_power(PowerDistribution::Colluding)
        .hashing_power(PowerDistribution::Equal)
        .build()?;

    let results = simulation
        .run_all()
        .average(Average::Mean)
        .all()
        .format(Format::CSV)
        .build();

    println!("{}", results);
    Ok(())
}
