use clap::Parser;
use ecogrid_schemas::load_state_manual;
use ecogrid_sim::{GridSimulator, SimulatorConfig};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{Cli, Commands};

fn load_simulator(scenario: &str, enable_noise: bool) -> anyhow::Result<GridSimulator> {
    if ecogrid_scenarios::list_scenarios().iter().any(|s| s.id == scenario) {
        info!("loading built-in scenario '{scenario}'");
        return ecogrid_scenarios::build_scenario(scenario);
    }

    info!("loading topology from '{scenario}'");
    let graph = load_state_manual(scenario)?;
    let mut sim = GridSimulator::new(SimulatorConfig { enable_noise, ..Default::default() });
    for node in graph.nodes() {
        sim.add_node(node.clone());
    }
    for (u, v) in graph.unordered_edges() {
        if let Some(edge) = graph.get_edge(u, v) {
            sim.add_edge(u, v, edge.distance_km, edge.resistance_ohm, edge.efficiency);
        }
    }
    Ok(sim)
}

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder().with_max_level(cli.log_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match &cli.command {
        Commands::Scenarios {} => {
            for info in ecogrid_scenarios::list_scenarios() {
                println!("{:<28} {}", info.id, info.description);
            }
        }
        Commands::Run { scenario, ticks, no_noise, save_to } => {
            let sim = load_simulator(scenario, !no_noise);
            let mut sim = match sim {
                Ok(sim) => sim,
                Err(e) => {
                    error!("failed to load '{scenario}': {e}");
                    std::process::exit(1);
                }
            };

            for _ in 0..*ticks {
                sim.step();
            }

            let metrics = sim.get_metrics();
            println!(
                "tick={} active={}/{} total_load={:.1}kW efficiency={:.1}",
                metrics.tick, metrics.active_node_count, metrics.total_node_count, metrics.total_load, metrics.global_efficiency
            );
            for line in sim.get_log() {
                println!("  {line}");
            }

            if let Some(path) = save_to {
                if let Err(e) = ecogrid_schemas::save_state_manual(sim.graph(), path) {
                    error!("failed to save topology to '{path}': {e}");
                    std::process::exit(1);
                }
                info!("saved topology to '{path}'");
            }
        }
    }
}
