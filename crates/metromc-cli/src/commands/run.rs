use super::prepare_replica;
use crate::cli::RunArgs;
use crate::config::{InputFile, RunConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use metromc::engine::progress::ProgressReporter;
use metromc::engine::replica::{ChannelTransport, ReplicaTransport};
use metromc::workflows::simulate::{self, SimulationResult};
use serde::Serialize;
use std::thread;
use tracing::{debug, error, info};

#[derive(Debug, Serialize)]
pub struct ReplicaReport {
    pub rank: usize,
    #[serde(flatten)]
    pub result: SimulationResult,
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = InputFile::from_file(&args.input)?.merge_with_cli(&args.overrides)?;
    info!(
        replicas = config.replicas,
        moves = config.moves.len(),
        "Configuration merged."
    );

    let handler = CliProgressHandler::new();
    println!(
        "Starting simulation ({} replica(s), {} x {} steps)...",
        config.replicas, config.simulation.macro_steps, config.simulation.micro_steps
    );
    let reports = if config.replicas == 1 {
        vec![run_replica(&config, None, &handler)?]
    } else {
        run_tempering(&config, &handler)?
    };

    let json = serde_json::to_string_pretty(&reports).map_err(|e| CliError::Other(e.into()))?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("✓ Statistics written to: {}", path.display());
        }
        None => println!("{json}"),
    }
    for report in &reports {
        info!(
            rank = report.rank,
            final_energy = report.result.final_energy,
            max_drift = report.result.max_drift,
            "Replica finished."
        );
    }
    Ok(())
}

fn run_replica(
    config: &RunConfig,
    transport: Option<Box<dyn ReplicaTransport>>,
    handler: &CliProgressHandler,
) -> Result<ReplicaReport> {
    let rank = transport.as_ref().map_or(0, |t| t.rank());
    let (mut space, moves) = prepare_replica(config, transport)?;
    let reporter = if rank == 0 {
        ProgressReporter::with_callback(handler.get_callback())
    } else {
        ProgressReporter::new()
    };
    let potential = config.replica(rank).potential;
    debug!(rank, temperature = potential.temperature, hamiltonian = ?potential.kind, "Replica potential.");
    let hamiltonian = potential.build();
    let result = simulate::run(
        &mut space,
        hamiltonian.as_ref(),
        moves,
        &config.simulation,
        &reporter,
    )?;
    Ok(ReplicaReport { rank, result })
}

/// Runs every replica on its own thread, connected by an in-process channel mesh.
fn run_tempering(config: &RunConfig, handler: &CliProgressHandler) -> Result<Vec<ReplicaReport>> {
    let mesh = ChannelTransport::mesh(config.replicas, Some(config.timeout));
    let outcomes: Vec<Result<ReplicaReport>> = thread::scope(|scope| {
        let handles: Vec<_> = mesh
            .into_iter()
            .map(|transport| {
                scope.spawn(move || {
                    let rank = transport.rank();
                    run_replica(config, Some(Box::new(transport)), handler).inspect_err(|e| {
                        error!(rank, "Replica failed: {e}");
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(CliError::Other(anyhow::anyhow!("replica thread panicked"))))
            })
            .collect()
    });
    outcomes.into_iter().collect()
}
