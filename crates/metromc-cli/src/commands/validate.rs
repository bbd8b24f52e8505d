use super::prepare_replica;
use crate::cli::ValidateArgs;
use crate::config::InputFile;
use crate::error::Result;
use metromc::engine::replica::{ChannelTransport, ReplicaTransport};
use tracing::info;

pub fn run(args: ValidateArgs) -> Result<()> {
    let config = InputFile::from_file(&args.input)?.merge_with_cli(&args.overrides)?;

    // Building never communicates, so a single endpoint of a mesh is enough.
    let transport = (config.replicas > 1)
        .then(|| ChannelTransport::mesh(config.replicas, Some(config.timeout)).into_iter().next())
        .flatten()
        .map(|t| Box::new(t) as Box<dyn ReplicaTransport>);

    let (space, moves) = prepare_replica(&config, transport)?;
    info!("Validated {} move definition(s).", moves.len());

    println!(
        "✓ {} is valid: {} particle(s) in {} group(s), volume {:.4e}, {} replica(s).",
        args.input.display(),
        space.len(),
        space.groups().len(),
        space.geometry().volume(),
        config.replicas
    );
    for mv in &moves {
        let targets: Vec<&str> = mv.targets().iter().map(|t| t.name.as_str()).collect();
        if targets.is_empty() {
            println!("  - {}", mv.title());
        } else {
            println!("  - {} [{}]", mv.title(), targets.join(", "));
        }
    }
    Ok(())
}
