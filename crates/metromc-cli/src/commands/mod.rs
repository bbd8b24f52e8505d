pub mod run;
pub mod validate;

use crate::config::RunConfig;
use crate::error::Result;
use metromc::core::space::Space;
use metromc::engine::protocol::Move;
use metromc::engine::registry::{BuildContext, build_moves};
use metromc::engine::replica::ReplicaTransport;
use tracing::debug;

/// Builds the initial configuration and the moves of one replica.
///
/// Replicas share the master seed for their moves but place their initial molecules from a
/// rank-specific stream. Moves are built from the replica's own definitions, so a pressure
/// override reaches its isobaric moves.
pub fn prepare_replica(config: &RunConfig, transport: Option<Box<dyn ReplicaTransport>>) -> Result<(Space, Vec<Move>)> {
    let seed = config.simulation.seed;
    let mut ctx = BuildContext::new(seed);
    if let Some(transport) = transport {
        ctx = ctx.with_transport(transport);
    }
    let mut space = config.system.build(seed.wrapping_add(ctx.rank() as u64))?;
    let settings = config.replica(ctx.rank());
    let moves = build_moves(&settings.moves, &mut space, &mut ctx)?;
    debug!(
        rank = ctx.rank(),
        particles = space.len(),
        moves = moves.len(),
        "Replica prepared."
    );
    Ok((space, moves))
}
