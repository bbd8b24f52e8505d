//! Move definitions and the tag-to-factory registry that turns them into [`Move`]s.
//!
//! A definition names its move kind by tag and carries the parameters shared by every move
//! (title, run fraction, seed, targets, polarization). Every other key is handed to the factory,
//! which parses it into the kind's own configuration struct.

use super::config::{ConfigError, Target, TargetConfig};
use super::moves::atomic::{AtomicConfig, AtomicDisplacement, AtomicMode};
use super::moves::cluster::{Cluster, ClusterConfig};
use super::moves::conformation::ConformationSwap;
use super::moves::grand_canonical::{GrandCanonicalMolecule, GrandCanonicalSalt, MoleculeExchangeConfig, SaltConfig};
use super::moves::isobaric::{IsobaricConfig, IsobaricVolume};
use super::moves::polarize::{Polarize, PolarizeConfig};
use super::moves::polymer::{Reptation, ReptationConfig, SegmentConfig, SegmentRotation, SegmentRule};
use super::moves::rigid::{Nbody, RigidConfig, TranslateRotate, Twobody};
use super::moves::tempering::ParallelTempering;
use super::moves::titration::{GrandCanonicalTitration, SiteTitration, SwapConfig, TitrationConfig};
use super::protocol::{Move, MoveKernel};
use super::replica::ReplicaTransport;
use crate::core::space::Space;
use crate::core::space::geometry::Geometry;
use phf::{Map, phf_map};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

fn default_run_fraction() -> f64 {
    1.0
}

/// One `[[moves]]` entry of an input file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct MoveDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_run_fraction")]
    pub run_fraction: f64,
    /// Explicit seed for the move's random stream.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Wrap the move in self-consistent dipole relaxation.
    #[serde(default)]
    pub polarize: bool,
    #[serde(default)]
    pub polarization: Option<PolarizeConfig>,
    #[serde(flatten)]
    pub params: toml::Table,
}

impl MoveDefinition {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            title: None,
            run_fraction: default_run_fraction(),
            seed: None,
            targets: Vec::new(),
            polarize: false,
            polarization: None,
            params: toml::Table::new(),
        }
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.kind)
    }

    fn params<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        toml::Value::Table(self.params.clone())
            .try_into()
            .map_err(|e| ConfigError::invalid(&self.kind, e.to_string()))
    }

    fn no_params(&self) -> Result<(), ConfigError> {
        match self.params.keys().next() {
            Some(key) => Err(ConfigError::invalid(&self.kind, format!("unexpected key '{key}'"))),
            None => Ok(()),
        }
    }
}

/// State shared by all factories while one replica's moves are built.
pub struct BuildContext {
    seed: u64,
    rank: usize,
    built: u64,
    transport: Option<Box<dyn ReplicaTransport>>,
}

impl BuildContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rank: 0,
            built: 0,
            transport: None,
        }
    }

    /// Builds moves for replica `transport.rank()` of a tempering run.
    pub fn with_transport(mut self, transport: Box<dyn ReplicaTransport>) -> Self {
        self.rank = transport.rank();
        self.transport = Some(transport);
        self
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Seed for the next move. Synchronized moves draw the same stream on every replica.
    fn next_seed(&mut self, explicit: Option<u64>, synchronized: bool) -> u64 {
        let base = explicit.unwrap_or_else(|| {
            self.seed
                .wrapping_add(self.built.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        });
        self.built += 1;
        if synchronized {
            base
        } else {
            base ^ (self.rank as u64).wrapping_mul(0xD1B5_4A32_D192_ED03)
        }
    }
}

type Factory =
    fn(&MoveDefinition, &[Target], &mut BuildContext, &mut Space) -> Result<Box<dyn MoveKernel>, ConfigError>;

struct MoveEntry {
    factory: Factory,
    /// Seeded identically on every replica.
    synchronized: bool,
    /// May be wrapped in [`Polarize`].
    polarizable: bool,
    /// Consumes its targets itself instead of drawing one per call.
    owns_targets: bool,
}

const fn entry(factory: Factory) -> MoveEntry {
    MoveEntry {
        factory,
        synchronized: false,
        polarizable: true,
        owns_targets: false,
    }
}

static MOVES: Map<&'static str, MoveEntry> = phf_map! {
    "atom-translate" => entry(atom_translate),
    "atom-rotate" => entry(atom_rotate),
    "atom-translate-2d" => entry(atom_translate_2d),
    "mol-translate-rotate" => entry(translate_rotate),
    "mol-nbody" => MoveEntry { factory: nbody, synchronized: false, polarizable: true, owns_targets: true },
    "mol-twobody" => MoveEntry { factory: twobody, synchronized: false, polarizable: true, owns_targets: true },
    "conformation-swap" => entry(conformation_swap),
    "cluster" => entry(cluster),
    "crankshaft" => entry(crankshaft),
    "pivot" => entry(pivot),
    "reptate" => entry(reptate),
    "gc-salt" => MoveEntry { factory: salt, synchronized: false, polarizable: false, owns_targets: false },
    "gc-titration" => MoveEntry { factory: titration, synchronized: false, polarizable: false, owns_targets: false },
    "gc-molecule" => MoveEntry { factory: gc_molecule, synchronized: false, polarizable: false, owns_targets: false },
    "swap" => entry(swap),
    "isobaric" => entry(isobaric),
    "temper" => MoveEntry { factory: temper, synchronized: true, polarizable: false, owns_targets: false },
};

/// Every known move tag.
pub fn move_types() -> impl Iterator<Item = &'static str> {
    MOVES.keys().copied()
}

fn atom_translate(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: AtomicConfig = def.params()?;
    Ok(Box::new(AtomicDisplacement::new(AtomicMode::Translate, config)))
}

fn atom_rotate(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: AtomicConfig = def.params()?;
    Ok(Box::new(AtomicDisplacement::new(AtomicMode::Rotate, config)))
}

fn atom_translate_2d(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    space: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: AtomicConfig = def.params()?;
    let radius = match (config.radius, space.geometry()) {
        (Some(radius), _) => radius,
        (None, Geometry::Sphere { radius }) => *radius,
        (None, _) => return Err(ConfigError::MissingParameter("radius")),
    };
    if radius <= 0.0 {
        return Err(ConfigError::invalid("radius", "must be positive"));
    }
    Ok(Box::new(AtomicDisplacement::new(AtomicMode::Surface { radius }, config)))
}

fn translate_rotate(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: RigidConfig = def.params()?;
    Ok(Box::new(TranslateRotate::new(config)))
}

fn nbody(
    def: &MoveDefinition,
    targets: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    def.no_params()?;
    Ok(Box::new(Nbody::new(targets.to_vec())?))
}

fn twobody(
    def: &MoveDefinition,
    targets: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    def.no_params()?;
    Ok(Box::new(Twobody::new(targets.to_vec())?))
}

fn conformation_swap(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    def.no_params()?;
    Ok(Box::new(ConformationSwap::new()))
}

fn cluster(
    def: &MoveDefinition,
    targets: &[Target],
    _: &mut BuildContext,
    space: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::MissingParameter("targets"));
    }
    let config: ClusterConfig = def.params()?;
    Ok(Box::new(Cluster::new(config, space.topology())?))
}

fn crankshaft(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: SegmentConfig = def.params()?;
    Ok(Box::new(SegmentRotation::new(SegmentRule::CrankShaft, config)?))
}

fn pivot(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: SegmentConfig = def.params()?;
    Ok(Box::new(SegmentRotation::new(SegmentRule::Pivot, config)?))
}

fn reptate(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: ReptationConfig = def.params()?;
    Ok(Box::new(Reptation::new(config)))
}

fn salt(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    space: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: SaltConfig = def.params()?;
    Ok(Box::new(GrandCanonicalSalt::new(config, space)?))
}

fn titration(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    space: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: TitrationConfig = def.params()?;
    Ok(Box::new(GrandCanonicalTitration::new(config, space)?))
}

fn gc_molecule(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    space: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: MoleculeExchangeConfig = def.params()?;
    Ok(Box::new(GrandCanonicalMolecule::new(config, space)?))
}

fn swap(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: SwapConfig = def.params()?;
    Ok(Box::new(SiteTitration::new(config)))
}

fn isobaric(
    def: &MoveDefinition,
    _: &[Target],
    _: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    let config: IsobaricConfig = def.params()?;
    Ok(Box::new(IsobaricVolume::new(config)?))
}

fn temper(
    def: &MoveDefinition,
    _: &[Target],
    ctx: &mut BuildContext,
    _: &mut Space,
) -> Result<Box<dyn MoveKernel>, ConfigError> {
    def.no_params()?;
    let transport = ctx
        .transport
        .take()
        .ok_or_else(|| ConfigError::invalid(&def.kind, "needs a replica transport; run with more than one replica"))?;
    Ok(Box::new(ParallelTempering::new(transport)))
}

/// Builds one move. Factories may add empty groups to `space` they need later.
pub fn build_move(def: &MoveDefinition, space: &mut Space, ctx: &mut BuildContext) -> Result<Move, ConfigError> {
    let entry = MOVES
        .get(def.kind.as_str())
        .ok_or_else(|| ConfigError::UnknownMove(def.kind.clone()))?;
    let targets = def
        .targets
        .iter()
        .map(|t| Target::resolve(t, space.topology()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut kernel = (entry.factory)(def, &targets, ctx, space)?;
    if def.polarize {
        if !entry.polarizable {
            return Err(ConfigError::invalid(&def.kind, "cannot be combined with polarization"));
        }
        kernel = Box::new(Polarize::new(kernel, def.polarization.clone().unwrap_or_default()));
    }

    let seed = ctx.next_seed(def.seed, entry.synchronized);
    debug!(kind = %def.kind, seed, targets = targets.len(), "Built move.");
    let mv = Move::new(def.title(), kernel, seed).with_run_fraction(def.run_fraction)?;
    if entry.owns_targets {
        Ok(mv)
    } else {
        mv.with_targets(targets)
    }
}

pub fn build_moves(defs: &[MoveDefinition], space: &mut Space, ctx: &mut BuildContext) -> Result<Vec<Move>, ConfigError> {
    defs.iter().map(|def| build_move(def, space, ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::reference::Ideal;
    use crate::core::io::system::SystemDescription;
    use crate::core::space::tests::salt_and_dimers;
    use crate::engine::replica::ChannelTransport;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Moves {
        moves: Vec<MoveDefinition>,
    }

    fn parse(text: &str) -> Vec<MoveDefinition> {
        toml::from_str::<Moves>(text).unwrap().moves
    }

    #[test]
    fn every_single_replica_tag_builds_from_toml() {
        let defs = parse(
            r#"
            [[moves]]
            type = "atom-translate"
            dp = 0.5
            [[moves.targets]]
            molecule = "salt"
            per-atom = true

            [[moves]]
            type = "atom-rotate"
            dprot = 0.5

            [[moves]]
            type = "atom-translate-2d"
            dp = 0.5
            radius = 5.0

            [[moves]]
            type = "mol-translate-rotate"
            run-fraction = 0.5
            [[moves.targets]]
            molecule = "dimer"
            dp = 1.0
            dprot = 0.5

            [[moves]]
            type = "mol-nbody"
            [[moves.targets]]
            molecule = "dimer"
            dp = 0.5

            [[moves]]
            type = "mol-twobody"
            [[moves.targets]]
            molecule = "dimer"
            dp = 0.5
            [[moves.targets]]
            molecule = "dimer"

            [[moves]]
            type = "cluster"
            pool = "salt"
            [[moves.targets]]
            molecule = "dimer"
            threshold = 1.0
            dp = 0.5

            [[moves]]
            type = "conformation-swap"
            [[moves.targets]]
            molecule = "dimer"

            [[moves]]
            type = "crankshaft"
            dp = 1.0

            [[moves]]
            type = "pivot"
            dp = 1.0

            [[moves]]
            type = "reptate"

            [[moves]]
            type = "gc-salt"

            [[moves]]
            type = "gc-titration"
            ph = 7.0

            [[moves]]
            type = "swap"
            ph = 4.0

            [[moves]]
            type = "isobaric"
            dp = 0.05
            pressure = 10.0
            polarize = true
            "#,
        );
        let mut space = salt_and_dimers(20.0, 4, 2);
        let mut ctx = BuildContext::new(7);
        let mut moves = build_moves(&defs, &mut space, &mut ctx).unwrap();
        assert_eq!(moves.len(), 15);
        assert_eq!(moves[0].targets().len(), 1);
        assert!(moves[4].targets().is_empty());
        for mv in &mut moves {
            mv.perform(&mut space, &Ideal, 3).unwrap();
            mv.check_invariants(&space).unwrap();
        }
    }

    #[test]
    fn molecule_exchange_builds_for_kinds_with_an_activity() {
        let system: SystemDescription = toml::from_str(
            r#"
            geometry = { type = "cuboid", length = [30.0, 30.0, 30.0] }
            species = [{ name = "M", radius = 0.5 }]
            [[molecules]]
            name = "dimer"
            atoms = ["M", "M"]
            structure = [[-0.5, 0.0, 0.0], [0.5, 0.0, 0.0]]
            activity = 0.05
            count = 2
            "#,
        )
        .unwrap();
        let mut space = system.build(1).unwrap();
        let defs = parse(
            r#"
            [[moves]]
            type = "gc-molecule"
            molecules = ["dimer"]
            "#,
        );
        let mut mv = build_move(&defs[0], &mut space, &mut BuildContext::new(3)).unwrap();
        mv.perform(&mut space, &Ideal, 20).unwrap();
        mv.check_invariants(&space).unwrap();
        assert!(mv.statistics().details.values.contains_key("density dimer"));

        let mut plain = salt_and_dimers(20.0, 0, 1);
        assert!(matches!(
            build_move(&defs[0], &mut plain, &mut BuildContext::new(3)),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn surface_translation_needs_a_radius_outside_spheres() {
        let mut space = salt_and_dimers(20.0, 2, 0);
        assert_eq!(
            build_move(&MoveDefinition::new("atom-translate-2d"), &mut space, &mut BuildContext::new(1)).err(),
            Some(ConfigError::MissingParameter("radius"))
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut space = salt_and_dimers(20.0, 0, 1);
        let result = build_move(&MoveDefinition::new("teleport"), &mut space, &mut BuildContext::new(1));
        assert_eq!(result.err(), Some(ConfigError::UnknownMove("teleport".to_string())));
    }

    #[test]
    fn stray_parameters_are_reported() {
        let defs = parse(
            r#"
            [[moves]]
            type = "atom-translate"
            dq = 0.5
            "#,
        );
        let mut space = salt_and_dimers(20.0, 2, 0);
        assert!(matches!(
            build_move(&defs[0], &mut space, &mut BuildContext::new(1)),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn undefined_target_molecule_is_rejected() {
        let mut def = MoveDefinition::new("mol-translate-rotate");
        def.targets.push(TargetConfig::new("protein"));
        let mut space = salt_and_dimers(20.0, 0, 1);
        assert_eq!(
            build_move(&def, &mut space, &mut BuildContext::new(1)).err(),
            Some(ConfigError::UnknownMolecule("protein".to_string()))
        );
    }

    #[test]
    fn grand_canonical_moves_refuse_polarization() {
        let mut def = MoveDefinition::new("gc-salt");
        def.polarize = true;
        let mut space = salt_and_dimers(20.0, 0, 1);
        assert!(matches!(
            build_move(&def, &mut space, &mut BuildContext::new(1)),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn tempering_needs_a_transport() {
        let mut space = salt_and_dimers(20.0, 0, 1);
        let result = build_move(&MoveDefinition::new("temper"), &mut space, &mut BuildContext::new(1));
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn only_synchronized_moves_share_seeds_across_replicas() {
        let defs = vec![MoveDefinition::new("atom-translate"), MoveDefinition::new("temper")];
        let seeds: Vec<Vec<u64>> = ChannelTransport::mesh(2, None)
            .into_iter()
            .map(|transport| {
                let mut space = salt_and_dimers(20.0, 2, 0);
                let mut ctx = BuildContext::new(42).with_transport(Box::new(transport));
                build_moves(&defs, &mut space, &mut ctx)
                    .unwrap()
                    .iter()
                    .map(Move::seed)
                    .collect()
            })
            .collect();
        assert_ne!(seeds[0][0], seeds[1][0]);
        assert_eq!(seeds[0][1], seeds[1][1]);
    }
}
