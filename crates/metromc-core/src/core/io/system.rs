use crate::core::models::ids::SpeciesId;
use crate::core::models::particle::Particle;
use crate::core::models::species::{MoleculeKind, Species, TitrationProcess, Topology};
use crate::core::space::Space;
use crate::core::space::geometry::Geometry;
use crate::core::utils::geometry::random_orientation;
use crate::core::utils::random::RandomSource;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

const MAX_PLACEMENT_ATTEMPTS: usize = 10_000;

#[derive(Debug, Error)]
pub enum SystemLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Molecule '{molecule}' references undefined species '{species}'")]
    UnknownSpecies { molecule: String, species: String },
    #[error("Invalid molecule '{molecule}': {reason}")]
    InvalidMolecule { molecule: String, reason: String },
    #[error("Could not place molecule '{molecule}' without overlap after {attempts} attempts")]
    Placement { molecule: String, attempts: usize },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum GeometryDescription {
    Cuboid { length: [f64; 3] },
    Sphere { radius: f64 },
}

impl From<&GeometryDescription> for Geometry {
    fn from(desc: &GeometryDescription) -> Self {
        match desc {
            GeometryDescription::Cuboid { length } => Geometry::Cuboid {
                len: Vector3::from(*length),
            },
            GeometryDescription::Sphere { radius } => Geometry::Sphere { radius: *radius },
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SpeciesDescription {
    pub name: String,
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub radius: f64,
    #[serde(default)]
    pub dp: f64,
    #[serde(default)]
    pub dprot: f64,
    #[serde(default)]
    pub activity: f64,
    #[serde(default)]
    pub polarizability: f64,
    #[serde(default)]
    pub dipole: [f64; 3],
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TitrationDescription {
    pub protonated: String,
    pub deprotonated: String,
    pub pka: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MoleculeDescription {
    pub name: String,
    #[serde(default)]
    pub atomic: bool,
    pub atoms: Vec<String>,
    /// Coordinates relative to the mass center, required for molecular kinds.
    #[serde(default)]
    pub structure: Vec<[f64; 3]>,
    /// Alternative structures, sampled by conformation swaps and grand-canonical insertion.
    #[serde(default)]
    pub conformations: Vec<Vec<[f64; 3]>>,
    #[serde(default)]
    pub conformation_weights: Vec<f64>,
    /// Reservoir activity of whole molecules in mol/l.
    #[serde(default)]
    pub activity: f64,
    /// Initial number of molecules, or of atom-list repeats for atomic kinds.
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub titration: Vec<TitrationDescription>,
}

/// Declarative description of a simulation system.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SystemDescription {
    pub geometry: GeometryDescription,
    #[serde(default)]
    pub species: Vec<SpeciesDescription>,
    #[serde(default)]
    pub molecules: Vec<MoleculeDescription>,
}

impl SystemDescription {
    pub fn from_file(path: &Path) -> Result<Self, SystemLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| SystemLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| SystemLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Resolves all names into a [`Topology`].
    pub fn topology(&self) -> Result<Topology, SystemLoadError> {
        let mut topology = Topology::new();
        for s in &self.species {
            topology.add_species(Species {
                name: s.name.clone(),
                charge: s.charge,
                radius: s.radius,
                dp: s.dp,
                dprot: s.dprot,
                activity: s.activity,
                polarizability: s.polarizability,
                dipole: Vector3::from(s.dipole),
            });
        }

        for m in &self.molecules {
            let resolve = |name: &str| -> Result<SpeciesId, SystemLoadError> {
                topology
                    .species_by_name(name)
                    .ok_or_else(|| SystemLoadError::UnknownSpecies {
                        molecule: m.name.clone(),
                        species: name.to_string(),
                    })
            };
            let atoms = m
                .atoms
                .iter()
                .map(|a| resolve(a))
                .collect::<Result<Vec<_>, _>>()?;
            let titration = m
                .titration
                .iter()
                .map(|t| {
                    Ok(TitrationProcess {
                        protonated: resolve(&t.protonated)?,
                        deprotonated: resolve(&t.deprotonated)?,
                        pka: t.pka,
                    })
                })
                .collect::<Result<Vec<_>, SystemLoadError>>()?;

            let invalid = |reason: String| SystemLoadError::InvalidMolecule {
                molecule: m.name.clone(),
                reason,
            };
            if !m.atomic {
                if let Some(bad) = std::iter::once(&m.structure)
                    .chain(&m.conformations)
                    .find(|c| c.len() != atoms.len())
                {
                    return Err(invalid(format!(
                        "{} atoms but {} structure coordinates",
                        atoms.len(),
                        bad.len()
                    )));
                }
            }
            let library = m.conformations.len() + 1;
            let weights = &m.conformation_weights;
            if !weights.is_empty()
                && (weights.len() != library
                    || weights.iter().any(|&w| !(w >= 0.0))
                    || weights.iter().sum::<f64>() <= 0.0)
            {
                return Err(invalid(format!(
                    "expected {library} non-negative conformation weights, not all zero"
                )));
            }

            let mut kind = if m.atomic {
                MoleculeKind::atomic(&m.name, atoms)
            } else {
                let mut kind = MoleculeKind::molecular(&m.name, atoms, centered(&m.structure));
                kind.conformations = m.conformations.iter().map(|c| centered(c)).collect();
                kind.conformation_weights = m.conformation_weights.clone();
                kind
            };
            kind.activity = m.activity;
            kind.titration = titration;
            topology.add_molecule(kind);
        }
        Ok(topology)
    }

    /// Builds a [`Space`] and places every initial molecule at random without overlap.
    pub fn build(&self, seed: u64) -> Result<Space, SystemLoadError> {
        let topology = self.topology()?;
        let mut space = Space::new(topology, Geometry::from(&self.geometry));
        let mut rng = RandomSource::from_seed(seed);

        for m in &self.molecules {
            let Some(kind_id) = space.topology().molecule_by_name(&m.name) else {
                continue;
            };
            let kind = space.topology().molecule(kind_id).cloned().ok_or_else(|| {
                SystemLoadError::InvalidMolecule {
                    molecule: m.name.clone(),
                    reason: "not registered".to_string(),
                }
            })?;
            let templates: Vec<(SpeciesId, Species)> = kind
                .atoms
                .iter()
                .filter_map(|&id| space.topology().species(id).map(|s| (id, s.clone())))
                .collect();

            if kind.atomic {
                let mut particles: Vec<Particle> = Vec::with_capacity(m.count * templates.len());
                for _ in 0..m.count {
                    for (id, template) in &templates {
                        let position = place(&space, &particles, &mut rng, &m.name, |rng| {
                            vec![space.geometry().random_position(rng)]
                        }, &[template.radius])?;
                        particles.push(Particle::from_species(*id, template, position[0]));
                    }
                }
                space.add_group(kind_id, particles);
            } else {
                let radii: Vec<f64> = templates.iter().map(|(_, s)| s.radius).collect();
                for _ in 0..m.count {
                    let positions = place(&space, &[], &mut rng, &m.name, |rng| {
                        let cm = space.geometry().random_position(rng);
                        let q = random_orientation(rng);
                        kind.structure.iter().map(|r| cm + q * r).collect()
                    }, &radii)?;
                    let particles = templates
                        .iter()
                        .zip(positions)
                        .map(|((id, template), position)| Particle::from_species(*id, template, position))
                        .collect();
                    space.add_group(kind_id, particles);
                }
            }
            debug!(molecule = %m.name, count = m.count, "Placed molecules.");
        }

        info!(
            particles = space.len(),
            groups = space.groups().len(),
            volume = space.geometry().volume(),
            "System built."
        );
        Ok(space)
    }
}

/// Coordinates shifted so that their centroid is the origin.
fn centered(coordinates: &[[f64; 3]]) -> Vec<Vector3<f64>> {
    let points: Vec<Vector3<f64>> = coordinates.iter().map(|&c| Vector3::from(c)).collect();
    let center = points.iter().sum::<Vector3<f64>>() / points.len().max(1) as f64;
    points.into_iter().map(|c| c - center).collect()
}

/// Draws candidate positions until none overlaps the placed particles or the container wall.
fn place<F>(
    space: &Space,
    pending: &[Particle],
    rng: &mut RandomSource,
    molecule: &str,
    mut propose: F,
    radii: &[f64],
) -> Result<Vec<Point3<f64>>, SystemLoadError>
where
    F: FnMut(&mut RandomSource) -> Vec<Point3<f64>>,
{
    let geometry = space.geometry();
    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let mut candidate = propose(rng);
        candidate.iter_mut().for_each(|p| geometry.boundary(p));
        let clear = candidate.iter().zip(radii).all(|(p, &r)| {
            !geometry.collision(p)
                && space.current().iter().chain(pending).all(|q| {
                    let contact = r + q.radius;
                    geometry.sqdist(p, &q.position) >= contact * contact
                })
        });
        if clear {
            return Ok(candidate);
        }
    }
    Err(SystemLoadError::Placement {
        molecule: molecule.to_string(),
        attempts: MAX_PLACEMENT_ATTEMPTS,
    })
}
