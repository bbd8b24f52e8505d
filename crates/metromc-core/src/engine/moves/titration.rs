//! Site titration, alone or coupled to the grand-canonical ion reservoir.
//!
//! [`SiteTitration`] flips the protonation state of one titratable site per trial and lets the
//! net charge of the system drift. In [`GrandCanonicalTitration`] half of the trials are plain
//! salt exchanges. The other half flip a site and, to keep the system neutral, insert or delete
//! one monovalent ion in the same step.

use super::grand_canonical::{
    GrandCanonicalSalt, SaltConfig, chemical_potential, insertion_energy, new_ions, removal_energy, sample_free,
};
use crate::core::energy::change_energy;
use crate::core::models::ids::SpeciesId;
use crate::core::models::particle::Particle;
use crate::core::models::species::TitrationProcess;
use crate::core::space::Space;
use crate::core::utils::average::Average;
use crate::engine::acceptance::AcceptanceTracker;
use crate::engine::config::ConfigError;
use crate::engine::error::TrialError;
use crate::engine::protocol::{EnergyChange, KernelReport, MoveKernel, Proposal, Trial};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

fn default_ph() -> f64 {
    7.0
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TitrationConfig {
    #[serde(flatten)]
    pub salt: SaltConfig,
    #[serde(default = "default_ph")]
    pub ph: f64,
}

impl Default for TitrationConfig {
    fn default() -> Self {
        Self {
            salt: SaltConfig::default(),
            ph: default_ph(),
        }
    }
}

/// Particles whose species takes part in a titration process of their molecule kind.
fn titratable_sites(space: &Space) -> Vec<usize> {
    space
        .groups()
        .iter()
        .filter_map(|g| space.topology().molecule(g.kind).map(|kind| (g, kind)))
        .filter(|(_, kind)| !kind.titration.is_empty())
        .flat_map(|(g, kind)| {
            g.range()
                .filter(move |&i| kind.is_titratable(space.current()[i].species))
        })
        .collect()
}

/// Pushes the net charge of every titratable molecule, keyed by molecule kind.
fn sample_charges(space: &Space, charges: &mut BTreeMap<String, Average>) {
    for group in space.groups() {
        if group.atomic {
            continue;
        }
        let Some(kind) = space.topology().molecule(group.kind) else {
            continue;
        };
        if kind.titration.is_empty() {
            continue;
        }
        let charge: f64 = space.current()[group.range()].iter().map(|p| p.charge).sum();
        charges.entry(kind.name.clone()).or_default().push(charge);
    }
}

/// A drawn site with one of its processes, or `None` if nothing can be titrated.
fn draw_site(trial: &mut Trial<'_>, sites: &[usize]) -> Option<(usize, usize, TitrationProcess, SpeciesId, SpeciesId)> {
    let site = trial.rng.pick(sites).copied()?;
    let space = &*trial.space;
    let old = space.current()[site].species;
    let group = space.group_of(site)?;
    let processes: Vec<TitrationProcess> = space
        .topology()
        .molecule(space.groups()[group].kind)
        .map(|kind| kind.titration.iter().filter(|p| p.matches(old)).copied().collect())
        .unwrap_or_default();
    let process = *trial.rng.pick(&processes)?;
    let new = process.swap(old)?;
    Some((site, group, process, old, new))
}

/// Writes species `new` onto the trial copy of `site` and registers the change.
fn swap_site(trial: &mut Trial<'_>, site: usize, group: usize, new: SpeciesId) -> bool {
    let Some(template) = trial.space.topology().species(new).cloned() else {
        return false;
    };
    trial.space.trial[site].set_species(new, &template);
    trial.change.add_particle(group, site);
    true
}

#[derive(Debug, Clone)]
enum IonExchange {
    Insert(Particle),
    Delete(usize),
}

#[derive(Debug, Clone)]
struct SiteTrial {
    site: usize,
    process: TitrationProcess,
    old: SpeciesId,
    new: SpeciesId,
    ion: SpeciesId,
    exchange: IonExchange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Salt,
    Site,
}

pub struct GrandCanonicalTitration {
    salt: GrandCanonicalSalt,
    ph: f64,
    branch: Branch,
    pending: Option<SiteTrial>,
    sites: AcceptanceTracker<usize>,
    charges: BTreeMap<String, Average>,
}

impl GrandCanonicalTitration {
    pub fn new(config: TitrationConfig, space: &mut Space) -> Result<Self, ConfigError> {
        Ok(Self {
            salt: GrandCanonicalSalt::new(config.salt, space)?,
            ph: config.ph,
            branch: Branch::Salt,
            pending: None,
            sites: AcceptanceTracker::new(),
            charges: BTreeMap::new(),
        })
    }

    fn monovalent_ions(&self, space: &Space) -> Vec<SpeciesId> {
        self.salt
            .pool()
            .ions()
            .filter(|&id| space.topology().species(id).is_some_and(|s| s.charge.abs() == 1.0))
            .collect()
    }

    fn propose_site(&mut self, trial: &mut Trial<'_>, sites: &[usize]) -> Result<Proposal, TrialError> {
        let ions = self.monovalent_ions(trial.space);
        let Some(ion) = trial.rng.pick(&ions).copied() else {
            return Ok(Proposal::Skipped);
        };
        let Some((site, group, process, old, new)) = draw_site(trial, sites) else {
            return Ok(Proposal::Skipped);
        };
        let space = &*trial.space;

        let protonating = new == process.protonated;
        let cation = space.topology().species(ion).is_some_and(|s| s.charge > 0.0);
        let exchange = if protonating != cation {
            match new_ions(space, ion, 1, trial.rng).pop() {
                Some(p) => IonExchange::Insert(p),
                None => return Ok(Proposal::Skipped),
            }
        } else {
            match sample_free(space, ion, 1, trial.rng).and_then(|picked| picked.first().copied()) {
                Some(index) if index != site => IonExchange::Delete(index),
                _ => {
                    debug!(site, "No counter-ion available to delete.");
                    return Ok(Proposal::Skipped);
                }
            }
        };

        if !swap_site(trial, site, group, new) {
            return Ok(Proposal::Skipped);
        }
        self.pending = Some(SiteTrial {
            site,
            process,
            old,
            new,
            ion,
            exchange,
        });
        Ok(Proposal::Proposed)
    }
}

impl MoveKernel for GrandCanonicalTitration {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let titrate = trial.rng.coin();
        let sites = titratable_sites(trial.space);
        if titrate && !sites.is_empty() {
            self.branch = Branch::Site;
            self.propose_site(trial, &sites)
        } else {
            self.branch = Branch::Salt;
            self.salt.propose(trial)
        }
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        if self.branch == Branch::Salt {
            return self.salt.energy_change(trial);
        }
        let Some(pending) = &self.pending else {
            return Ok(EnergyChange::new(0.0));
        };
        let space = &*trial.space;
        let volume = space.geometry().volume();
        let n = space.free_count(pending.ion) as f64;
        let mu = chemical_potential(space, pending.ion);
        let intrinsic =
            pending.process.intrinsic_energy(pending.new, self.ph) - pending.process.intrinsic_energy(pending.old, self.ph);
        let site = change_energy(trial.hamiltonian, space, trial.change);

        let (weight, ion) = match &pending.exchange {
            IonExchange::Insert(p) => {
                if space.geometry().collision(&p.position) {
                    return Ok(EnergyChange::infinite());
                }
                let energy = insertion_energy(trial.hamiltonian, space, space.trial(), std::slice::from_ref(p));
                (((n + 1.0) / volume).ln() - mu, energy)
            }
            IonExchange::Delete(index) => {
                let energy = removal_energy(trial.hamiltonian, space, space.trial(), &[*index]);
                ((volume / n).ln() + mu, -energy)
            }
        };
        Ok(EnergyChange::with_reported(weight + intrinsic + site + ion, site + ion))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        if self.branch == Branch::Salt {
            self.salt.accept(trial);
        } else if let Some(pending) = self.pending.take() {
            trial.space.accept_change(trial.change);
            match pending.exchange {
                IonExchange::Insert(p) => {
                    if let Some(g) = self.salt.pool().group(trial.space) {
                        trial.space.insert_into_group(g, vec![p]);
                    }
                }
                IonExchange::Delete(index) => trial.space.erase_particles(&[index]),
            }
            self.sites.accept(&pending.site, 0.0);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        if self.branch == Branch::Salt {
            self.salt.reject(trial);
        } else if let Some(pending) = self.pending.take() {
            trial.space.reject_change(trial.change);
            self.sites.reject(&pending.site);
        }
    }

    fn sample(&mut self, space: &Space) {
        self.salt.sample(space);
        sample_charges(space, &mut self.charges);
    }

    fn describe(&self) -> String {
        format!("titration with ion exchange at pH {}, {}", self.ph, self.salt.describe())
    }

    fn report(&self) -> KernelReport {
        let mut report = self.salt.report();
        for (name, charge) in &self.charges {
            report = report.value(&format!("charge {name}"), charge.mean());
        }
        let sites = self
            .sites
            .named()
            .into_iter()
            .map(|(site, record)| (format!("site {site}"), record))
            .collect();
        report.acceptance(sites)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SwapConfig {
    #[serde(default = "default_ph")]
    pub ph: f64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self { ph: default_ph() }
    }
}

#[derive(Debug, Clone)]
struct SwapTrial {
    site: usize,
    process: TitrationProcess,
    old: SpeciesId,
    new: SpeciesId,
}

/// Protonates or deprotonates one site per trial without touching any other particle.
pub struct SiteTitration {
    ph: f64,
    pending: Option<SwapTrial>,
    sites: AcceptanceTracker<usize>,
    charges: BTreeMap<String, Average>,
    /// Mean charge per molecule kind and site position inside the molecule.
    site_charges: BTreeMap<(String, usize), Average>,
}

impl SiteTitration {
    pub fn new(config: SwapConfig) -> Self {
        Self {
            ph: config.ph,
            pending: None,
            sites: AcceptanceTracker::new(),
            charges: BTreeMap::new(),
            site_charges: BTreeMap::new(),
        }
    }
}

impl MoveKernel for SiteTitration {
    fn propose(&mut self, trial: &mut Trial<'_>) -> Result<Proposal, TrialError> {
        let sites = titratable_sites(trial.space);
        let Some((site, group, process, old, new)) = draw_site(trial, &sites) else {
            return Ok(Proposal::Skipped);
        };
        if !swap_site(trial, site, group, new) {
            return Ok(Proposal::Skipped);
        }
        self.pending = Some(SwapTrial { site, process, old, new });
        Ok(Proposal::Proposed)
    }

    fn energy_change(&mut self, trial: &mut Trial<'_>) -> Result<EnergyChange, TrialError> {
        let Some(pending) = &self.pending else {
            return Ok(EnergyChange::new(0.0));
        };
        if trial.space.collides([pending.site]) {
            return Ok(EnergyChange::infinite());
        }
        let intrinsic =
            pending.process.intrinsic_energy(pending.new, self.ph) - pending.process.intrinsic_energy(pending.old, self.ph);
        let du = change_energy(trial.hamiltonian, trial.space, trial.change);
        Ok(EnergyChange::with_reported(intrinsic + du, du))
    }

    fn accept(&mut self, trial: &mut Trial<'_>) {
        trial.space.accept_change(trial.change);
        if let Some(pending) = self.pending.take() {
            self.sites.accept(&pending.site, 0.0);
        }
    }

    fn reject(&mut self, trial: &mut Trial<'_>) {
        trial.space.reject_change(trial.change);
        if let Some(pending) = self.pending.take() {
            self.sites.reject(&pending.site);
        }
    }

    fn sample(&mut self, space: &Space) {
        sample_charges(space, &mut self.charges);
        for site in titratable_sites(space) {
            let Some(group) = space.group_of(site).and_then(|g| space.group(g)) else {
                continue;
            };
            let name = space.topology().molecule_name(group.kind).to_string();
            self.site_charges
                .entry((name, site - group.start))
                .or_default()
                .push(space.current()[site].charge);
        }
    }

    fn describe(&self) -> String {
        format!("site titration at pH {}", self.ph)
    }

    fn report(&self) -> KernelReport {
        let mut report = KernelReport::default();
        for (name, charge) in &self.charges {
            report = report.value(&format!("charge {name}"), charge.mean());
        }
        for ((name, position), charge) in &self.site_charges {
            report = report.value(&format!("charge {name}:{position}"), charge.mean());
        }
        let sites = self
            .sites
            .named()
            .into_iter()
            .map(|(site, record)| (format!("site {site}"), record))
            .collect();
        report.acceptance(sites)
    }
}
