//! # Core Module
//!
//! Stateless building blocks consumed by the move engine.
//!
//! - **Molecular Representation** ([`models`]) - Particles, species, molecule kinds, groups and
//!   the change record describing what a trial touched
//! - **Configuration Store** ([`space`]) - The index-aligned current/trial particle arrays,
//!   container geometries and live per-species index trackers
//! - **Energy Oracle** ([`energy`]) - The `Hamiltonian` trait and the derived particle, group,
//!   system and change-restricted energy sums
//! - **File I/O** ([`io`]) - Loading a system description from TOML and placing its molecules
//! - **Utilities** ([`utils`]) - Running averages, rotation helpers and the seeded random source

pub mod energy;
pub mod io;
pub mod models;
pub mod space;
pub mod utils;
