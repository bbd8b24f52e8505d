//! # Core Models Module
//!
//! Data structures describing what is being simulated.
//!
//! - [`ids`] - Slotmap keys for species and molecule kinds
//! - [`particle`] - A single interaction site with position, charge, orientation and dipoles
//! - [`species`] - The species and molecule-kind registry (`Topology`) including titration processes
//! - [`group`] - A contiguous index range forming one molecule or atomic pool
//! - [`change`] - The record of which groups and particles a trial move touched

pub mod change;
pub mod group;
pub mod ids;
pub mod particle;
pub mod species;
