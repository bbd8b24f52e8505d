//! # metromc Core Library
//!
//! The trial-move engine of a Metropolis Monte Carlo molecular simulation. It proposes
//! perturbations to a particle configuration, evaluates the resulting energy change and applies
//! the Metropolis accept/reject decision, across canonical, isobaric, grand-canonical and
//! replica-exchange ensembles.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Particles, groups and the paired current/trial configuration
//!   store (`Space`), container geometries, the `Hamiltonian` energy oracle and the system
//!   description loader. Nothing in this layer knows what a move is.
//!
//! - **[`engine`]: The Logic Core.** The four-phase move protocol, acceptance bookkeeping, every
//!   move family (displacement, polymer, cluster, grand-canonical, isobaric, replica exchange),
//!   the move registry and the `Propagator` that dispatches one move per step.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the two layers below, such
//!   as running a macro/micro-step simulation with drift control and progress reporting.

pub mod core;
pub mod engine;
pub mod workflows;
