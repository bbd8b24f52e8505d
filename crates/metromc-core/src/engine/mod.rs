//! # Engine Module
//!
//! The trial-move engine: the Metropolis state machine every move runs through, the move
//! kernels themselves, and the dispatcher that composes configured moves into a propagator.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]) - The propose, evaluate, decide and commit cycle driving a
//!   [`MoveKernel`](protocol::MoveKernel), with run-fraction gating and molecule targeting
//! - **Moves** ([`moves`]) - Displacement, polymer, cluster, grand-canonical, isobaric, replica
//!   exchange and polarization kernels
//! - **Statistics** ([`acceptance`]) - Per-key acceptance ratios and mean-squared displacements
//! - **Replica Transport** ([`replica`]) - Configuration exchange between paired replicas
//! - **Registry** ([`registry`]) - Move tags mapped to factories building moves from TOML
//! - **Propagator** ([`propagator`]) - Uniform per-step selection among the configured moves
//! - **Configuration** ([`config`]), **Progress** ([`progress`]) and **Errors** ([`error`])
//!
//! Only one trial is ever in flight per space. Moves borrow the space mutably for exactly one
//! cycle and always leave the current and trial configurations synchronized on return.

pub mod acceptance;
pub mod config;
pub mod error;
pub mod moves;
pub mod progress;
pub mod propagator;
pub mod protocol;
pub mod registry;
pub mod replica;
