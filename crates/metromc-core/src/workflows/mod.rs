//! # Workflows Module
//!
//! High-level procedures that drive the engine from a prepared configuration to final
//! statistics.
//!
//! ## Overview
//!
//! A workflow owns the outer simulation loop. It builds the propagator from configured moves,
//! runs macro steps of micro steps, checks after every macro step that the tracked energy still
//! agrees with a full recomputation, and returns serializable statistics. Progress is reported
//! through a [`ProgressReporter`](crate::engine::progress::ProgressReporter) so that callers can
//! render it however they like.
//!
//! ## Architecture
//!
//! - **Simulation Workflow** ([`simulate`]) - Macro/micro-step Monte Carlo with drift control,
//!   usable for a single system or for one replica of a tempering run.

pub mod simulate;
