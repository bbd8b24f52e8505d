//! # File I/O
//!
//! Reading the declarative system description (container, species, molecule kinds and their
//! initial populations) and turning it into a populated [`Space`](crate::core::space::Space).

pub mod system;
