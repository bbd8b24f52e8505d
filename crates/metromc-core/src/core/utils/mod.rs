pub mod average;
pub mod geometry;
pub mod random;
