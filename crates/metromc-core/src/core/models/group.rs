use super::ids::MoleculeId;
use nalgebra::Point3;
use rand::Rng;
use std::ops::Range;

/// A contiguous block of particles forming one molecule or one atomic pool.
///
/// A group never owns particles. It is an index range `[start, start + len)` into the paired
/// current/trial arrays of a [`Space`](crate::core::space::Space), together with the mass
/// centers of both configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub kind: MoleculeId,
    pub start: usize,
    pub len: usize,
    pub atomic: bool,
    pub cm: Point3<f64>,
    pub cm_trial: Point3<f64>,
}

impl Group {
    pub fn new(kind: MoleculeId, start: usize, len: usize, atomic: bool) -> Self {
        Self {
            kind,
            start,
            len,
            atomic,
            cm: Point3::origin(),
            cm_trial: Point3::origin(),
        }
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// One past the last index of the group.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    pub fn random_index(&self, rng: &mut impl Rng) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(rng.gen_range(self.range()))
        }
    }

    /// First and last index, or `None` for an empty group.
    pub fn ends(&self) -> Option<(usize, usize)> {
        (!self.is_empty()).then(|| (self.start, self.end() - 1))
    }
}
