use std::collections::BTreeMap;

/// How a single group was touched by a trial move.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupChange {
    /// The whole group moved as a rigid body; its internal energy is unchanged.
    Rigid,
    /// Only the listed particles (absolute indices) moved.
    Particles(Vec<usize>),
}

/// Record of everything a trial move touched.
///
/// Created empty at the start of a cycle, filled during the proposal, read by the energy
/// evaluator and cleared once the move is committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub groups: BTreeMap<usize, GroupChange>,
    pub geometry_changed: bool,
    pub volume_delta: f64,
}

impl Change {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && !self.geometry_changed && self.volume_delta == 0.0
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.geometry_changed = false;
        self.volume_delta = 0.0;
    }

    pub fn add_rigid(&mut self, group: usize) {
        self.groups.insert(group, GroupChange::Rigid);
    }

    pub fn add_particle(&mut self, group: usize, index: usize) {
        self.add_particles(group, std::iter::once(index));
    }

    /// Registers moved particles of `group`. A group already marked rigid stays rigid.
    pub fn add_particles(&mut self, group: usize, indices: impl IntoIterator<Item = usize>) {
        let entry = self
            .groups
            .entry(group)
            .or_insert_with(|| GroupChange::Particles(Vec::new()));
        if let GroupChange::Particles(list) = entry {
            for i in indices {
                if !list.contains(&i) {
                    list.push(i);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_change_is_empty_and_clear_resets_everything() {
        let mut change = Change::new();
        assert!(change.is_empty());

        change.add_rigid(1);
        change.geometry_changed = true;
        change.volume_delta = 3.0;
        assert!(!change.is_empty());

        change.clear();
        assert!(change.is_empty());
    }

    #[test]
    fn add_particles_deduplicates_indices() {
        let mut change = Change::new();
        change.add_particle(0, 5);
        change.add_particles(0, [5, 6, 7]);
        assert_eq!(
            change.groups.get(&0),
            Some(&GroupChange::Particles(vec![5, 6, 7]))
        );
    }

    #[test]
    fn rigid_group_absorbs_particle_updates() {
        let mut change = Change::new();
        change.add_rigid(2);
        change.add_particle(2, 9);
        assert_eq!(change.groups.get(&2), Some(&GroupChange::Rigid));
    }
}
