use crate::core::{Property, PropertyMap};

/// A named group of atoms, referenced by index into a [Topology](super::Topology).
///
/// A residue does not own its atoms. The optional `id` is the semantic
/// residue number from the file, which is unrelated to the residue's
/// position in the topology.
#[derive(Debug, Default, Clone)]
pub struct Residue {
    name: String,
    id: Option<u64>,
    // Sorted ascending
    atoms: Vec<usize>,
    properties: PropertyMap,
}

impl Residue {
    pub fn new(name: impl Into<String>) -> Self {
        Residue {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(name: impl Into<String>, id: u64) -> Self {
        Residue {
            name: name.into(),
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn add_atom(&mut self, index: usize) {
        if let Err(pos) = self.atoms.binary_search(&index) {
            self.atoms.insert(pos, index);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.atoms.binary_search(&index).is_ok()
    }

    /// Atom indices in this residue, sorted ascending.
    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Shift every stored index above `removed` down by one. The caller
    /// guarantees `removed` itself is not in the residue.
    pub(crate) fn shift_after_removal(&mut self, removed: usize) {
        for index in &mut self.atoms {
            if *index > removed {
                *index -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_set_is_sorted_and_unique() {
        let mut residue = Residue::with_id("ALA", 3);
        residue.add_atom(7);
        residue.add_atom(2);
        residue.add_atom(7);
        assert_eq!(residue.atoms(), &[2, 7]);
        assert!(residue.contains(2));
        assert!(!residue.contains(3));
        assert_eq!(residue.id(), Some(3));
        assert_eq!(Residue::new("SOL").id(), None);
    }
}
