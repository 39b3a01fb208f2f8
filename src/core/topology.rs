use crate::core::connectivity::Connectivity;
use crate::core::{Angle, Atom, Bond, BondOrder, ConfigurationError, Dihedral, Improper, Residue};

/// Atoms, residues and connectivity of a system.
///
/// Every index stored in residues and in the bond graph is kept inside
/// `[0, size())` by construction: the mutating operations rewrite or drop
/// whatever refers to removed atoms.
#[derive(Debug, Default, Clone)]
pub struct Topology {
    atoms: Vec<Atom>,
    residues: Vec<Residue>,
    connectivity: Connectivity,
}

impl Topology {
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of atoms.
    pub fn size(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn atom_mut(&mut self, index: usize) -> Option<&mut Atom> {
        self.atoms.get_mut(index)
    }

    pub fn add_atom(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Truncate or zero-pad the topology to `n` atoms. Shrinking drops every
    /// bond and residue that referenced a removed atom.
    pub fn resize(&mut self, n: usize) {
        if n < self.atoms.len() {
            self.connectivity.retain_below(n);
            self.residues.retain(|residue| {
                residue.atoms().last().map(|&last| last < n).unwrap_or(true)
            });
        }
        self.atoms.resize_with(n, Atom::default);
    }

    /// Remove the atom at `index`, shifting higher indices down. Bonds and
    /// residues referencing the atom are dropped.
    pub fn remove(&mut self, index: usize) -> Result<(), ConfigurationError> {
        self.check_index(index)?;
        self.atoms.remove(index);
        self.connectivity.remove_atom(index);
        self.residues.retain(|residue| !residue.contains(index));
        for residue in &mut self.residues {
            residue.shift_after_removal(index);
        }
        Ok(())
    }

    pub fn add_bond(
        &mut self,
        i: usize,
        j: usize,
        order: BondOrder,
    ) -> Result<(), ConfigurationError> {
        self.check_index(i)?;
        self.check_index(j)?;
        self.connectivity.add_bond(i, j, order)
    }

    pub fn remove_bond(&mut self, i: usize, j: usize) {
        self.connectivity.remove_bond(i, j);
    }

    pub fn bonds(&self) -> &[Bond] {
        self.connectivity.bonds()
    }

    pub fn bond_orders(&self) -> &[BondOrder] {
        self.connectivity.bond_orders()
    }

    pub fn bond_order(&self, i: usize, j: usize) -> Option<BondOrder> {
        self.connectivity.bond_order(i, j)
    }

    pub fn contains_bond(&self, i: usize, j: usize) -> bool {
        self.connectivity.contains_bond(i, j)
    }

    pub fn angles(&self) -> &[Angle] {
        self.connectivity.angles()
    }

    pub fn dihedrals(&self) -> &[Dihedral] {
        self.connectivity.dihedrals()
    }

    pub fn impropers(&self) -> &[Improper] {
        self.connectivity.impropers()
    }

    pub fn contains_angle(&self, angle: Angle) -> bool {
        self.connectivity.contains_angle(angle)
    }

    pub fn contains_dihedral(&self, dihedral: Dihedral) -> bool {
        self.connectivity.contains_dihedral(dihedral)
    }

    pub fn contains_improper(&self, improper: Improper) -> bool {
        self.connectivity.contains_improper(improper)
    }

    /// Add a residue. Its atom indices must be in range and not belong to
    /// any other residue.
    pub fn add_residue(&mut self, residue: Residue) -> Result<(), ConfigurationError> {
        for &index in residue.atoms() {
            self.check_index(index)?;
            if self.residue_for_atom(index).is_some() {
                return Err(ConfigurationError::AtomInResidue(index));
            }
        }
        self.residues.push(residue);
        Ok(())
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    /// The residue containing the atom at `index`, if any.
    pub fn residue_for_atom(&self, index: usize) -> Option<&Residue> {
        self.residues.iter().find(|residue| residue.contains(index))
    }

    fn check_index(&self, index: usize) -> Result<(), ConfigurationError> {
        if index >= self.atoms.len() {
            return Err(ConfigurationError::OutOfBounds {
                index,
                size: self.atoms.len(),
            });
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for Topology {
    type Output = Atom;
    fn index(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Topology {
        let mut topology = Topology::new();
        topology.add_atom(Atom::new("O"));
        topology.add_atom(Atom::new("H"));
        topology.add_atom(Atom::new("H"));
        topology.add_bond(0, 1, BondOrder::Single).unwrap();
        topology.add_bond(0, 2, BondOrder::Single).unwrap();
        topology
    }

    #[test]
    fn bonds_and_angles() {
        let topology = water();
        assert_eq!(topology.size(), 3);
        assert_eq!(topology.bonds().len(), 2);
        assert!(topology.contains_angle(Angle::new(1, 0, 2).unwrap()));
    }

    #[test]
    fn out_of_bounds_bond() {
        let mut topology = water();
        assert!(matches!(
            topology.add_bond(0, 3, BondOrder::Unknown),
            Err(ConfigurationError::OutOfBounds { index: 3, size: 3 })
        ));
    }

    #[test]
    fn residues() {
        let mut topology = water();
        let mut residue = Residue::with_id("SOL", 1);
        residue.add_atom(0);
        residue.add_atom(1);
        residue.add_atom(2);
        topology.add_residue(residue).unwrap();

        assert_eq!(topology.residue_for_atom(1).unwrap().name(), "SOL");
        assert!(topology.residue_for_atom(5).is_none());

        // Overlapping residues are rejected
        let mut other = Residue::new("BAD");
        other.add_atom(2);
        assert!(topology.add_residue(other).is_err());
    }

    #[test]
    fn remove_rewrites_indices() {
        let mut topology = water();
        topology.add_atom(Atom::new("N"));
        topology.add_bond(2, 3, BondOrder::Single).unwrap();

        topology.remove(1).unwrap();
        assert_eq!(topology.size(), 3);
        // Bond 0-2 became 0-1, bond 2-3 became 1-2
        assert!(topology.contains_bond(0, 1));
        assert!(topology.contains_bond(1, 2));
        assert_eq!(topology.bonds().len(), 2);
    }

    #[test]
    fn resize_drops_dependents() {
        let mut topology = water();
        let mut residue = Residue::new("SOL");
        residue.add_atom(0);
        residue.add_atom(2);
        topology.add_residue(residue).unwrap();

        topology.resize(2);
        assert_eq!(topology.size(), 2);
        assert_eq!(topology.bonds().len(), 1);
        assert!(topology.residues().is_empty());

        topology.resize(0);
        topology.resize(4);
        assert_eq!(topology.size(), 4);
        assert!(topology.bonds().is_empty());
        assert_eq!(topology[3].name(), "");
    }
}
