use std::cell::OnceCell;

use itertools::Itertools;

use crate::core::ConfigurationError;

/// A bond between atoms i and j, stored in canonical form with i < j.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bond([usize; 2]);

impl Bond {
    pub fn new(first: usize, second: usize) -> Result<Self, ConfigurationError> {
        if first == second {
            return Err(ConfigurationError::SelfBond);
        }
        Ok(Bond([first.min(second), first.max(second)]))
    }
}

impl std::ops::Index<usize> for Bond {
    type Output = usize;
    fn index(&self, i: usize) -> &usize {
        &self.0[i]
    }
}

/// Symbolic multiplicity of a chemical bond.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    #[default]
    Unknown,
    Single,
    Double,
    Triple,
    Quadruple,
    Quintuplet,
    Amide,
    Aromatic,
}

/// An angle between atoms i, j and k with j the apex, canonicalized so that
/// i < k.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Angle([usize; 3]);

impl Angle {
    pub fn new(first: usize, middle: usize, last: usize) -> Result<Self, ConfigurationError> {
        if first == middle || first == last || middle == last {
            return Err(ConfigurationError::DuplicateInAngle);
        }
        Ok(Angle([first.min(last), middle, first.max(last)]))
    }
}

impl std::ops::Index<usize> for Angle {
    type Output = usize;
    fn index(&self, i: usize) -> &usize {
        &self.0[i]
    }
}

/// A dihedral angle over the bonded chain i-j-k-m, canonicalized so that
/// max(i, j) < max(k, m).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dihedral([usize; 4]);

impl Dihedral {
    pub fn new(
        first: usize,
        second: usize,
        third: usize,
        fourth: usize,
    ) -> Result<Self, ConfigurationError> {
        if first == second || second == third || third == fourth {
            return Err(ConfigurationError::DuplicateInDihedral);
        }
        if first == third || second == fourth || first == fourth {
            return Err(ConfigurationError::DuplicateInDihedral);
        }
        if first.max(second) < third.max(fourth) {
            Ok(Dihedral([first, second, third, fourth]))
        } else {
            Ok(Dihedral([fourth, third, second, first]))
        }
    }
}

impl std::ops::Index<usize> for Dihedral {
    type Output = usize;
    fn index(&self, i: usize) -> &usize {
        &self.0[i]
    }
}

/// An improper dihedral with the center atom in the second slot and the
/// three leaves sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Improper([usize; 4]);

impl Improper {
    /// `center` is the atom bonded to the three others.
    pub fn new(
        first: usize,
        center: usize,
        third: usize,
        fourth: usize,
    ) -> Result<Self, ConfigurationError> {
        if first == center || third == center || fourth == center {
            return Err(ConfigurationError::DuplicateInImproper);
        }
        if first == third || first == fourth || third == fourth {
            return Err(ConfigurationError::DuplicateInImproper);
        }
        let mut leaves = [first, third, fourth];
        leaves.sort_unstable();
        Ok(Improper([leaves[0], center, leaves[1], leaves[2]]))
    }
}

impl std::ops::Index<usize> for Improper {
    type Output = usize;
    fn index(&self, i: usize) -> &usize {
        &self.0[i]
    }
}

#[derive(Debug, Clone, Default)]
struct Derived {
    angles: Vec<Angle>,
    dihedrals: Vec<Dihedral>,
    impropers: Vec<Improper>,
}

/// The bond graph of a system together with the angles, dihedrals and
/// impropers derived from it.
///
/// Bonds are the single source of truth. The derived sets are a pure
/// function of the bond set, cached on first access and invalidated by any
/// bond mutation.
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    // Sorted, with bond_orders parallel to bonds
    bonds: Vec<Bond>,
    bond_orders: Vec<BondOrder>,
    derived: OnceCell<Derived>,
}

impl Connectivity {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond_orders(&self) -> &[BondOrder] {
        &self.bond_orders
    }

    pub fn contains_bond(&self, i: usize, j: usize) -> bool {
        Bond::new(i, j)
            .map(|bond| self.bonds.binary_search(&bond).is_ok())
            .unwrap_or(false)
    }

    pub fn bond_order(&self, i: usize, j: usize) -> Option<BondOrder> {
        let bond = Bond::new(i, j).ok()?;
        let pos = self.bonds.binary_search(&bond).ok()?;
        Some(self.bond_orders[pos])
    }

    /// Add a bond between atoms `i` and `j`. Re-adding an existing bond with
    /// a known order updates the stored order.
    pub fn add_bond(&mut self, i: usize, j: usize, order: BondOrder) -> Result<(), ConfigurationError> {
        let bond = Bond::new(i, j)?;
        match self.bonds.binary_search(&bond) {
            Ok(pos) => {
                if order != BondOrder::Unknown {
                    self.bond_orders[pos] = order;
                }
            }
            Err(pos) => {
                self.bonds.insert(pos, bond);
                self.bond_orders.insert(pos, order);
                self.derived.take();
            }
        }
        Ok(())
    }

    /// Remove any bond between atoms `i` and `j`. Removing a bond that does
    /// not exist does nothing.
    pub fn remove_bond(&mut self, i: usize, j: usize) {
        let Ok(bond) = Bond::new(i, j) else {
            return;
        };
        if let Ok(pos) = self.bonds.binary_search(&bond) {
            self.bonds.remove(pos);
            self.bond_orders.remove(pos);
            self.derived.take();
        }
    }

    /// Remove atom `i` from the graph: bonds touching it are dropped and
    /// higher indices shift down by one.
    pub(crate) fn remove_atom(&mut self, i: usize) {
        let shift = |index: usize| if index > i { index - 1 } else { index };
        let mut bonds = Vec::with_capacity(self.bonds.len());
        let mut orders = Vec::with_capacity(self.bond_orders.len());
        for (bond, order) in self.bonds.iter().zip(&self.bond_orders) {
            if bond[0] == i || bond[1] == i {
                continue;
            }
            // The shift is monotonic, so sortedness is preserved
            bonds.push(Bond([shift(bond[0]), shift(bond[1])]));
            orders.push(*order);
        }
        self.bonds = bonds;
        self.bond_orders = orders;
        self.derived.take();
    }

    /// Drop every bond referencing an atom index >= `n`.
    pub(crate) fn retain_below(&mut self, n: usize) {
        let mut bonds = Vec::with_capacity(self.bonds.len());
        let mut orders = Vec::with_capacity(self.bond_orders.len());
        for (bond, order) in self.bonds.iter().zip(&self.bond_orders) {
            if bond[1] < n {
                bonds.push(*bond);
                orders.push(*order);
            }
        }
        self.bonds = bonds;
        self.bond_orders = orders;
        self.derived.take();
    }

    pub fn angles(&self) -> &[Angle] {
        &self.derived().angles
    }

    pub fn dihedrals(&self) -> &[Dihedral] {
        &self.derived().dihedrals
    }

    pub fn impropers(&self) -> &[Improper] {
        &self.derived().impropers
    }

    pub fn contains_angle(&self, angle: Angle) -> bool {
        self.derived().angles.binary_search(&angle).is_ok()
    }

    pub fn contains_dihedral(&self, dihedral: Dihedral) -> bool {
        self.derived().dihedrals.binary_search(&dihedral).is_ok()
    }

    pub fn contains_improper(&self, improper: Improper) -> bool {
        self.derived().impropers.binary_search(&improper).is_ok()
    }

    fn derived(&self) -> &Derived {
        self.derived.get_or_init(|| Self::recalculate(&self.bonds))
    }

    fn recalculate(bonds: &[Bond]) -> Derived {
        // Neighbor lists, indexed by atom
        let natoms = bonds.iter().map(|b| b[1] + 1).max().unwrap_or(0);
        let mut neighbors = vec![Vec::new(); natoms];
        for bond in bonds {
            neighbors[bond[0]].push(bond[1]);
            neighbors[bond[1]].push(bond[0]);
        }

        let mut angles = Vec::new();
        for (center, neibs) in neighbors.iter().enumerate() {
            for (&a, &c) in neibs.iter().tuple_combinations() {
                // Neighbors of the same center are always distinct
                angles.push(Angle([a.min(c), center, a.max(c)]));
            }
        }
        angles.sort_unstable();
        angles.dedup();

        let mut dihedrals = Vec::new();
        for bond in bonds {
            let (j, k) = (bond[0], bond[1]);
            for &i in &neighbors[j] {
                if i == k {
                    continue;
                }
                for &m in &neighbors[k] {
                    if m == j || m == i {
                        continue;
                    }
                    if let Ok(dihedral) = Dihedral::new(i, j, k, m) {
                        dihedrals.push(dihedral);
                    }
                }
            }
        }
        dihedrals.sort_unstable();
        dihedrals.dedup();

        let mut impropers = Vec::new();
        for (center, neibs) in neighbors.iter().enumerate() {
            if neibs.len() < 3 {
                continue;
            }
            for (&i, &k, &m) in neibs.iter().tuple_combinations() {
                if let Ok(improper) = Improper::new(i, center, k, m) {
                    impropers.push(improper);
                }
            }
        }
        impropers.sort_unstable();
        impropers.dedup();

        Derived {
            angles,
            dihedrals,
            impropers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms() {
        assert_eq!(Bond::new(5, 2).unwrap(), Bond::new(2, 5).unwrap());
        assert!(Bond::new(3, 3).is_err());

        let angle = Angle::new(8, 1, 3).unwrap();
        assert_eq!((angle[0], angle[1], angle[2]), (3, 1, 8));

        let d1 = Dihedral::new(0, 1, 2, 3).unwrap();
        let d2 = Dihedral::new(3, 2, 1, 0).unwrap();
        assert_eq!(d1, d2);

        let i1 = Improper::new(7, 1, 3, 5).unwrap();
        let i2 = Improper::new(5, 1, 7, 3).unwrap();
        assert_eq!(i1, i2);
        assert_eq!((i1[0], i1[1], i1[2], i1[3]), (3, 1, 5, 7));
    }

    #[test]
    fn derived_sets() {
        let mut connectivity = Connectivity::new();
        // Butane-like chain 0-1-2-3
        connectivity.add_bond(0, 1, BondOrder::Single).unwrap();
        connectivity.add_bond(1, 2, BondOrder::Single).unwrap();
        connectivity.add_bond(2, 3, BondOrder::Single).unwrap();

        assert_eq!(connectivity.angles().len(), 2);
        assert!(connectivity.contains_angle(Angle::new(0, 1, 2).unwrap()));
        assert!(connectivity.contains_angle(Angle::new(1, 2, 3).unwrap()));

        assert_eq!(connectivity.dihedrals(), &[Dihedral::new(0, 1, 2, 3).unwrap()]);
        assert!(connectivity.impropers().is_empty());

        // A center with three neighbors makes an improper
        connectivity.add_bond(1, 4, BondOrder::Single).unwrap();
        assert_eq!(connectivity.impropers().len(), 1);
        assert!(connectivity.contains_improper(Improper::new(0, 1, 2, 4).unwrap()));

        connectivity.remove_bond(1, 4);
        assert!(connectivity.impropers().is_empty());
        assert_eq!(connectivity.dihedrals().len(), 1);
    }

    #[test]
    fn bond_orders_follow_bonds() {
        let mut connectivity = Connectivity::new();
        connectivity.add_bond(2, 3, BondOrder::Triple).unwrap();
        connectivity.add_bond(0, 2, BondOrder::Single).unwrap();
        assert_eq!(connectivity.bond_order(3, 2), Some(BondOrder::Triple));
        assert_eq!(connectivity.bond_order(0, 2), Some(BondOrder::Single));
        assert_eq!(connectivity.bond_order(0, 3), None);

        // Re-adding with a known order updates it
        connectivity.add_bond(2, 3, BondOrder::Double).unwrap();
        assert_eq!(connectivity.bond_order(2, 3), Some(BondOrder::Double));
        assert_eq!(connectivity.bonds().len(), 2);
    }

    #[test]
    fn atom_removal_shifts_indices() {
        let mut connectivity = Connectivity::new();
        connectivity.add_bond(0, 1, BondOrder::Single).unwrap();
        connectivity.add_bond(1, 2, BondOrder::Double).unwrap();
        connectivity.add_bond(3, 4, BondOrder::Triple).unwrap();

        connectivity.remove_atom(1);
        assert_eq!(connectivity.bonds(), &[Bond::new(2, 3).unwrap()]);
        assert_eq!(connectivity.bond_orders(), &[BondOrder::Triple]);
    }
}
