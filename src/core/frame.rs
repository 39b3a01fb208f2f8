use crate::core::{
    Atom, BondOrder, ConfigurationError, Property, PropertyMap, Topology, UnitCell, Vector3D,
};

/// One snapshot of a simulated system: positions, optional velocities,
/// topology, unit cell and free-form properties.
///
/// Positions are in angstroms and velocities in angstroms/picosecond,
/// whatever the on-disk format uses. The number of atoms in the topology,
/// the positions and the velocities (when present) always agree.
#[derive(Debug, Default, Clone)]
pub struct Frame {
    step: usize,
    positions: Vec<Vector3D>,
    velocities: Option<Vec<Vector3D>>,
    topology: Topology,
    cell: UnitCell,
    properties: PropertyMap,
}

impl Frame {
    /// An empty frame: no atoms, no velocities, infinite cell.
    pub fn new() -> Self {
        Default::default()
    }

    /// Frame holding the atoms of `topology` with zeroed positions.
    pub fn with_topology(topology: Topology, cell: UnitCell) -> Self {
        Frame {
            positions: vec![Vector3D::zeros(); topology.size()],
            topology,
            cell,
            ..Default::default()
        }
    }

    /// Number of atoms.
    pub fn size(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Simulation step this frame was read from, set by the trajectory.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    pub fn positions(&self) -> &[Vector3D] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Vector3D] {
        &mut self.positions
    }

    pub fn velocities(&self) -> Option<&[Vector3D]> {
        self.velocities.as_deref()
    }

    pub fn velocities_mut(&mut self) -> Option<&mut [Vector3D]> {
        self.velocities.as_deref_mut()
    }

    /// Add zeroed velocity storage if the frame has none.
    pub fn add_velocities(&mut self) {
        if self.velocities.is_none() {
            self.velocities = Some(vec![Vector3D::zeros(); self.positions.len()]);
        }
    }

    pub fn has_velocities(&self) -> bool {
        self.velocities.is_some()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable access to the topology. Changing the number of atoms through
    /// this reference breaks the size invariant; use [Frame::add_atom],
    /// [Frame::remove] or [Frame::resize] for that.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Replace the topology. Its size must match the frame.
    pub fn set_topology(&mut self, topology: Topology) -> Result<(), ConfigurationError> {
        if topology.size() != self.size() {
            return Err(ConfigurationError::TopologySize {
                new: topology.size(),
                frame: self.size(),
            });
        }
        self.topology = topology;
        Ok(())
    }

    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    pub fn set_cell(&mut self, cell: UnitCell) {
        self.cell = cell;
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Resize to `n` atoms. Positions, velocities and topology are truncated
    /// or zero-padded together.
    pub fn resize(&mut self, n: usize) {
        self.positions.resize(n, Vector3D::zeros());
        if let Some(velocities) = &mut self.velocities {
            velocities.resize(n, Vector3D::zeros());
        }
        self.topology.resize(n);
    }

    /// Append an atom. The velocity is only stored when the frame has
    /// velocity data, defaulting to zero when omitted.
    pub fn add_atom(&mut self, atom: Atom, position: Vector3D, velocity: Option<Vector3D>) {
        self.topology.add_atom(atom);
        self.positions.push(position);
        if let Some(velocities) = &mut self.velocities {
            velocities.push(velocity.unwrap_or_else(Vector3D::zeros));
        }
    }

    /// Remove the atom at `index`, shifting higher indices down.
    pub fn remove(&mut self, index: usize) -> Result<(), ConfigurationError> {
        self.topology.remove(index)?;
        self.positions.remove(index);
        if let Some(velocities) = &mut self.velocities {
            velocities.remove(index);
        }
        Ok(())
    }

    /// Add a bond to the topology.
    pub fn add_bond(
        &mut self,
        i: usize,
        j: usize,
        order: BondOrder,
    ) -> Result<(), ConfigurationError> {
        self.topology.add_bond(i, j, order)
    }

    /// Distance between atoms `i` and `j` in angstroms, under the minimum
    /// image convention.
    pub fn distance(&self, i: usize, j: usize) -> Result<f64, ConfigurationError> {
        let ri = self.position(i)?;
        let rj = self.position(j)?;
        Ok(self.cell.wrap(&(ri - rj)).norm())
    }

    /// Angle at atom `j` formed by atoms `i`, `j`, `k`, in radians.
    pub fn angle(&self, i: usize, j: usize, k: usize) -> Result<f64, ConfigurationError> {
        let ri = self.position(i)?;
        let rj = self.position(j)?;
        let rk = self.position(k)?;
        let u = self.cell.wrap(&(ri - rj));
        let v = self.cell.wrap(&(rk - rj));
        Ok(u.angle(&v))
    }

    /// Dihedral angle around the bond `j`-`k` in the chain `i-j-k-m`, in
    /// radians.
    pub fn dihedral(
        &self,
        i: usize,
        j: usize,
        k: usize,
        m: usize,
    ) -> Result<f64, ConfigurationError> {
        let b1 = self.cell.wrap(&(self.position(j)? - self.position(i)?));
        let b2 = self.cell.wrap(&(self.position(k)? - self.position(j)?));
        let b3 = self.cell.wrap(&(self.position(m)? - self.position(k)?));
        let n1 = b1.cross(&b2);
        let n2 = b2.cross(&b3);
        Ok(n1.cross(&n2).dot(&b2.normalize()).atan2(n1.dot(&n2)))
    }

    /// Signed out-of-plane distance of atom `j` from the plane through
    /// atoms `i`, `k`, `m`, in angstroms. `j` is the center of the improper
    /// dihedral `(i, j, k, m)`.
    pub fn out_of_plane(
        &self,
        i: usize,
        j: usize,
        k: usize,
        m: usize,
    ) -> Result<f64, ConfigurationError> {
        let rji = self.cell.wrap(&(self.position(j)? - self.position(i)?));
        let rik = self.cell.wrap(&(self.position(k)? - self.position(i)?));
        let rim = self.cell.wrap(&(self.position(m)? - self.position(i)?));
        let normal = rik.cross(&rim);
        let norm = normal.norm();
        if norm < 1e-12 {
            // Degenerate plane, all distances are equivalent
            return Ok(rji.norm());
        }
        Ok(rji.dot(&normal) / norm)
    }

    /// Guess the bonds from interatomic distances and Van der Waals radii,
    /// then rebuild angles, dihedrals and impropers from them.
    ///
    /// Atoms `i` and `j` are bonded when their minimum-image distance is
    /// below `0.833 * (r_i + r_j)` and above `0.5 * min(r_i, r_j)`.
    pub fn guess_bonds(&mut self) -> Result<(), ConfigurationError> {
        let radii = self
            .topology
            .atoms()
            .iter()
            .map(|atom| {
                atom.vdw_radius().ok_or_else(|| {
                    ConfigurationError::MissingVdwRadius(atom.name().to_owned())
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        for i in 0..self.size() {
            for j in (i + 1)..self.size() {
                let d = self.distance(i, j)?;
                if d < 0.833 * (radii[i] + radii[j]) && d > 0.5 * radii[i].min(radii[j]) {
                    self.topology.add_bond(i, j, BondOrder::Single)?;
                }
            }
        }
        Ok(())
    }

    fn position(&self, index: usize) -> Result<&Vector3D, ConfigurationError> {
        self.positions
            .get(index)
            .ok_or(ConfigurationError::OutOfBounds {
                index,
                size: self.positions.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_stay_consistent() {
        let mut frame = Frame::new();
        assert_eq!(frame.size(), 0);
        frame.add_velocities();

        frame.add_atom(Atom::new("O"), Vector3D::new(1.0, 0.0, 0.0), None);
        frame.add_atom(
            Atom::new("H"),
            Vector3D::new(2.0, 0.0, 0.0),
            Some(Vector3D::new(0.1, 0.0, 0.0)),
        );
        assert_eq!(frame.size(), 2);
        assert_eq!(frame.topology().size(), 2);
        assert_eq!(frame.velocities().unwrap().len(), 2);
        assert_eq!(frame.velocities().unwrap()[1][0], 0.1);

        frame.resize(5);
        assert_eq!(frame.positions().len(), 5);
        assert_eq!(frame.velocities().unwrap().len(), 5);
        assert_eq!(frame.topology().size(), 5);

        frame.remove(0).unwrap();
        assert_eq!(frame.size(), 4);
        assert_eq!(frame.topology().size(), 4);
    }

    #[test]
    fn resize_cycle_clears_everything() {
        let mut frame = Frame::new();
        for i in 0..4 {
            frame.add_atom(Atom::new("C"), Vector3D::new(i as f64, 0.0, 0.0), None);
        }
        frame.add_bond(0, 1, BondOrder::Single).unwrap();
        frame.resize(0);
        frame.resize(4);
        assert_eq!(frame.size(), 4);
        assert!(frame.topology().bonds().is_empty());
        assert!(frame.positions().iter().all(|p| *p == Vector3D::zeros()));
    }

    #[test]
    fn set_topology_checks_size() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("O"), Vector3D::zeros(), None);

        let mut topology = Topology::new();
        topology.add_atom(Atom::new("N"));
        topology.add_atom(Atom::new("N"));
        assert!(frame.set_topology(topology).is_err());

        let mut topology = Topology::new();
        topology.add_atom(Atom::new("N"));
        frame.set_topology(topology).unwrap();
        assert_eq!(frame.topology()[0].name(), "N");
    }

    #[test]
    fn geometry() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("O"), Vector3D::new(1.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::zeros(), None);
        frame.add_atom(Atom::new("N"), Vector3D::new(0.0, 1.0, 0.0), None);

        assert!((frame.distance(0, 1).unwrap() - 1.0).abs() < 1e-12);
        let angle = frame.angle(0, 1, 2).unwrap();
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn distance_uses_minimum_image() {
        let mut frame = Frame::new();
        frame.set_cell(UnitCell::orthorhombic(10.0, 10.0, 10.0).unwrap());
        frame.add_atom(Atom::new("H"), Vector3D::new(0.5, 0.0, 0.0), None);
        frame.add_atom(Atom::new("H"), Vector3D::new(9.5, 0.0, 0.0), None);
        assert!((frame.distance(0, 1).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn geometry_is_invariant_under_lattice_translation() {
        let mut frame = Frame::new();
        frame.set_cell(UnitCell::orthorhombic(10.0, 12.0, 14.0).unwrap());
        frame.add_atom(Atom::new("C"), Vector3D::new(1.0, 2.0, 3.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(2.5, 1.0, 3.5), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(3.0, 4.0, 2.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(4.5, 3.0, 1.0), None);

        let distance = frame.distance(0, 1).unwrap();
        let angle = frame.angle(0, 1, 2).unwrap();
        let dihedral = frame.dihedral(0, 1, 2, 3).unwrap();

        // Shift every atom by one lattice vector along each axis
        let shift = Vector3D::new(10.0, -12.0, 28.0);
        for position in frame.positions_mut() {
            *position += shift;
        }

        assert!((frame.distance(0, 1).unwrap() - distance).abs() < 1e-12);
        assert!((frame.angle(0, 1, 2).unwrap() - angle).abs() < 1e-12);
        assert!((frame.dihedral(0, 1, 2, 3).unwrap() - dihedral).abs() < 1e-12);

        // Shifting a single atom by a lattice vector is also invisible,
        // since distances use the minimum image
        frame.positions_mut()[1] += Vector3D::new(0.0, 12.0, 0.0);
        assert!((frame.distance(0, 1).unwrap() - distance).abs() < 1e-12);
        assert!((frame.angle(0, 1, 2).unwrap() - angle).abs() < 1e-12);
    }

    #[test]
    fn dihedral_and_out_of_plane() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("C"), Vector3D::new(1.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::zeros(), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(0.0, 1.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(-1.0, 1.0, 0.0), None);
        let phi = frame.dihedral(0, 1, 2, 3).unwrap();
        assert!((phi.abs() - std::f64::consts::PI).abs() < 1e-12);

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("C"), Vector3D::zeros(), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(0.0, 0.0, 2.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(1.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("C"), Vector3D::new(0.0, 1.0, 0.0), None);
        let oop = frame.out_of_plane(0, 1, 2, 3).unwrap();
        assert!((oop.abs() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn guessed_bonds_match_vdw_criterion() {
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("H"), Vector3D::zeros(), None);
        frame.add_atom(Atom::new("H"), Vector3D::new(0.75, 0.0, 0.0), None);
        frame.guess_bonds().unwrap();
        assert_eq!(frame.topology().bonds().len(), 1);

        // Guessing twice yields the same bond set
        frame.guess_bonds().unwrap();
        assert_eq!(frame.topology().bonds().len(), 1);

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("H"), Vector3D::zeros(), None);
        frame.add_atom(Atom::new("H"), Vector3D::new(2.0, 0.0, 0.0), None);
        frame.guess_bonds().unwrap();
        assert!(frame.topology().bonds().is_empty());
    }
}
