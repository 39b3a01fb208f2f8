//! The in-memory model: atoms, residues, connectivity, cells and frames.

mod atom;
mod cell;
mod connectivity;
mod frame;
mod periodic_table;
mod property;
mod residue;
mod topology;

pub use {
    atom::Atom,
    cell::{CellShape, UnitCell},
    connectivity::{Angle, Bond, BondOrder, Dihedral, Improper},
    frame::Frame,
    periodic_table::{element_mass, element_number, element_vdw_radius},
    property::{Property, PropertyMap},
    residue::Residue,
    topology::Topology,
};

use thiserror::Error;

/// Convenience alias for a 3D vector of doubles
pub type Vector3D = nalgebra::Vector3<f64>;
/// Convenience alias for a 3x3 matrix of doubles
pub type Matrix3D = nalgebra::Matrix3<f64>;

/// Error raised when the in-memory model is asked to enter an invalid state.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("tried to read a {actual} property as {expected}")]
    PropertyKind {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("the topology contains {new} atoms, but the frame contains {frame} atoms")]
    TopologySize { new: usize, frame: usize },

    #[error("index {index} is out of bounds for a system of {size} atoms")]
    OutOfBounds { index: usize, size: usize },

    #[error("atom mass must be non-negative, got {0}")]
    NegativeMass(f64),

    #[error("missing VdW radius for atom '{0}'")]
    MissingVdwRadius(String),

    #[error("atom {0} already belongs to another residue")]
    AtomInResidue(usize),

    #[error("cannot have a bond between an atom and itself")]
    SelfBond,

    #[error("cannot have the same atom twice in an angle")]
    DuplicateInAngle,

    #[error("cannot have the same atom twice in a dihedral")]
    DuplicateInDihedral,

    #[error("cannot have the same atom twice in an improper")]
    DuplicateInImproper,

    #[error("invalid unit cell: {0}")]
    InvalidCell(String),
}
