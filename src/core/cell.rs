use crate::core::{ConfigurationError, Matrix3D, Vector3D};

/// Shape of a unit cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellShape {
    /// No periodic boundary conditions
    Infinite,
    /// Rectangular cell with all angles at 90 degrees
    Orthorhombic,
    /// General parallelepiped
    Triclinic,
}

/// The periodic boundary conditions of a system.
///
/// The canonical representation is an upper-triangular matrix whose columns
/// are the cell vectors `a`, `b`, `c`; lengths/angles are views onto it.
/// Lengths are in angstroms, angles in degrees.
#[derive(Debug, Clone)]
pub struct UnitCell {
    matrix: Matrix3D,
    inv: Matrix3D,
    shape: CellShape,
}

impl Default for UnitCell {
    fn default() -> Self {
        UnitCell::infinite()
    }
}

impl PartialEq for UnitCell {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.matrix == other.matrix
    }
}

impl UnitCell {
    /// Cell without periodic boundary conditions.
    pub fn infinite() -> Self {
        UnitCell {
            matrix: Matrix3D::zeros(),
            inv: Matrix3D::zeros(),
            shape: CellShape::Infinite,
        }
    }

    /// Orthorhombic cell from three lengths in angstroms. All-zero lengths
    /// make an infinite cell.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, ConfigurationError> {
        Self::triclinic(a, b, c, 90.0, 90.0, 90.0)
    }

    /// General cell from lengths (angstroms) and angles (degrees).
    pub fn triclinic(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self, ConfigurationError> {
        if a == 0.0 && b == 0.0 && c == 0.0 {
            return Ok(UnitCell::infinite());
        }
        if a <= 0.0 || b <= 0.0 || c <= 0.0 {
            return Err(ConfigurationError::InvalidCell(format!(
                "cell lengths must be positive, got {a} {b} {c}"
            )));
        }
        for angle in [alpha, beta, gamma] {
            if angle <= 0.0 || angle >= 180.0 {
                return Err(ConfigurationError::InvalidCell(format!(
                    "cell angles must be in (0, 180), got {alpha} {beta} {gamma}"
                )));
            }
        }

        let mut m = Matrix3D::zeros();
        m[(0, 0)] = a;
        if alpha != 90.0 || beta != 90.0 || gamma != 90.0 {
            let cos_a = if alpha != 90.0 { alpha.to_radians().cos() } else { 0.0 };
            let cos_b = if beta != 90.0 { beta.to_radians().cos() } else { 0.0 };
            let (sin_g, cos_g) = if gamma != 90.0 {
                gamma.to_radians().sin_cos()
            } else {
                (1.0, 0.0)
            };
            m[(0, 1)] = b * cos_g;
            m[(1, 1)] = b * sin_g;
            m[(0, 2)] = c * cos_b;
            m[(1, 2)] = c * (cos_a - cos_b * cos_g) / sin_g;
            m[(2, 2)] = (c * c - m[(0, 2)] * m[(0, 2)] - m[(1, 2)] * m[(1, 2)]).sqrt();
            Self::from_matrix_shape(m, CellShape::Triclinic)
        } else {
            m[(1, 1)] = b;
            m[(2, 2)] = c;
            Self::from_matrix_shape(m, CellShape::Orthorhombic)
        }
    }

    /// Cell from an explicit upper-triangular matrix with the cell vectors
    /// in columns.
    pub fn from_matrix(matrix: Matrix3D) -> Result<Self, ConfigurationError> {
        if matrix == Matrix3D::zeros() {
            return Ok(UnitCell::infinite());
        }
        let lower = [(1, 0), (2, 0), (2, 1)];
        if lower.iter().any(|&ij| matrix[ij] != 0.0) {
            return Err(ConfigurationError::InvalidCell(
                "cell matrix must be upper triangular".into(),
            ));
        }
        let off_diagonal = [(0, 1), (0, 2), (1, 2)];
        let shape = if off_diagonal.iter().all(|&ij| matrix[ij] == 0.0) {
            CellShape::Orthorhombic
        } else {
            CellShape::Triclinic
        };
        Self::from_matrix_shape(matrix, shape)
    }

    fn from_matrix_shape(matrix: Matrix3D, shape: CellShape) -> Result<Self, ConfigurationError> {
        let inv = matrix.try_inverse().ok_or_else(|| {
            ConfigurationError::InvalidCell(format!("cell matrix is not invertible: {matrix}"))
        })?;
        Ok(UnitCell { matrix, inv, shape })
    }

    pub fn shape(&self) -> CellShape {
        self.shape
    }

    pub fn matrix(&self) -> Matrix3D {
        self.matrix
    }

    pub fn a(&self) -> f64 {
        self.matrix.column(0).norm()
    }

    pub fn b(&self) -> f64 {
        self.matrix.column(1).norm()
    }

    pub fn c(&self) -> f64 {
        self.matrix.column(2).norm()
    }

    pub fn lengths(&self) -> Vector3D {
        Vector3D::new(self.a(), self.b(), self.c())
    }

    pub fn alpha(&self) -> f64 {
        self.angle_between(1, 2)
    }

    pub fn beta(&self) -> f64 {
        self.angle_between(0, 2)
    }

    pub fn gamma(&self) -> f64 {
        self.angle_between(0, 1)
    }

    pub fn angles(&self) -> Vector3D {
        Vector3D::new(self.alpha(), self.beta(), self.gamma())
    }

    fn angle_between(&self, i: usize, j: usize) -> f64 {
        let u = self.matrix.column(i);
        let v = self.matrix.column(j);
        if u.norm_squared() * v.norm_squared() == 0.0 {
            return 90.0;
        }
        u.angle(&v).to_degrees()
    }

    /// Cell volume in cubic angstroms, 0 for infinite cells.
    pub fn volume(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Minimum-image convention: wrap `vector` to its shortest periodic
    /// equivalent. Identity for infinite cells.
    pub fn wrap(&self, vector: &Vector3D) -> Vector3D {
        if self.shape == CellShape::Infinite {
            return *vector;
        }
        // Wrap in fractional coordinates, then go back to the lab frame
        let mut fractional = self.inv * vector;
        fractional.apply(|x| *x -= x.round());
        self.matrix * fractional
    }
}
