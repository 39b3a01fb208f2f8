use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::core::{Atom, CellShape, Frame, Matrix3D, Residue, UnitCell, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};
use crate::warning;

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "GRO",
    extension: Some("gro"),
    description: "GROMACS GRO text format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(GroFormat::new(path, mode, compression)?))
}

/// Adapter for the GROMACS GRO format.
///
/// Fixed-column atom lines, lengths in nanometers on disk and angstroms in
/// memory. Atom indices and residue ids above 99999 cannot be represented;
/// they are written as `*****` with a warning.
pub struct GroFormat {
    file: TextFile,
    step_positions: Vec<u64>,
    nwritten: usize,
}

impl GroFormat {
    pub fn new(path: &Path, mode: Mode, compression: Compression) -> Result<Self, FormatError> {
        let mut file = TextFile::open(path, mode, compression)?;
        let mut step_positions = Vec::new();
        if mode == Mode::Read {
            while !file.eof() {
                let position = file.tellg()?;
                if forward(&mut file)? {
                    step_positions.push(position);
                }
            }
            file.rewind()?;
        }
        Ok(GroFormat {
            file,
            step_positions,
            nwritten: 0,
        })
    }
}

fn forward(file: &mut TextFile) -> Result<bool, FormatError> {
    // Title line
    if matches!(file.readline(), Err(FileError::Eof)) {
        return Ok(false);
    }
    let natoms = match file.readline() {
        Ok(line) => match line.trim().parse::<usize>() {
            Ok(n) => n,
            Err(_) => return Ok(false),
        },
        Err(FileError::Eof) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    // Atom lines + box line
    file.readlines(natoms + 1)
        .map_err(|_| FormatError::malformed("GRO", "not enough lines for one step"))?;
    Ok(true)
}

fn parse_field<T: std::str::FromStr>(
    line: &str,
    range: std::ops::Range<usize>,
    what: &str,
) -> Result<T, FormatError>
where
    T::Err: std::fmt::Display,
{
    let field = line
        .get(range.clone())
        .ok_or_else(|| FormatError::malformed("GRO", format!("line too short for {what}")))?;
    field.trim().parse().map_err(|e| {
        FormatError::malformed("GRO", format!("invalid {what} '{}': {e}", field.trim()))
    })
}

impl Format for GroFormat {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        let title = match self.file.readline() {
            Ok(line) => line,
            Err(FileError::Eof) => return Err(FileError::NoMoreSteps.into()),
            Err(e) => return Err(e.into()),
        };
        let natoms: usize = self.file.readline()?.trim().parse()?;

        let mut next = Frame::new();
        next.set("name", title);

        // resid -> residue, keeping contiguous atoms together
        let mut residues: BTreeMap<u64, Residue> = BTreeMap::new();

        for line in self.file.readlines(natoms)? {
            if line.len() < 44 {
                return Err(FormatError::malformed(
                    "GRO",
                    format!("atom line is too short: '{line}'"),
                ));
            }

            // An unparsable residue id (e.g. overflow written as *****)
            // just leaves the atom without a residue
            let resid: Option<u64> = line.get(0..5).and_then(|s| s.trim().parse().ok());
            let resname = line.get(5..10).map(str::trim).unwrap_or("").to_owned();
            let name = line.get(10..15).map(str::trim).unwrap_or("").to_owned();
            // Columns 15..20 hold the atom index; it is redundant, skip it

            // GRO stores nanometers, we use angstroms
            let x: f64 = parse_field::<f64>(&line, 20..28, "x coordinate")? * 10.0;
            let y: f64 = parse_field::<f64>(&line, 28..36, "y coordinate")? * 10.0;
            let z: f64 = parse_field::<f64>(&line, 36..44, "z coordinate")? * 10.0;

            if line.len() >= 68 {
                if !next.has_velocities() {
                    next.add_velocities();
                }
                let vx: f64 = parse_field::<f64>(&line, 44..52, "x velocity")? * 10.0;
                let vy: f64 = parse_field::<f64>(&line, 52..60, "y velocity")? * 10.0;
                let vz: f64 = parse_field::<f64>(&line, 60..68, "z velocity")? * 10.0;
                next.add_atom(
                    Atom::new(name),
                    Vector3D::new(x, y, z),
                    Some(Vector3D::new(vx, vy, vz)),
                );
            } else {
                next.add_atom(Atom::new(name), Vector3D::new(x, y, z), None);
            }

            if let Some(resid) = resid {
                residues
                    .entry(resid)
                    .or_insert_with(|| Residue::with_id(resname, resid))
                    .add_atom(next.size() - 1);
            }
        }

        let box_line = self.file.readline()?;
        let values = box_line
            .split_whitespace()
            .map(|s| s.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()?;

        if values.len() == 3 {
            next.set_cell(UnitCell::orthorhombic(
                values[0] * 10.0,
                values[1] * 10.0,
                values[2] * 10.0,
            )?);
        } else if values.len() == 9 {
            // v1(x) v2(y) v3(z) v1(y) v1(z) v2(x) v2(z) v3(x) v3(y)
            let mut m = Matrix3D::zeros();
            m[(0, 0)] = values[0] * 10.0;
            m[(1, 1)] = values[1] * 10.0;
            m[(2, 2)] = values[2] * 10.0;
            m[(0, 1)] = values[5] * 10.0;
            m[(0, 2)] = values[7] * 10.0;
            m[(1, 2)] = values[8] * 10.0;
            next.set_cell(UnitCell::from_matrix(m)?);
        }

        for (_, residue) in residues {
            next.topology_mut().add_residue(residue)?;
        }

        *frame = next;
        Ok(())
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<(), FormatError> {
        let position = *self
            .step_positions
            .get(step)
            .ok_or(FormatError::StepOutOfRange {
                step,
                nsteps: self.step_positions.len(),
            })?;
        self.file.seekg(position)?;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<(), FormatError> {
        let title = frame
            .get("name")
            .and_then(|p| p.as_string().ok())
            .unwrap_or("GRO file written by mdio");
        writeln!(self.file, "{title}").map_err(FileError::from)?;
        writeln!(self.file, "{: >5}", frame.size()).map_err(FileError::from)?;

        // Residue ids generated for atoms without a residue start above
        // every id present in the file
        let mut generated_resid = frame
            .topology()
            .residues()
            .iter()
            .filter_map(|r| r.id())
            .max()
            .map(|id| id + 1)
            .unwrap_or(1);

        for i in 0..frame.size() {
            let residue = frame.topology().residue_for_atom(i);
            let resname = match residue {
                Some(residue) if residue.name().len() > 5 => {
                    warning(format!(
                        "residue '{}' has a name too long for GRO, it will be truncated",
                        residue.name()
                    ));
                    &residue.name()[..5]
                }
                Some(residue) => residue.name(),
                None => "XXXXX",
            };
            let resid = match residue.and_then(|r| r.id()) {
                Some(id) => gro_resid(id),
                None => {
                    let id = generated_resid;
                    generated_resid += 1;
                    gro_resid(id)
                }
            };

            let position = frame.positions()[i] / 10.0;
            check_representable(&position, 8, "atomic position")?;

            let atom_name = frame.topology()[i].name();
            match frame.velocities() {
                Some(velocities) => {
                    let velocity = velocities[i] / 10.0;
                    check_representable(&velocity, 8, "atomic velocity")?;
                    writeln!(
                        self.file,
                        "{: >5}{: <5}{: >5}{: >5}{:8.3}{:8.3}{:8.3}{:8.4}{:8.4}{:8.4}",
                        resid,
                        resname,
                        atom_name,
                        gro_index(i as u64),
                        position[0],
                        position[1],
                        position[2],
                        velocity[0],
                        velocity[1],
                        velocity[2]
                    )
                }
                None => writeln!(
                    self.file,
                    "{: >5}{: <5}{: >5}{: >5}{:8.3}{:8.3}{:8.3}",
                    resid,
                    resname,
                    atom_name,
                    gro_index(i as u64),
                    position[0],
                    position[1],
                    position[2]
                ),
            }
            .map_err(FileError::from)?;
        }

        let cell = frame.cell();
        match cell.shape() {
            CellShape::Orthorhombic | CellShape::Infinite => {
                // Zeros for an infinite cell, the line is still required
                writeln!(
                    self.file,
                    "  {:8.5}  {:8.5}  {:8.5}",
                    cell.a() / 10.0,
                    cell.b() / 10.0,
                    cell.c() / 10.0
                )
                .map_err(FileError::from)?;
            }
            CellShape::Triclinic => {
                let m = cell.matrix() / 10.0;
                writeln!(
                    self.file,
                    "  {:8.5}  {:8.5}  {:8.5} 0.0 0.0  {:8.5} 0.0  {:8.5}  {:8.5}",
                    m[(0, 0)],
                    m[(1, 1)],
                    m[(2, 2)],
                    m[(0, 1)],
                    m[(0, 2)],
                    m[(1, 2)]
                )
                .map_err(FileError::from)?;
            }
        }

        self.nwritten += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FormatError> {
        Ok(self.file.finish()?)
    }
}

/// One-based index in a 5-column field; too-large values degrade to `*****`.
fn gro_index(i: u64) -> String {
    if i >= 99999 {
        warning("value is too big for the GRO format, writing '*****' instead");
        "*****".into()
    } else {
        (i + 1).to_string()
    }
}

/// Residue id written as-is; too-large values degrade to `*****`.
fn gro_resid(id: u64) -> String {
    if id > 99999 {
        warning("value is too big for the GRO format, writing '*****' instead");
        "*****".into()
    } else {
        id.to_string()
    }
}

/// Check that values fit the fixed-width columns of the format.
fn check_representable(
    values: &Vector3D,
    width: u32,
    context: &'static str,
) -> Result<(), FormatError> {
    let max_positive = 10f64.powi(width as i32) - 1.0;
    let max_negative = -(10f64.powi(width as i32 - 1)) + 1.0;
    for i in 0..3 {
        if values[i] > max_positive || values[i] < max_negative {
            return Err(FormatError::malformed(
                "GRO",
                format!("value in {context} is too big for representation"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mdio-gro-{}-{}", std::process::id(), name));
        path
    }

    const WATER: &str = "\
MD of 2 waters
    6
    1WATER  OW1    1   0.126   1.624   1.679  0.1227 -0.0580  0.0434
    1WATER  HW2    2   0.190   1.661   1.747  0.8085  0.3191 -0.7791
    1WATER  HW3    3   0.177   1.568   1.613 -0.9045 -2.6469  1.3180
    2WATER  OW1    4   1.275   0.053   0.622  0.2519  0.3140 -0.1734
    2WATER  HW2    5   1.337   0.011   0.710 -1.0641 -1.1349  0.0257
    2WATER  HW3    6   1.326   0.120   0.568  1.9427 -0.8216 -0.0244
   1.82060   1.82060   1.82060
";

    #[test]
    fn read() -> anyhow::Result<()> {
        let path = temp_path("read.gro");
        std::fs::write(&path, WATER)?;

        let mut format = GroFormat::new(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 1);

        let mut frame = Frame::new();
        format.read(&mut frame)?;
        assert_eq!(frame.size(), 6);
        assert_eq!(frame.get("name").unwrap().as_string()?, "MD of 2 waters");
        assert_eq!(frame.topology()[0].name(), "OW1");

        // nm on disk, angstroms in memory
        let p = frame.positions()[0];
        assert!((p - Vector3D::new(1.26, 16.24, 16.79)).norm() < 1e-9);
        let v = frame.velocities().unwrap()[0];
        assert!((v - Vector3D::new(1.227, -0.580, 0.434)).norm() < 1e-9);

        let residue = frame.topology().residue_for_atom(3).unwrap();
        assert_eq!(residue.name(), "WATER");
        assert_eq!(residue.id(), Some(2));
        assert_eq!(residue.len(), 3);

        assert_eq!(frame.cell().shape(), CellShape::Orthorhombic);
        assert!((frame.cell().a() - 18.206).abs() < 1e-9);

        assert!(matches!(
            format.read(&mut frame),
            Err(FormatError::File(FileError::NoMoreSteps))
        ));

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn write_read_roundtrip() -> anyhow::Result<()> {
        let path = temp_path("write.gro");

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("OW"), Vector3D::new(1.26, 16.24, 16.79), None);
        frame.add_atom(Atom::new("HW"), Vector3D::new(1.90, 16.61, 17.47), None);
        let mut residue = Residue::with_id("SOL", 1);
        residue.add_atom(0);
        residue.add_atom(1);
        frame.topology_mut().add_residue(residue)?;
        frame.set_cell(UnitCell::orthorhombic(18.206, 18.206, 18.206)?);

        {
            let mut format = GroFormat::new(&path, Mode::Write, Compression::Auto)?;
            format.write(&frame)?;
            format.finish()?;
        }

        let mut format = GroFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut copy = Frame::new();
        format.read(&mut copy)?;
        assert_eq!(copy.size(), 2);
        assert_eq!(copy.topology()[0].name(), "OW");
        assert_eq!(copy.topology().residue_for_atom(1).unwrap().name(), "SOL");
        // Positions survive at format precision (0.001 nm)
        for (a, b) in copy.positions().iter().zip(frame.positions()) {
            assert!((a - b).norm() < 5e-3);
        }
        assert!((copy.cell().a() - 18.206).abs() < 5e-4);

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn residue_id_zero_survives_roundtrip() -> anyhow::Result<()> {
        let path = temp_path("resid0.gro");

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("C"), Vector3D::new(1.0, 1.0, 1.0), None);
        let mut residue = Residue::with_id("MOL", 0);
        residue.add_atom(0);
        frame.topology_mut().add_residue(residue)?;

        {
            let mut format = GroFormat::new(&path, Mode::Write, Compression::Auto)?;
            format.write(&frame)?;
            format.finish()?;
        }

        let mut format = GroFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut copy = Frame::new();
        format.read(&mut copy)?;
        assert_eq!(copy.topology().residue_for_atom(0).unwrap().id(), Some(0));

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn triclinic_box() -> anyhow::Result<()> {
        let path = temp_path("triclinic.gro");
        let content = "box\n    1\n    1MOL    C       1   0.000   0.000   0.000\n   \
1.00000   1.00000   1.00000 0.0 0.0   0.50000 0.0   0.30000   0.20000\n";
        std::fs::write(&path, content)?;

        let mut format = GroFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut frame = Frame::new();
        format.read(&mut frame)?;
        assert_eq!(frame.cell().shape(), CellShape::Triclinic);
        let m = frame.cell().matrix();
        assert!((m[(0, 1)] - 5.0).abs() < 1e-9);
        assert!((m[(0, 2)] - 3.0).abs() < 1e-9);
        assert!((m[(1, 2)] - 2.0).abs() < 1e-9);

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn index_overflow_writes_stars() -> anyhow::Result<()> {
        let path = temp_path("overflow.gro");

        let mut frame = Frame::new();
        frame.resize(100000);
        for i in 0..frame.size() {
            frame.topology_mut().atom_mut(i).unwrap().set_name("C");
        }

        {
            let mut format = GroFormat::new(&path, Mode::Write, Compression::Auto)?;
            format.write(&frame)?;
            format.finish()?;
        }

        let content = std::fs::read_to_string(&path)?;
        assert!(content.contains("*****"));

        // A file with ***** indices parses fine: the index column is unused
        let mut format = GroFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut copy = Frame::new();
        format.read(&mut copy)?;
        assert_eq!(copy.size(), 100000);

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
