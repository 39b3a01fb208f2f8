use std::io::Write;
use std::path::Path;

use crate::core::{Atom, BondOrder, CellShape, Frame, UnitCell, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "Tinker",
    extension: Some("arc"),
    description: "Tinker XYZ/ARC text format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(TinkerFormat::new(path, mode, compression)?))
}

/// Adapter for the Tinker XYZ format and its multi-frame archives.
///
/// The count line may be followed by a periodic box line (six floats);
/// every atom line carries its bonded neighbors, which populate the bond
/// graph.
pub struct TinkerFormat {
    file: TextFile,
    step_positions: Vec<u64>,
    nwritten: usize,
}

impl TinkerFormat {
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
        Ok(TinkerFormat {
            file,
            step_positions,
            nwritten: 0,
        })
    }
}

/// A box line holds exactly six floats and no integer neighbor list.
fn is_box_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields.len() == 6 && fields.iter().all(|f| f.parse::<f64>().is_ok())
        && fields.iter().any(|f| f.contains('.'))
}

fn forward(file: &mut TextFile) -> Result<bool, FormatError> {
    let natoms = match file.readline() {
        Ok(line) => match line.split_whitespace().next().and_then(|f| f.parse::<usize>().ok()) {
            Some(n) => n,
            None => return Ok(false),
        },
        Err(FileError::Eof) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if natoms == 0 {
        return Ok(false);
    }
    // Optional box line, then the atom lines
    let first = match file.readline() {
        Ok(line) => line,
        Err(FileError::Eof) => {
            return Err(FormatError::malformed("Tinker", "missing atom lines"))
        }
        Err(e) => return Err(e.into()),
    };
    let remaining = if is_box_line(&first) { natoms } else { natoms - 1 };
    file.readlines(remaining)
        .map_err(|_| FormatError::malformed("Tinker", "not enough atom lines"))?;
    Ok(true)
}

fn parse_atom_line(line: &str) -> Result<(Atom, Vector3D, Vec<usize>), FormatError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(FormatError::malformed(
            "Tinker",
            format!("atom line is too short: '{line}'"),
        ));
    }
    let name = fields[1];
    let position = Vector3D::new(
        fields[2].parse()?,
        fields[3].parse()?,
        fields[4].parse()?,
    );
    let mut atom = Atom::new(name);
    if let Some(type_id) = fields.get(5) {
        atom.set("tinker_type", *type_id);
    }
    let neighbors = fields[6..]
        .iter()
        .map(|f| f.parse::<usize>())
        .collect::<Result<Vec<usize>, _>>()?;
    Ok((atom, position, neighbors))
}

impl Format for TinkerFormat {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        let header = match self.file.readline() {
            Ok(line) => line,
            Err(FileError::Eof) => return Err(FileError::NoMoreSteps.into()),
            Err(e) => return Err(e.into()),
        };
        let mut fields = header.split_whitespace();
        let natoms: usize = fields
            .next()
            .ok_or_else(|| FormatError::malformed("Tinker", "empty header line"))?
            .parse()?;
        let title = fields.collect::<Vec<&str>>().join(" ");

        let mut next = Frame::new();
        if !title.is_empty() {
            next.set("name", title);
        }

        let mut pending: Vec<(usize, Vec<usize>)> = Vec::new();
        let first = self.file.readline()?;
        let first_is_box = is_box_line(&first);
        if first_is_box {
            let values = first
                .split_whitespace()
                .map(|f| f.parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()?;
            next.set_cell(UnitCell::triclinic(
                values[0], values[1], values[2], values[3], values[4], values[5],
            )?);
        } else {
            let (atom, position, neighbors) = parse_atom_line(&first)?;
            next.add_atom(atom, position, None);
            pending.push((0, neighbors));
        }

        let already = next.size();
        for (i, line) in self.file.readlines(natoms - already)?.iter().enumerate() {
            let (atom, position, neighbors) = parse_atom_line(line)?;
            next.add_atom(atom, position, None);
            pending.push((already + i, neighbors));
        }

        for (index, neighbors) in pending {
            for neighbor in neighbors {
                if neighbor == 0 || neighbor > natoms {
                    return Err(FormatError::malformed(
                        "Tinker",
                        format!("neighbor {neighbor} is out of range"),
                    ));
                }
                if neighbor - 1 != index {
                    next.add_bond(index, neighbor - 1, BondOrder::Unknown)?;
                }
            }
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
            .unwrap_or("written by mdio");
        writeln!(self.file, "{: >6}  {}", frame.size(), title).map_err(FileError::from)?;

        if frame.cell().shape() != CellShape::Infinite {
            let cell = frame.cell();
            writeln!(
                self.file,
                "{:>12.6}{:>12.6}{:>12.6}{:>12.6}{:>12.6}{:>12.6}",
                cell.a(),
                cell.b(),
                cell.c(),
                cell.alpha(),
                cell.beta(),
                cell.gamma()
            )
            .map_err(FileError::from)?;
        }

        // Neighbor lists from the bond graph
        let mut neighbors = vec![Vec::new(); frame.size()];
        for bond in frame.topology().bonds() {
            neighbors[bond[0]].push(bond[1]);
            neighbors[bond[1]].push(bond[0]);
        }

        for i in 0..frame.size() {
            let atom = &frame.topology()[i];
            let position = frame.positions()[i];
            let type_id = atom
                .get("tinker_type")
                .and_then(|p| p.as_string().ok())
                .unwrap_or("1");
            let mut line = format!(
                "{: >6}  {: <3}{:>12.6}{:>12.6}{:>12.6}{: >6}",
                i + 1,
                atom.name(),
                position[0],
                position[1],
                position[2],
                type_id
            );
            for neighbor in &neighbors[i] {
                line.push_str(&format!("{: >6}", neighbor + 1));
            }
            writeln!(self.file, "{line}").map_err(FileError::from)?;
        }

        self.nwritten += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FormatError> {
        Ok(self.file.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mdio-tinker-{}-{}", std::process::id(), name));
        path
    }

    const WATER_ARC: &str = "\
     3  water
     1  O     -12.363790    1.698502    1.216394     1     2     3
     2  H     -11.428342    1.844093    1.373860     2     1
     3  H     -12.441833    0.989954    0.570718     2     1
     3  water
     1  O     -12.400000    1.700000    1.200000     1     2     3
     2  H     -11.400000    1.800000    1.400000     2     1
     3  H     -12.400000    1.000000    0.600000     2     1
";

    #[test]
    fn read_archive() -> anyhow::Result<()> {
        let path = temp_path("water.arc");
        std::fs::write(&path, WATER_ARC)?;

        let mut format = TinkerFormat::new(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame)?;
        assert_eq!(frame.size(), 3);
        assert_eq!(frame.topology()[0].name(), "O");
        let p = frame.positions()[0];
        assert!((p - Vector3D::new(-12.363790, 1.698502, 1.216394)).norm() < 1e-9);
        assert_eq!(frame.topology().bonds().len(), 2);
        assert!(frame.topology().contains_bond(0, 1));
        assert!(frame.topology().contains_bond(0, 2));

        format.read(&mut frame)?;
        assert!((frame.positions()[0][0] + 12.4).abs() < 1e-9);
        assert!(matches!(
            format.read(&mut frame),
            Err(FormatError::File(FileError::NoMoreSteps))
        ));

        format.read_step(0, &mut frame)?;
        assert!((frame.positions()[0][0] + 12.363790).abs() < 1e-9);

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn box_line_is_detected() -> anyhow::Result<()> {
        let path = temp_path("box.arc");
        let content = "\
     2  nitrogen
   18.273600   18.273600   18.273600   90.000000   90.000000   90.000000
     1  N      -2.941653    3.480677    3.562162     1     2
     2  N      -3.328907    4.080875    4.559358     1     1
";
        std::fs::write(&path, content)?;

        let mut format = TinkerFormat::new(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 1);
        let mut frame = Frame::new();
        format.read(&mut frame)?;
        assert_eq!(frame.size(), 2);
        assert_eq!(frame.cell().shape(), CellShape::Orthorhombic);
        assert!((frame.cell().a() - 18.2736).abs() < 1e-9);
        assert!(frame.topology().contains_bond(0, 1));

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn roundtrip() -> anyhow::Result<()> {
        let path = temp_path("roundtrip.arc");

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("O"), Vector3D::new(0.0, 0.0, 0.0), None);
        frame.add_atom(Atom::new("H"), Vector3D::new(0.95, 0.0, 0.0), None);
        frame.add_bond(0, 1, BondOrder::Unknown)?;
        frame.set_cell(UnitCell::orthorhombic(18.0, 18.0, 18.0)?);

        {
            let mut format = TinkerFormat::new(&path, Mode::Write, Compression::Auto)?;
            format.write(&frame)?;
            format.finish()?;
        }

        let mut format = TinkerFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut copy = Frame::new();
        format.read(&mut copy)?;
        assert_eq!(copy.size(), 2);
        assert!(copy.topology().contains_bond(0, 1));
        assert!((copy.cell().a() - 18.0).abs() < 1e-9);
        assert!((copy.positions()[1] - frame.positions()[1]).norm() < 1e-6);

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
