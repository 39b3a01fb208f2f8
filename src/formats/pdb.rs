use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::core::{Atom, BondOrder, CellShape, Frame, Residue, UnitCell, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};
use crate::warning;

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "PDB",
    extension: Some("pdb"),
    description: "Protein Data Bank text format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(PdbFormat::new(path, mode, compression)?))
}

/// Adapter for the PDB format.
///
/// Steps are `MODEL`/`ENDMDL` blocks; a file without models is a single
/// step. `CRYST1` populates the cell, `ATOM`/`HETATM` records the atoms and
/// residues, `CONECT` the bonds.
pub struct PdbFormat {
    file: TextFile,
    step_positions: Vec<u64>,
    // Cell from the file header, which applies to every model
    header_cell: Option<UnitCell>,
    nwritten: usize,
}

impl PdbFormat {
    pub fn new(path: &Path, mode: Mode, compression: Compression) -> Result<Self, FormatError> {
        let mut file = TextFile::open(path, mode, compression)?;
        let mut step_positions = Vec::new();
        let mut header_cell = None;
        if mode == Mode::Read {
            (step_positions, header_cell) = scan_models(&mut file)?;
            file.rewind()?;
        }
        Ok(PdbFormat {
            file,
            step_positions,
            header_cell,
            nwritten: 0,
        })
    }
}

fn parse_cryst1(line: &str) -> Result<UnitCell, FormatError> {
    let a = parse_coordinate(line, 6..15)?;
    let b = parse_coordinate(line, 15..24)?;
    let c = parse_coordinate(line, 24..33)?;
    let alpha = parse_coordinate(line, 33..40)?;
    let beta = parse_coordinate(line, 40..47)?;
    let gamma = parse_coordinate(line, 47..54)?;
    Ok(UnitCell::triclinic(a, b, c, alpha, beta, gamma)?)
}

/// Index the start of every model and pick up the header cell. Files
/// without MODEL records hold one step starting at the beginning.
fn scan_models(file: &mut TextFile) -> Result<(Vec<u64>, Option<UnitCell>), FormatError> {
    let mut positions = Vec::new();
    let mut has_atoms = false;
    let mut cell = None;
    loop {
        let position = file.tellg()?;
        let line = match file.readline() {
            Ok(line) => line,
            Err(FileError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.starts_with("MODEL") {
            positions.push(position);
        } else if line.starts_with("ATOM") || line.starts_with("HETATM") {
            has_atoms = true;
        } else if line.starts_with("CRYST1") && cell.is_none() {
            cell = Some(parse_cryst1(&line)?);
        }
    }
    if positions.is_empty() && has_atoms {
        positions.push(0);
    }
    Ok((positions, cell))
}

fn parse_coordinate(line: &str, range: std::ops::Range<usize>) -> Result<f64, FormatError> {
    line.get(range)
        .map(str::trim)
        .ok_or_else(|| FormatError::malformed("PDB", format!("record is too short: '{line}'")))?
        .parse()
        .map_err(|e| FormatError::malformed("PDB", format!("invalid coordinate: {e}")))
}

impl Format for PdbFormat {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        let mut next = Frame::new();
        if let Some(cell) = &self.header_cell {
            next.set_cell(cell.clone());
        }
        let mut residues: BTreeMap<(String, u64), Residue> = BTreeMap::new();
        // CONECT records use serial numbers, which may not match indices
        let mut serial_to_index: BTreeMap<u64, usize> = BTreeMap::new();
        let mut bonds: Vec<(u64, u64)> = Vec::new();
        let mut in_model = false;
        let mut saw_anything = false;

        loop {
            let line = match self.file.readline() {
                Ok(line) => line,
                Err(FileError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let record = line.get(0..6).unwrap_or(&line).trim_end();
            match record {
                "MODEL" => {
                    if in_model {
                        return Err(FormatError::malformed("PDB", "nested MODEL records"));
                    }
                    in_model = true;
                    saw_anything = true;
                }
                "ENDMDL" => break,
                "END" => break,
                "CRYST1" => next.set_cell(parse_cryst1(&line)?),
                "ATOM" | "HETATM" => {
                    saw_anything = true;
                    if line.len() < 54 {
                        return Err(FormatError::malformed(
                            "PDB",
                            format!("atom record is too short: '{line}'"),
                        ));
                    }
                    let serial: Option<u64> = line.get(6..11).and_then(|s| s.trim().parse().ok());
                    let name = line.get(12..16).map(str::trim).unwrap_or("").to_owned();
                    let resname = line.get(17..20).map(str::trim).unwrap_or("").to_owned();
                    let chain = line.get(21..22).unwrap_or(" ").to_owned();
                    let resid: Option<u64> = line.get(22..26).and_then(|s| s.trim().parse().ok());
                    let x = parse_coordinate(&line, 30..38)?;
                    let y = parse_coordinate(&line, 38..46)?;
                    let z = parse_coordinate(&line, 46..54)?;
                    let element = line.get(76..78).map(str::trim).unwrap_or("");

                    let atom = if element.is_empty() {
                        Atom::new(name)
                    } else {
                        Atom::with_type(name, element)
                    };
                    next.add_atom(atom, Vector3D::new(x, y, z), None);

                    if let Some(serial) = serial {
                        serial_to_index.insert(serial, next.size() - 1);
                    }
                    if let Some(resid) = resid {
                        residues
                            .entry((chain.clone(), resid))
                            .or_insert_with(|| Residue::with_id(resname, resid))
                            .add_atom(next.size() - 1);
                    }
                }
                "CONECT" => {
                    let center: Option<u64> = line.get(6..11).and_then(|s| s.trim().parse().ok());
                    let Some(center) = center else { continue };
                    for range in [11..16, 16..21, 21..26, 26..31] {
                        if let Some(other) = line.get(range).and_then(|s| s.trim().parse().ok()) {
                            bonds.push((center, other));
                        }
                    }
                }
                "TER" => {}
                _ => {}
            }
        }

        if !saw_anything {
            return Err(FileError::NoMoreSteps.into());
        }

        for (_, residue) in residues {
            next.topology_mut().add_residue(residue)?;
        }
        for (serial_i, serial_j) in bonds {
            match (
                serial_to_index.get(&serial_i),
                serial_to_index.get(&serial_j),
            ) {
                (Some(&i), Some(&j)) if i != j => {
                    next.add_bond(i, j, BondOrder::Unknown)?;
                }
                _ => warning(format!(
                    "ignoring CONECT record with unknown atom serial {serial_i} or {serial_j}"
                )),
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
        writeln!(self.file, "MODEL {: >8}", self.nwritten + 1).map_err(FileError::from)?;

        let cell = frame.cell();
        if cell.shape() != CellShape::Infinite {
            writeln!(
                self.file,
                "CRYST1{:9.3}{:9.3}{:9.3}{:7.2}{:7.2}{:7.2} P 1           1",
                cell.a(),
                cell.b(),
                cell.c(),
                cell.alpha(),
                cell.beta(),
                cell.gamma()
            )
            .map_err(FileError::from)?;
        }

        for i in 0..frame.size() {
            let topology = frame.topology();
            let atom = &topology[i];
            let residue = topology.residue_for_atom(i);
            let resname = residue.map(|r| r.name()).unwrap_or("XXX");
            let resid = residue.and_then(|r| r.id()).unwrap_or((i as u64 + 1) % 10000);
            let position = frame.positions()[i];
            let serial = pdb_serial(i as u64 + 1);

            // Short atom names get a leading space in the 4-char field
            let name = if atom.name().len() < 4 {
                format!(" {: <3}", atom.name())
            } else {
                atom.name()[..4].to_owned()
            };

            writeln!(
                self.file,
                "ATOM  {: >5} {} {: <3} A{: >4}    {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}          {: >2}",
                serial,
                name,
                &resname[..resname.len().min(3)],
                resid % 10000,
                position[0],
                position[1],
                position[2],
                1.0,
                0.0,
                atom.type_name().get(..2).unwrap_or(atom.type_name()),
            )
            .map_err(FileError::from)?;
        }

        // CONECT records, one line per bonded pair in both directions is
        // not required: emit each bond once from its lower atom
        let mut by_center: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for bond in frame.topology().bonds() {
            by_center.entry(bond[0]).or_default().push(bond[1]);
        }
        for (center, others) in by_center {
            if center >= 99999 {
                warning("too many atoms for CONECT records, skipping the rest");
                break;
            }
            for chunk in others.chunks(4) {
                let mut line = format!("CONECT{: >5}", center + 1);
                for other in chunk {
                    line.push_str(&format!("{: >5}", other + 1));
                }
                writeln!(self.file, "{line}").map_err(FileError::from)?;
            }
        }

        writeln!(self.file, "ENDMDL").map_err(FileError::from)?;
        self.nwritten += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FormatError> {
        self.file.write_str("END\n")?;
        Ok(self.file.finish()?)
    }
}

fn pdb_serial(value: u64) -> String {
    if value > 99999 {
        "*****".into()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mdio-pdb-{}-{}", std::process::id(), name));
        path
    }

    const TWO_MODELS: &str = "\
CRYST1   15.000   15.000   15.000  90.00  90.00  90.00 P 1           1
MODEL        1
ATOM      1  N   ALA A   1      11.104   6.134  -6.504  1.00  0.00           N
ATOM      2  CA  ALA A   1      11.639   6.071  -5.147  1.00  0.00           C
HETATM    3  O   HOH A   2       5.605   0.543  -2.557  1.00  0.00           O
CONECT    1    2
ENDMDL
MODEL        2
ATOM      1  N   ALA A   1      11.204   6.234  -6.404  1.00  0.00           N
ATOM      2  CA  ALA A   1      11.739   6.171  -5.047  1.00  0.00           C
HETATM    3  O   HOH A   2       5.705   0.643  -2.457  1.00  0.00           O
ENDMDL
END
";

    #[test]
    fn read_models() -> anyhow::Result<()> {
        let path = temp_path("models.pdb");
        std::fs::write(&path, TWO_MODELS)?;

        let mut format = PdbFormat::new(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame)?;
        assert_eq!(frame.size(), 3);
        assert_eq!(frame.topology()[0].name(), "N");
        assert_eq!(frame.topology()[1].name(), "CA");
        assert_eq!(frame.topology()[1].type_name(), "C");
        let p = frame.positions()[0];
        assert!((p - Vector3D::new(11.104, 6.134, -6.504)).norm() < 1e-9);
        assert!(frame.topology().contains_bond(0, 1));

        let residue = frame.topology().residue_for_atom(2).unwrap();
        assert_eq!(residue.name(), "HOH");
        assert_eq!(residue.id(), Some(2));

        format.read(&mut frame)?;
        assert!((frame.positions()[0][0] - 11.204).abs() < 1e-9);
        assert!(matches!(
            format.read(&mut frame),
            Err(FormatError::File(FileError::NoMoreSteps))
        ));

        format.read_step(0, &mut frame)?;
        assert!((frame.positions()[0][0] - 11.104).abs() < 1e-9);

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn header_cell_applies_to_every_model() -> anyhow::Result<()> {
        let path = temp_path("cryst.pdb");
        std::fs::write(&path, TWO_MODELS)?;

        let mut format = PdbFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut frame = Frame::new();
        // The CRYST1 record precedes the first MODEL but applies to all of
        // them, random access included
        format.read_step(1, &mut frame)?;
        assert_eq!(frame.cell().shape(), CellShape::Orthorhombic);
        assert!((frame.cell().a() - 15.0).abs() < 1e-9);

        let single = "\
CRYST1   15.000   15.000   15.000  90.00  90.00  90.00 P 1           1
ATOM      1  N   ALA A   1      11.104   6.134  -6.504  1.00  0.00           N
END
";
        let single_path = temp_path("single.pdb");
        std::fs::write(&single_path, single)?;
        let mut format = PdbFormat::new(&single_path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 1);
        format.read(&mut frame)?;
        assert_eq!(frame.size(), 1);
        assert!((frame.cell().a() - 15.0).abs() < 1e-9);

        std::fs::remove_file(&path)?;
        std::fs::remove_file(&single_path)?;
        Ok(())
    }

    #[test]
    fn bonds_survive_roundtrip() -> anyhow::Result<()> {
        let path = temp_path("bonds.pdb");

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("O"), Vector3D::new(1.0, 2.0, 3.0), None);
        frame.add_atom(Atom::new("H"), Vector3D::new(2.0, 2.0, 3.0), None);
        frame.add_atom(Atom::new("H"), Vector3D::new(0.0, 2.0, 3.0), None);
        frame.add_bond(0, 1, BondOrder::Unknown)?;
        frame.add_bond(0, 2, BondOrder::Unknown)?;

        {
            let mut format = PdbFormat::new(&path, Mode::Write, Compression::Auto)?;
            format.write(&frame)?;
            format.finish()?;
        }

        let mut format = PdbFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut copy = Frame::new();
        format.read(&mut copy)?;
        assert_eq!(copy.size(), 3);
        assert!(copy.topology().contains_bond(0, 1));
        assert!(copy.topology().contains_bond(0, 2));
        assert_eq!(copy.topology().bonds().len(), 2);
        for (a, b) in copy.positions().iter().zip(frame.positions()) {
            assert!((a - b).norm() < 1e-3);
        }

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
