use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::core::{Atom, BondOrder, CellShape, Frame, Matrix3D, Residue, UnitCell, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};
use crate::warning;

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "LAMMPS Data",
    extension: Some("lmp"),
    description: "LAMMPS data file format",
    supports_read: true,
    supports_write: true,
    supports_append: false,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(LammpsDataFormat::new(path, mode, compression)?))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AtomStyle {
    Atomic,
    Molecular,
    Full,
}

/// Adapter for LAMMPS data files, a single-step topology+coordinates
/// format.
///
/// Atom lines are detected as `atomic`, `molecular` or `full` style from
/// the `Atoms` section comment or the column count. Molecule ids become
/// residues.
pub struct LammpsDataFormat {
    file: TextFile,
    exhausted: bool,
    nwritten: usize,
}

impl LammpsDataFormat {
    pub fn new(path: &Path, mode: Mode, compression: Compression) -> Result<Self, FormatError> {
        let file = TextFile::open(path, mode, compression)?;
        Ok(LammpsDataFormat {
            file,
            exhausted: false,
            nwritten: 0,
        })
    }
}

/// Strip an end-of-line comment.
fn uncomment(line: &str) -> &str {
    line.split('#').next().unwrap_or(line).trim()
}

struct RawAtom {
    molecule: Option<u64>,
    type_id: String,
    charge: f64,
    position: Vector3D,
}

impl Format for LammpsDataFormat {
    fn nsteps(&self) -> usize {
        1.max(self.nwritten)
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        if self.exhausted {
            return Err(FileError::NoMoreSteps.into());
        }

        // First line is a comment
        match self.file.readline() {
            Ok(_) => {}
            Err(FileError::Eof) => return Err(FileError::NoMoreSteps.into()),
            Err(e) => return Err(e.into()),
        }

        let mut natoms = 0usize;
        let mut nbonds = 0usize;
        let mut bounds = [[0.0f64; 2]; 3];
        let mut tilt = [0.0f64; 3];
        let mut masses: BTreeMap<String, f64> = BTreeMap::new();
        // id -> raw atom data; LAMMPS ids are arbitrary
        let mut atoms: BTreeMap<u64, RawAtom> = BTreeMap::new();
        let mut velocities: BTreeMap<u64, Vector3D> = BTreeMap::new();
        let mut bonds: Vec<(u64, u64)> = Vec::new();

        enum Section {
            Header,
            Masses,
            Atoms,
            Velocities,
            Bonds,
            Skip,
        }
        let mut section = Section::Header;
        // Style from the "Atoms # style" comment; otherwise guessed from
        // the column count of each atom line
        let mut declared_style: Option<AtomStyle> = None;

        loop {
            let line = match self.file.readline() {
                Ok(line) => line,
                Err(FileError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let content = uncomment(&line);
            if content.is_empty() {
                continue;
            }

            // Section keywords start a new block
            match content {
                "Masses" => {
                    section = Section::Masses;
                    continue;
                }
                "Atoms" => {
                    declared_style = match line.split('#').nth(1).map(str::trim) {
                        Some("atomic") => Some(AtomStyle::Atomic),
                        Some("molecular") => Some(AtomStyle::Molecular),
                        Some("full") => Some(AtomStyle::Full),
                        Some(other) => {
                            warning(format!(
                                "unknown LAMMPS atom style '{other}', guessing from columns"
                            ));
                            None
                        }
                        None => None,
                    };
                    section = Section::Atoms;
                    continue;
                }
                "Velocities" => {
                    section = Section::Velocities;
                    continue;
                }
                "Bonds" => {
                    section = Section::Bonds;
                    continue;
                }
                "Angles" | "Dihedrals" | "Impropers" | "Pair Coeffs" | "Bond Coeffs"
                | "Angle Coeffs" | "Dihedral Coeffs" | "Improper Coeffs" => {
                    section = Section::Skip;
                    continue;
                }
                _ => {}
            }

            match &section {
                Section::Header => {
                    let fields: Vec<&str> = content.split_whitespace().collect();
                    if fields.len() >= 2 && fields[1] == "atoms" {
                        natoms = fields[0].parse()?;
                    } else if fields.len() >= 2 && fields[1] == "bonds" {
                        nbonds = fields[0].parse()?;
                    } else if fields.len() >= 4 && fields[2] == "xlo" {
                        bounds[0] = [fields[0].parse()?, fields[1].parse()?];
                    } else if fields.len() >= 4 && fields[2] == "ylo" {
                        bounds[1] = [fields[0].parse()?, fields[1].parse()?];
                    } else if fields.len() >= 4 && fields[2] == "zlo" {
                        bounds[2] = [fields[0].parse()?, fields[1].parse()?];
                    } else if fields.len() >= 6 && fields[3] == "xy" {
                        tilt = [fields[0].parse()?, fields[1].parse()?, fields[2].parse()?];
                    }
                }
                Section::Masses => {
                    let fields: Vec<&str> = content.split_whitespace().collect();
                    if fields.len() >= 2 {
                        masses.insert(fields[0].to_owned(), fields[1].parse()?);
                    }
                }
                Section::Atoms => {
                    let fields: Vec<&str> = content.split_whitespace().collect();
                    let style = match declared_style {
                        Some(style) => style,
                        None => match fields.len() {
                            5 => AtomStyle::Atomic,
                            6 => AtomStyle::Molecular,
                            _ => AtomStyle::Full,
                        },
                    };
                    if fields.len() < 5 {
                        return Err(FormatError::malformed(
                            "LAMMPS Data",
                            format!("atom line is too short: '{content}'"),
                        ));
                    }
                    let id: u64 = fields[0].parse()?;
                    let raw = match style {
                        AtomStyle::Atomic => RawAtom {
                            molecule: None,
                            type_id: fields[1].to_owned(),
                            charge: 0.0,
                            position: Vector3D::new(
                                fields[2].parse()?,
                                fields[3].parse()?,
                                fields[4].parse()?,
                            ),
                        },
                        AtomStyle::Molecular => RawAtom {
                            molecule: Some(fields[1].parse()?),
                            type_id: fields[2].to_owned(),
                            charge: 0.0,
                            position: Vector3D::new(
                                fields[3].parse()?,
                                fields[4].parse()?,
                                fields[5].parse()?,
                            ),
                        },
                        AtomStyle::Full => {
                            if fields.len() < 7 {
                                return Err(FormatError::malformed(
                                    "LAMMPS Data",
                                    format!("atom line is too short for full style: '{content}'"),
                                ));
                            }
                            RawAtom {
                                molecule: Some(fields[1].parse()?),
                                type_id: fields[2].to_owned(),
                                charge: fields[3].parse()?,
                                position: Vector3D::new(
                                    fields[4].parse()?,
                                    fields[5].parse()?,
                                    fields[6].parse()?,
                                ),
                            }
                        }
                    };
                    atoms.insert(id, raw);
                }
                Section::Velocities => {
                    let fields: Vec<&str> = content.split_whitespace().collect();
                    if fields.len() >= 4 {
                        velocities.insert(
                            fields[0].parse()?,
                            Vector3D::new(
                                fields[1].parse()?,
                                fields[2].parse()?,
                                fields[3].parse()?,
                            ),
                        );
                    }
                }
                Section::Bonds => {
                    let fields: Vec<&str> = content.split_whitespace().collect();
                    if fields.len() >= 4 {
                        bonds.push((fields[2].parse()?, fields[3].parse()?));
                    }
                }
                Section::Skip => {}
            }
        }

        if atoms.len() != natoms {
            warning(format!(
                "LAMMPS data file declares {natoms} atoms but contains {}",
                atoms.len()
            ));
        }
        if bonds.len() != nbonds {
            warning(format!(
                "LAMMPS data file declares {nbonds} bonds but contains {}",
                bonds.len()
            ));
        }

        let mut next = Frame::new();
        if !velocities.is_empty() {
            next.add_velocities();
        }

        let mut cell_matrix = Matrix3D::zeros();
        cell_matrix[(0, 0)] = bounds[0][1] - bounds[0][0];
        cell_matrix[(1, 1)] = bounds[1][1] - bounds[1][0];
        cell_matrix[(2, 2)] = bounds[2][1] - bounds[2][0];
        cell_matrix[(0, 1)] = tilt[0];
        cell_matrix[(0, 2)] = tilt[1];
        cell_matrix[(1, 2)] = tilt[2];
        next.set_cell(UnitCell::from_matrix(cell_matrix)?);

        // BTreeMap iteration sorts by atom id
        let mut id_to_index: BTreeMap<u64, usize> = BTreeMap::new();
        let mut molecules: BTreeMap<u64, Residue> = BTreeMap::new();
        for (id, raw) in &atoms {
            let mut atom = Atom::new(raw.type_id.clone());
            if let Some(&mass) = masses.get(&raw.type_id) {
                atom.set_mass(mass)?;
            }
            atom.set_charge(raw.charge);
            let velocity = velocities.get(id).copied();
            next.add_atom(atom, raw.position, velocity);
            id_to_index.insert(*id, next.size() - 1);

            if let Some(molecule) = raw.molecule {
                molecules
                    .entry(molecule)
                    .or_insert_with(|| Residue::with_id("mol", molecule))
                    .add_atom(next.size() - 1);
            }
        }
        for (_, residue) in molecules {
            next.topology_mut().add_residue(residue)?;
        }
        for (a, b) in bonds {
            match (id_to_index.get(&a), id_to_index.get(&b)) {
                (Some(&i), Some(&j)) if i != j => next.add_bond(i, j, BondOrder::Unknown)?,
                _ => {
                    return Err(FormatError::malformed(
                        "LAMMPS Data",
                        format!("bond refers to unknown atom id {a} or {b}"),
                    ))
                }
            }
        }

        self.exhausted = true;
        *frame = next;
        Ok(())
    }

    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<(), FormatError> {
        if step != 0 {
            return Err(FormatError::StepOutOfRange { step, nsteps: 1 });
        }
        self.file.rewind()?;
        self.exhausted = false;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<(), FormatError> {
        if self.nwritten > 0 {
            return Err(FormatError::NotAppendable("LAMMPS Data".into()));
        }

        writeln!(self.file, "LAMMPS data file written by mdio").map_err(FileError::from)?;
        writeln!(self.file).map_err(FileError::from)?;

        // Types are numbered in order of first appearance
        let mut type_ids: BTreeMap<String, usize> = BTreeMap::new();
        for atom in frame.topology().atoms() {
            let next_id = type_ids.len() + 1;
            type_ids.entry(atom.type_name().to_owned()).or_insert(next_id);
        }

        writeln!(self.file, "{} atoms", frame.size()).map_err(FileError::from)?;
        writeln!(self.file, "{} bonds", frame.topology().bonds().len())
            .map_err(FileError::from)?;
        writeln!(self.file, "{} atom types", type_ids.len()).map_err(FileError::from)?;
        writeln!(self.file).map_err(FileError::from)?;

        let cell = frame.cell();
        let m = cell.matrix();
        writeln!(self.file, "0.0 {:.6} xlo xhi", m[(0, 0)]).map_err(FileError::from)?;
        writeln!(self.file, "0.0 {:.6} ylo yhi", m[(1, 1)]).map_err(FileError::from)?;
        writeln!(self.file, "0.0 {:.6} zlo zhi", m[(2, 2)]).map_err(FileError::from)?;
        if cell.shape() == CellShape::Triclinic {
            writeln!(
                self.file,
                "{:.6} {:.6} {:.6} xy xz yz",
                m[(0, 1)],
                m[(0, 2)],
                m[(1, 2)]
            )
            .map_err(FileError::from)?;
        }
        writeln!(self.file).map_err(FileError::from)?;

        writeln!(self.file, "Masses").map_err(FileError::from)?;
        writeln!(self.file).map_err(FileError::from)?;
        let mut mass_by_type: BTreeMap<usize, f64> = BTreeMap::new();
        for atom in frame.topology().atoms() {
            mass_by_type
                .entry(type_ids[atom.type_name()])
                .or_insert(atom.mass());
        }
        for (type_id, mass) in &mass_by_type {
            writeln!(self.file, "{type_id} {mass:.6}").map_err(FileError::from)?;
        }
        writeln!(self.file).map_err(FileError::from)?;

        writeln!(self.file, "Atoms # full").map_err(FileError::from)?;
        writeln!(self.file).map_err(FileError::from)?;
        for i in 0..frame.size() {
            let topology = frame.topology();
            let atom = &topology[i];
            let molecule = topology
                .residue_for_atom(i)
                .and_then(|r| r.id())
                .unwrap_or(1);
            let p = frame.positions()[i];
            writeln!(
                self.file,
                "{} {} {} {:.6} {:.6} {:.6} {:.6}",
                i + 1,
                molecule,
                type_ids[atom.type_name()],
                atom.charge(),
                p[0],
                p[1],
                p[2]
            )
            .map_err(FileError::from)?;
        }

        if let Some(velocities) = frame.velocities() {
            writeln!(self.file).map_err(FileError::from)?;
            writeln!(self.file, "Velocities").map_err(FileError::from)?;
            writeln!(self.file).map_err(FileError::from)?;
            for (i, v) in velocities.iter().enumerate() {
                writeln!(self.file, "{} {:.6} {:.6} {:.6}", i + 1, v[0], v[1], v[2])
                    .map_err(FileError::from)?;
            }
        }

        if !frame.topology().bonds().is_empty() {
            writeln!(self.file).map_err(FileError::from)?;
            writeln!(self.file, "Bonds").map_err(FileError::from)?;
            writeln!(self.file).map_err(FileError::from)?;
            for (index, bond) in frame.topology().bonds().iter().enumerate() {
                writeln!(
                    self.file,
                    "{} 1 {} {}",
                    index + 1,
                    bond[0] + 1,
                    bond[1] + 1
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
