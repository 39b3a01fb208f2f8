use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::core::{Atom, BondOrder, CellShape, Frame, Residue, UnitCell, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "MOL2",
    extension: Some("mol2"),
    description: "Tripos MOL2 text format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(Mol2Format::new(path, mode, compression)?))
}

/// Adapter for the Tripos MOL2 format. Every `@<TRIPOS>MOLECULE` record is
/// one step; substructures become residues and `@<TRIPOS>CRYSIN` the cell.
pub struct Mol2Format {
    file: TextFile,
    step_positions: Vec<u64>,
    // Whether the previous read already consumed the next record's
    // @<TRIPOS>MOLECULE line
    at_molecule_start: bool,
    nwritten: usize,
}

impl Mol2Format {
    pub fn new(path: &Path, mode: Mode, compression: Compression) -> Result<Self, FormatError> {
        let mut file = TextFile::open(path, mode, compression)?;
        let mut step_positions = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tellg()?;
                let line = match file.readline() {
                    Ok(line) => line,
                    Err(FileError::Eof) => break,
                    Err(e) => return Err(e.into()),
                };
                if line.trim_end() == "@<TRIPOS>MOLECULE" {
                    step_positions.push(position);
                }
            }
            file.rewind()?;
        }
        Ok(Mol2Format {
            file,
            step_positions,
            at_molecule_start: false,
            nwritten: 0,
        })
    }
}

fn bond_order_to_mol2(order: BondOrder) -> &'static str {
    match order {
        BondOrder::Single => "1",
        BondOrder::Double => "2",
        BondOrder::Triple => "3",
        BondOrder::Aromatic => "ar",
        BondOrder::Amide => "am",
        _ => "un",
    }
}

fn bond_order_from_mol2(code: &str) -> BondOrder {
    match code {
        "1" => BondOrder::Single,
        "2" => BondOrder::Double,
        "3" => BondOrder::Triple,
        "ar" => BondOrder::Aromatic,
        "am" => BondOrder::Amide,
        _ => BondOrder::Unknown,
    }
}

impl Format for Mol2Format {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        // Find the start of the next molecule, unless the previous read
        // already consumed its header line
        let mut found = std::mem::take(&mut self.at_molecule_start);
        while !found {
            match self.file.readline() {
                Ok(line) => {
                    if line.trim_end() == "@<TRIPOS>MOLECULE" {
                        found = true;
                    }
                }
                Err(FileError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        if !found {
            return Err(FileError::NoMoreSteps.into());
        }

        let mut next = Frame::new();

        let name = self.file.readline()?;
        if !name.trim().is_empty() {
            next.set("name", name.trim());
        }
        let counts = self.file.readline()?;
        let mut counts = counts.split_whitespace();
        let natoms: usize = counts
            .next()
            .ok_or_else(|| FormatError::malformed("MOL2", "missing atom count"))?
            .parse()?;
        let nbonds: usize = counts.next().unwrap_or("0").parse()?;

        // resid -> (resname, atom indices)
        let mut residues: BTreeMap<u64, Residue> = BTreeMap::new();
        let mut natoms_read = 0;
        let mut nbonds_read = 0;
        let mut in_section = String::new();

        loop {
            let line = match self.file.readline() {
                Ok(line) => line,
                Err(FileError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let trimmed = line.trim_end();
            if trimmed == "@<TRIPOS>MOLECULE" {
                self.at_molecule_start = true;
                break;
            }
            if let Some(section) = trimmed.strip_prefix("@<TRIPOS>") {
                in_section = section.to_owned();
                continue;
            }
            match in_section.as_str() {
                "ATOM" if natoms_read < natoms => {
                    let fields: Vec<&str> = trimmed.split_whitespace().collect();
                    if fields.len() < 6 {
                        return Err(FormatError::malformed(
                            "MOL2",
                            format!("atom line is too short: '{trimmed}'"),
                        ));
                    }
                    let name = fields[1];
                    let x: f64 = fields[2].parse()?;
                    let y: f64 = fields[3].parse()?;
                    let z: f64 = fields[4].parse()?;
                    let type_name = fields[5];
                    let mut atom = Atom::with_type(name, type_name);
                    if let Some(charge) = fields.get(8) {
                        atom.set_charge(charge.parse()?);
                    }
                    next.add_atom(atom, Vector3D::new(x, y, z), None);
                    natoms_read += 1;

                    if let (Some(resid), Some(resname)) = (fields.get(6), fields.get(7)) {
                        let resid: u64 = resid.parse()?;
                        residues
                            .entry(resid)
                            .or_insert_with(|| Residue::with_id(resname.to_string(), resid))
                            .add_atom(next.size() - 1);
                    }
                }
                "BOND" if nbonds_read < nbonds => {
                    let fields: Vec<&str> = trimmed.split_whitespace().collect();
                    if fields.len() < 4 {
                        return Err(FormatError::malformed(
                            "MOL2",
                            format!("bond line is too short: '{trimmed}'"),
                        ));
                    }
                    let i: usize = fields[1].parse()?;
                    let j: usize = fields[2].parse()?;
                    if i == 0 || j == 0 || i > natoms || j > natoms {
                        return Err(FormatError::malformed(
                            "MOL2",
                            format!("bond refers to out-of-range atom: '{trimmed}'"),
                        ));
                    }
                    next.add_bond(i - 1, j - 1, bond_order_from_mol2(fields[3]))?;
                    nbonds_read += 1;
                }
                "CRYSIN" => {
                    let fields: Vec<&str> = trimmed.split_whitespace().collect();
                    if fields.len() >= 6 {
                        next.set_cell(UnitCell::triclinic(
                            fields[0].parse()?,
                            fields[1].parse()?,
                            fields[2].parse()?,
                            fields[3].parse()?,
                            fields[4].parse()?,
                            fields[5].parse()?,
                        )?);
                    }
                    in_section.clear();
                }
                _ => {}
            }
        }

        if natoms_read != natoms {
            return Err(FormatError::malformed(
                "MOL2",
                format!("expected {natoms} atoms, found {natoms_read}"),
            ));
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
        self.at_molecule_start = false;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<(), FormatError> {
        let name = frame
            .get("name")
            .and_then(|p| p.as_string().ok())
            .unwrap_or("molecule");

        writeln!(self.file, "@<TRIPOS>MOLECULE").map_err(FileError::from)?;
        writeln!(self.file, "{name}").map_err(FileError::from)?;
        writeln!(
            self.file,
            "{: >4} {: >4}    1    0    0",
            frame.size(),
            frame.topology().bonds().len()
        )
        .map_err(FileError::from)?;
        writeln!(self.file, "SMALL").map_err(FileError::from)?;
        writeln!(self.file, "USER_CHARGES").map_err(FileError::from)?;

        if frame.cell().shape() != CellShape::Infinite {
            let cell = frame.cell();
            writeln!(self.file, "@<TRIPOS>CRYSIN").map_err(FileError::from)?;
            writeln!(
                self.file,
                "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} 1 1",
                cell.a(),
                cell.b(),
                cell.c(),
                cell.alpha(),
                cell.beta(),
                cell.gamma()
            )
            .map_err(FileError::from)?;
        }

        writeln!(self.file, "@<TRIPOS>ATOM").map_err(FileError::from)?;
        for i in 0..frame.size() {
            let topology = frame.topology();
            let atom = &topology[i];
            let position = frame.positions()[i];
            let residue = topology.residue_for_atom(i);
            let resid = residue.and_then(|r| r.id()).unwrap_or(1);
            let resname = residue.map(|r| r.name()).unwrap_or("RES");
            let type_name = match atom.type_name() {
                "" => "Du",
                type_name => type_name,
            };
            writeln!(
                self.file,
                "{: >7} {: <7} {:>10.4} {:>10.4} {:>10.4} {: <7} {: >3} {: <7} {:>9.4}",
                i + 1,
                atom.name(),
                position[0],
                position[1],
                position[2],
                type_name,
                resid,
                resname,
                atom.charge()
            )
            .map_err(FileError::from)?;
        }

        writeln!(self.file, "@<TRIPOS>BOND").map_err(FileError::from)?;
        let topology = frame.topology();
        for (index, (bond, order)) in topology
            .bonds()
            .iter()
            .zip(topology.bond_orders())
            .enumerate()
        {
            writeln!(
                self.file,
                "{: >6} {: >5} {: >5} {: >4}",
                index + 1,
                bond[0] + 1,
                bond[1] + 1,
                bond_order_to_mol2(*order)
            )
            .map_err(FileError::from)?;
        }
        writeln!(self.file).map_err(FileError::from)?;

        self.nwritten += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FormatError> {
        Ok(self.file.finish()?)
    }
}
