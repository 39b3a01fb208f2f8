use std::io::Write;
use std::path::Path;

use crate::core::{Atom, BondOrder, Frame, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};
use crate::warning;

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "SDF",
    extension: Some("sdf"),
    description: "Structural Data File (MDL molfile) format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(SdfFormat::new(path, mode, compression)?))
}

/// Adapter for the SDF format: concatenated V2000 molfiles separated by
/// `$$$$`, with `> <key>` data items stored as frame properties.
pub struct SdfFormat {
    file: TextFile,
    step_positions: Vec<u64>,
    nwritten: usize,
}

impl SdfFormat {
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
        Ok(SdfFormat {
            file,
            step_positions,
            nwritten: 0,
        })
    }
}

fn forward(file: &mut TextFile) -> Result<bool, FormatError> {
    // Check that a molecule actually starts here: three header lines and
    // a counts line
    let mut seen_content = false;
    for _ in 0..4 {
        match file.readline() {
            Ok(line) => {
                if !line.trim().is_empty() {
                    seen_content = true;
                }
            }
            Err(FileError::Eof) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
    }
    if !seen_content {
        return Ok(false);
    }
    // Skip to the record separator
    loop {
        match file.readline() {
            Ok(line) => {
                if line.starts_with("$$$$") {
                    return Ok(true);
                }
            }
            // A final record without the $$$$ terminator still counts
            Err(FileError::Eof) => return Ok(true),
            Err(e) => return Err(e.into()),
        }
    }
}

fn bond_order_to_sdf(order: BondOrder) -> usize {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
        _ => 8,
    }
}

fn bond_order_from_sdf(code: usize) -> BondOrder {
    match code {
        1 => BondOrder::Single,
        2 => BondOrder::Double,
        3 => BondOrder::Triple,
        4 => BondOrder::Aromatic,
        _ => BondOrder::Unknown,
    }
}

impl Format for SdfFormat {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        let name_line = match self.file.readline() {
            Ok(line) => line,
            Err(FileError::Eof) => return Err(FileError::NoMoreSteps.into()),
            Err(e) => return Err(e.into()),
        };

        let mut next = Frame::new();
        if !name_line.trim().is_empty() {
            next.set("name", name_line.trim());
        }
        // Program and comment lines are not stored
        self.file.readlines(2)?;

        let counts = self.file.readline()?;
        if counts.len() < 6 {
            return Err(FormatError::malformed(
                "SDF",
                format!("counts line is too short: '{counts}'"),
            ));
        }
        let natoms: usize = counts[0..3].trim().parse()?;
        let nbonds: usize = counts[3..6].trim().parse()?;

        for line in self.file.readlines(natoms)? {
            if line.len() < 34 {
                return Err(FormatError::malformed(
                    "SDF",
                    format!("atom line is too short: '{line}'"),
                ));
            }
            let x: f64 = line[0..10].trim().parse()?;
            let y: f64 = line[10..20].trim().parse()?;
            let z: f64 = line[20..30].trim().parse()?;
            let symbol = line[31..34].trim();
            next.add_atom(Atom::new(symbol), Vector3D::new(x, y, z), None);
        }

        for line in self.file.readlines(nbonds)? {
            if line.len() < 9 {
                return Err(FormatError::malformed(
                    "SDF",
                    format!("bond line is too short: '{line}'"),
                ));
            }
            let i: usize = line[0..3].trim().parse()?;
            let j: usize = line[3..6].trim().parse()?;
            let code: usize = line[6..9].trim().parse()?;
            if i == 0 || j == 0 || i > natoms || j > natoms {
                return Err(FormatError::malformed(
                    "SDF",
                    format!("bond refers to out-of-range atom: '{line}'"),
                ));
            }
            next.add_bond(i - 1, j - 1, bond_order_from_sdf(code))?;
        }

        // Properties block ("M ..." lines), data items and the separator
        let mut data_key: Option<String> = None;
        loop {
            let line = match self.file.readline() {
                Ok(line) => line,
                Err(FileError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            if line.starts_with("$$$$") {
                break;
            }
            if let Some(key) = line.trim().strip_prefix("> <").and_then(|s| s.strip_suffix('>')) {
                data_key = Some(key.to_owned());
                continue;
            }
            if let Some(key) = data_key.take() {
                next.set(key, line.trim());
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
        if frame.size() > 999 || frame.topology().bonds().len() > 999 {
            warning("too many atoms or bonds for the V2000 counts line");
        }

        let name = frame
            .get("name")
            .and_then(|p| p.as_string().ok())
            .unwrap_or("NONAME");
        writeln!(self.file, "{name}").map_err(FileError::from)?;
        writeln!(self.file, " mdio").map_err(FileError::from)?;
        writeln!(self.file).map_err(FileError::from)?;

        writeln!(
            self.file,
            "{: >3}{: >3}  0     0  0  0  0  0  0999 V2000",
            frame.size(),
            frame.topology().bonds().len()
        )
        .map_err(FileError::from)?;

        for (i, position) in frame.positions().iter().enumerate() {
            // The symbol column holds the element, which is the atom type
            let symbol = match frame.topology()[i].type_name() {
                "" => "Xxx",
                type_name => type_name,
            };
            writeln!(
                self.file,
                "{:>10.4}{:>10.4}{:>10.4} {: <3} 0  0  0  0  0  0  0  0  0  0  0  0",
                position[0], position[1], position[2], symbol
            )
            .map_err(FileError::from)?;
        }

        let topology = frame.topology();
        for (bond, order) in topology.bonds().iter().zip(topology.bond_orders()) {
            writeln!(
                self.file,
                "{: >3}{: >3}{: >3}  0  0  0  0",
                bond[0] + 1,
                bond[1] + 1,
                bond_order_to_sdf(*order)
            )
            .map_err(FileError::from)?;
        }

        writeln!(self.file, "M END").map_err(FileError::from)?;

        for (key, value) in frame.properties() {
            if key == "name" {
                continue;
            }
            if let Ok(value) = value.as_string() {
                writeln!(self.file, "> <{key}>").map_err(FileError::from)?;
                writeln!(self.file, "{value}").map_err(FileError::from)?;
                writeln!(self.file).map_err(FileError::from)?;
            }
        }

        writeln!(self.file, "$$$$").map_err(FileError::from)?;
        self.nwritten += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FormatError> {
        Ok(self.file.finish()?)
    }
}
