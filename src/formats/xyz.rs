use std::io::Write;
use std::path::Path;

use crate::core::{Atom, Frame, Vector3D};
use crate::files::{Compression, FileError, Mode, TextFile};
use crate::formats::{Format, FormatError, FormatMetadata};

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "XYZ",
    extension: Some("xyz"),
    description: "XYZ text format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(XyzFormat::new(path, mode, compression)?))
}

/// Adapter for the XYZ format: a count line, a comment line, then one
/// `NAME X Y Z` line per atom, with three optional trailing floats read as
/// velocities. Positions are in angstroms.
pub struct XyzFormat {
    file: TextFile,
    step_positions: Vec<u64>,
    nwritten: usize,
}

impl XyzFormat {
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
        Ok(XyzFormat {
            file,
            step_positions,
            nwritten: 0,
        })
    }
}

/// Fast-forward over one step, returning false when the file has no more
/// steps.
fn forward(file: &mut TextFile) -> Result<bool, FormatError> {
    let natoms = match file.readline() {
        Ok(line) => match line.trim().parse::<usize>() {
            Ok(n) => n,
            // Trailing garbage, give up on indexing more steps
            Err(_) => return Ok(false),
        },
        Err(FileError::Eof) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    // Comment line + atom lines
    file.readlines(natoms + 1).map_err(|_| {
        FormatError::malformed("XYZ", format!("expected {} atom lines", natoms))
    })?;
    Ok(true)
}

impl Format for XyzFormat {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        let natoms = match self.file.readline() {
            Ok(line) => line.trim().parse::<usize>()?,
            Err(FileError::Eof) => return Err(FileError::NoMoreSteps.into()),
            Err(e) => return Err(e.into()),
        };

        let mut next = Frame::new();
        next.set("name", self.file.readline()?);

        for (i, line) in self.file.readlines(natoms)?.iter().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(FormatError::malformed(
                    "XYZ",
                    format!("atom line {} is too short: '{}'", i + 1, line),
                ));
            }
            let position = Vector3D::new(
                fields[1].parse()?,
                fields[2].parse()?,
                fields[3].parse()?,
            );
            // The first atom line decides whether the file carries velocities
            if i == 0 && fields.len() >= 7 {
                next.add_velocities();
            }
            let velocity = if next.has_velocities() && fields.len() >= 7 {
                Some(Vector3D::new(
                    fields[4].parse()?,
                    fields[5].parse()?,
                    fields[6].parse()?,
                ))
            } else {
                None
            };
            next.add_atom(Atom::new(fields[0]), position, velocity);
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
        let comment = frame
            .get("name")
            .and_then(|p| p.as_string().ok())
            .unwrap_or("written by mdio");
        writeln!(self.file, "{}", frame.size()).map_err(FileError::from)?;
        writeln!(self.file, "{}", comment).map_err(FileError::from)?;

        let velocities = frame.velocities();
        for (i, position) in frame.positions().iter().enumerate() {
            let name = match frame.topology()[i].name() {
                "" => "X",
                name => name,
            };
            match velocities {
                Some(velocities) => {
                    let v = velocities[i];
                    writeln!(
                        self.file,
                        "{} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
                        name, position[0], position[1], position[2], v[0], v[1], v[2]
                    )
                }
                None => writeln!(
                    self.file,
                    "{} {:.6} {:.6} {:.6}",
                    name, position[0], position[1], position[2]
                ),
            }
            .map_err(FileError::from)?;
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
    use crate::files::Compression;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mdio-xyz-{}-{}", std::process::id(), name));
        path
    }

    const TWO_STEPS: &str = "3\nfirst frame\nO 0.417219 8.303366 11.737172\nH 1.320290 8.480326 11.470000\nH 0.332400 8.726662 12.617169\n\
3\nsecond frame\nO 0.500000 8.300000 11.700000\nH 1.300000 8.500000 11.400000\nH 0.300000 8.700000 12.600000\n";

    #[test]
    fn read() -> anyhow::Result<()> {
        let path = temp_path("read.xyz");
        std::fs::write(&path, TWO_STEPS)?;

        let mut format = XyzFormat::new(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 2);

        let mut frame = Frame::new();
        format.read(&mut frame)?;
        assert_eq!(frame.size(), 3);
        assert_eq!(frame.get("name").unwrap().as_string()?, "first frame");
        assert_eq!(frame.topology()[0].name(), "O");
        let p = frame.positions()[0];
        assert!((p - Vector3D::new(0.417219, 8.303366, 11.737172)).norm() < 1e-5);
        assert!(frame.velocities().is_none());

        format.read(&mut frame)?;
        assert_eq!(frame.get("name").unwrap().as_string()?, "second frame");

        let err = format.read(&mut frame);
        assert!(matches!(
            err,
            Err(FormatError::File(FileError::NoMoreSteps))
        ));

        // Random access goes back to any step
        format.read_step(0, &mut frame)?;
        assert_eq!(frame.get("name").unwrap().as_string()?, "first frame");
        assert!(matches!(
            format.read_step(2, &mut frame),
            Err(FormatError::StepOutOfRange { step: 2, nsteps: 2 })
        ));

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn write_read_roundtrip() -> anyhow::Result<()> {
        let path = temp_path("write.xyz");
        let mut frame = Frame::new();
        frame.add_velocities();
        frame.add_atom(
            Atom::new("O"),
            Vector3D::new(1.5, -2.25, 3.125),
            Some(Vector3D::new(0.1, 0.2, 0.3)),
        );
        frame.add_atom(Atom::new("H"), Vector3D::new(0.0, 0.0, 0.0), None);
        frame.set("name", "roundtrip");

        {
            let mut format = XyzFormat::new(&path, Mode::Write, Compression::Auto)?;
            format.write(&frame)?;
            assert_eq!(format.nsteps(), 1);
            format.finish()?;
        }

        let mut format = XyzFormat::new(&path, Mode::Read, Compression::Auto)?;
        let mut copy = Frame::new();
        format.read(&mut copy)?;
        assert_eq!(copy.size(), 2);
        assert_eq!(copy.get("name").unwrap().as_string()?, "roundtrip");
        assert_eq!(copy.positions()[0], Vector3D::new(1.5, -2.25, 3.125));
        assert_eq!(copy.velocities().unwrap()[0], Vector3D::new(0.1, 0.2, 0.3));
        assert_eq!(copy.topology()[1].name(), "H");

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn gzip_read() -> anyhow::Result<()> {
        let path = temp_path("read.xyz.gz");
        {
            let mut file = TextFile::open(&path, Mode::Write, Compression::Auto)?;
            file.write_str(TWO_STEPS)?;
            file.close()?;
        }

        let mut format = XyzFormat::new(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(format.nsteps(), 2);
        let mut frame = Frame::new();
        format.read_step(1, &mut frame)?;
        assert_eq!(frame.get("name").unwrap().as_string()?, "second frame");

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
