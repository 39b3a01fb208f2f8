//! The trajectory engine: streaming and random access over one file.

use std::path::{Path, PathBuf};

use crate::core::{ConfigurationError, Frame, Topology, UnitCell};
use crate::files::{Compression, FileError, Mode};
use crate::formats::{self, Format, FormatError};
use crate::Error;

/// An ordered sequence of frames read from or written to one file.
///
/// The trajectory owns its format adapter, which owns the file handle; the
/// handle is acquired on open and released when the trajectory is dropped.
/// [Trajectory::close] consumes the trajectory, so no operation can observe
/// a closed handle.
pub struct Trajectory {
    format: Option<Box<dyn Format>>,
    path: PathBuf,
    mode: Mode,
    step: usize,
    custom_topology: Option<Topology>,
    custom_cell: Option<UnitCell>,
}

impl std::fmt::Debug for Trajectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trajectory")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("step", &self.step)
            .finish()
    }
}

impl Trajectory {
    /// Open a trajectory for reading, inferring the format from the
    /// extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Trajectory, Error> {
        Trajectory::open_with(path, Mode::Read, None, Compression::Auto)
    }

    /// Create a trajectory for writing, inferring the format from the
    /// extension. An existing file is overwritten.
    pub fn create(path: impl AsRef<Path>) -> Result<Trajectory, Error> {
        Trajectory::open_with(path, Mode::Write, None, Compression::Auto)
    }

    /// Open a trajectory for appending.
    pub fn append(path: impl AsRef<Path>) -> Result<Trajectory, Error> {
        Trajectory::open_with(path, Mode::Append, None, Compression::Auto)
    }

    /// Full-control constructor: explicit mode, format name and
    /// compression. A given format name wins over the extension.
    pub fn open_with(
        path: impl AsRef<Path>,
        mode: Mode,
        format: Option<&str>,
        compression: Compression,
    ) -> Result<Trajectory, Error> {
        let path = path.as_ref().to_path_buf();
        let format = formats::create_format(&path, mode, format, compression).map_err(|source| {
            Error::Trajectory {
                path: path.clone(),
                source,
            }
        })?;
        Ok(Trajectory {
            format: Some(format),
            path,
            mode,
            step: 0,
            custom_topology: None,
            custom_cell: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of steps in the file.
    pub fn nsteps(&self) -> usize {
        self.format().nsteps()
    }

    /// Whether every step has been read.
    pub fn done(&self) -> bool {
        self.step >= self.nsteps()
    }

    /// Read the next step into a fresh frame.
    pub fn read(&mut self) -> Result<Frame, Error> {
        let mut frame = Frame::new();
        self.read_into(&mut frame)?;
        Ok(frame)
    }

    /// Read the next step into `frame`, overwriting it completely.
    pub fn read_into(&mut self, frame: &mut Frame) -> Result<(), Error> {
        if self.step >= self.nsteps() {
            return Err(self.with_path(FileError::NoMoreSteps.into()));
        }
        let result = self.format_mut().read(frame);
        result.map_err(|source| Error::Trajectory {
            path: self.path.clone(),
            source,
        })?;
        frame.set_step(self.step);
        self.step += 1;
        self.apply_overrides(frame)
    }

    /// Random-access read of step `step`. Later [Trajectory::read] calls
    /// continue from the following step.
    pub fn read_step(&mut self, step: usize) -> Result<Frame, Error> {
        let mut frame = Frame::new();
        self.read_step_into(step, &mut frame)?;
        Ok(frame)
    }

    pub fn read_step_into(&mut self, step: usize, frame: &mut Frame) -> Result<(), Error> {
        let nsteps = self.nsteps();
        if step >= nsteps {
            return Err(self.with_path(FormatError::StepOutOfRange { step, nsteps }));
        }
        let result = self.format_mut().read_step(step, frame);
        result.map_err(|source| Error::Trajectory {
            path: self.path.clone(),
            source,
        })?;
        frame.set_step(step);
        self.step = step + 1;
        self.apply_overrides(frame)
    }

    /// Append `frame` to the file.
    pub fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        if self.mode == Mode::Read {
            return Err(self.with_path(FileError::WrongMode("writing").into()));
        }
        let result = self.format_mut().write(frame);
        result.map_err(|source| Error::Trajectory {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the topology of every frame read from now on. The size must
    /// match the frames coming out of the file.
    pub fn set_topology(&mut self, topology: Topology) {
        self.custom_topology = Some(topology);
    }

    /// Read the topology of the first frame of `path` and use it as the
    /// topology override.
    pub fn set_topology_from_file(
        &mut self,
        path: impl AsRef<Path>,
        format: Option<&str>,
    ) -> Result<(), Error> {
        let mut trajectory =
            Trajectory::open_with(path, Mode::Read, format, Compression::Auto)?;
        let frame = trajectory.read_step(0)?;
        self.custom_topology = Some(frame.topology().clone());
        Ok(())
    }

    /// Replace the cell of every frame read from now on.
    pub fn set_cell(&mut self, cell: UnitCell) {
        self.custom_cell = Some(cell);
    }

    /// Flush buffered writes and release the file. Dropping the trajectory
    /// also releases the file, but only closing reports flush errors.
    pub fn close(mut self) -> Result<(), Error> {
        if let Some(mut format) = self.format.take() {
            format.finish().map_err(|source| Error::Trajectory {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&self, frame: &mut Frame) -> Result<(), Error> {
        if let Some(topology) = &self.custom_topology {
            if topology.size() != frame.size() {
                return Err(ConfigurationError::TopologySize {
                    new: topology.size(),
                    frame: frame.size(),
                }
                .into());
            }
            frame.set_topology(topology.clone())?;
        } else if self.format().guess_bonds_after_read() {
            frame.guess_bonds()?;
        }
        if let Some(cell) = &self.custom_cell {
            frame.set_cell(cell.clone());
        }
        Ok(())
    }

    fn with_path(&self, source: FormatError) -> Error {
        Error::Trajectory {
            path: self.path.clone(),
            source,
        }
    }

    fn format(&self) -> &dyn Format {
        self.format
            .as_deref()
            .unwrap_or_else(|| unreachable!("the format is only taken on close"))
    }

    fn format_mut(&mut self) -> &mut Box<dyn Format> {
        self.format
            .as_mut()
            .unwrap_or_else(|| unreachable!("the format is only taken on close"))
    }
}

impl Drop for Trajectory {
    fn drop(&mut self) {
        if let Some(mut format) = self.format.take() {
            let _ = format.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Atom, CellShape, Vector3D};

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mdio-traj-{}-{}", std::process::id(), name));
        path
    }

    const WATER_XYZ: &str = "\
3
water 0
O 0.417219 8.303366 11.737172
H 1.320290 8.480326 11.470000
H 0.332400 8.726662 12.617169
3
water 1
O 0.500000 8.300000 11.700000
H 1.300000 8.500000 11.400000
H 0.300000 8.700000 12.600000
3
water 2
O 0.600000 8.300000 11.600000
H 1.300000 8.500000 11.300000
H 0.300000 8.700000 12.500000
";

    #[test]
    fn sequential_and_random_reads() -> anyhow::Result<()> {
        let path = temp_path("water.xyz");
        std::fs::write(&path, WATER_XYZ)?;

        let mut trajectory = Trajectory::open(&path)?;
        assert_eq!(trajectory.nsteps(), 3);
        assert!(!trajectory.done());

        let frame = trajectory.read()?;
        assert_eq!(frame.step(), 0);
        assert!(
            (frame.positions()[0] - Vector3D::new(0.417219, 8.303366, 11.737172)).norm() < 1e-5
        );

        let frame = trajectory.read()?;
        assert_eq!(frame.step(), 1);
        let frame = trajectory.read()?;
        assert_eq!(frame.step(), 2);
        assert!(trajectory.done());

        let err = trajectory.read().unwrap_err();
        assert!(err.to_string().contains("no more steps"));

        let frame = trajectory.read_step(1)?;
        assert_eq!(frame.step(), 1);
        assert!((frame.positions()[0][0] - 0.5).abs() < 1e-9);
        // Sequential reading continues after the random access
        let frame = trajectory.read()?;
        assert_eq!(frame.step(), 2);

        assert!(matches!(
            trajectory.read_step(3),
            Err(Error::Trajectory {
                source: FormatError::StepOutOfRange { step: 3, nsteps: 3 },
                ..
            })
        ));

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn unknown_extension() {
        let err = Trajectory::open("file.what").unwrap_err();
        assert!(err.to_string().contains("cannot find a format"));
    }

    #[test]
    fn explicit_format_name_wins() -> anyhow::Result<()> {
        let path = temp_path("named.data");
        std::fs::write(&path, WATER_XYZ)?;

        assert!(Trajectory::open(&path).is_err());
        let mut trajectory =
            Trajectory::open_with(&path, Mode::Read, Some("XYZ"), Compression::Auto)?;
        assert_eq!(trajectory.nsteps(), 3);
        assert_eq!(trajectory.read()?.size(), 3);

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn topology_and_cell_overrides() -> anyhow::Result<()> {
        let path = temp_path("override.xyz");
        std::fs::write(&path, WATER_XYZ)?;

        let mut trajectory = Trajectory::open(&path)?;

        let mut topology = Topology::new();
        topology.add_atom(Atom::new("OW"));
        topology.add_atom(Atom::new("HW"));
        topology.add_atom(Atom::new("HW"));
        trajectory.set_topology(topology);
        trajectory.set_cell(UnitCell::orthorhombic(15.0, 15.0, 15.0)?);

        let frame = trajectory.read()?;
        assert_eq!(frame.topology()[0].name(), "OW");
        assert_eq!(frame.cell().shape(), CellShape::Orthorhombic);
        assert!((frame.cell().a() - 15.0).abs() < 1e-9);

        // A mismatched topology fails the read
        let mut short = Topology::new();
        short.add_atom(Atom::new("X"));
        trajectory.set_topology(short);
        assert!(trajectory.read().is_err());

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn write_and_append() -> anyhow::Result<()> {
        let path = temp_path("written.xyz");

        let mut frame = Frame::new();
        frame.add_atom(Atom::new("C"), Vector3D::new(1.0, 2.0, 3.0), None);

        let mut trajectory = Trajectory::create(&path)?;
        trajectory.write(&frame)?;
        trajectory.close()?;

        let mut trajectory = Trajectory::append(&path)?;
        frame.positions_mut()[0][0] = 4.0;
        trajectory.write(&frame)?;
        trajectory.close()?;

        let mut trajectory = Trajectory::open(&path)?;
        assert_eq!(trajectory.nsteps(), 2);
        assert!((trajectory.read_step(1)?.positions()[0][0] - 4.0).abs() < 1e-9);

        // Writing to a read-mode trajectory fails
        assert!(trajectory.write(&frame).is_err());

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn set_topology_from_file() -> anyhow::Result<()> {
        let xyz_path = temp_path("coords.xyz");
        std::fs::write(&xyz_path, WATER_XYZ)?;

        let gro_path = temp_path("top.gro");
        let gro = "\
water
    3
    1SOL    OW1    1   0.042   0.830   1.174
    1SOL    HW2    2   0.132   0.848   1.147
    1SOL    HW3    3   0.033   0.873   1.262
   2.00000   2.00000   2.00000
";
        std::fs::write(&gro_path, gro)?;

        let mut trajectory = Trajectory::open(&xyz_path)?;
        trajectory.set_topology_from_file(&gro_path, None)?;
        let frame = trajectory.read()?;
        assert_eq!(frame.topology()[0].name(), "OW1");
        assert_eq!(frame.topology().residue_for_atom(0).unwrap().name(), "SOL");
        // The coordinates still come from the trajectory itself
        assert!((frame.positions()[0][0] - 0.417219).abs() < 1e-5);

        std::fs::remove_file(&xyz_path)?;
        std::fs::remove_file(&gro_path)?;
        Ok(())
    }
}
