use std::path::Path;

use crate::core::{Atom, Frame, Matrix3D, UnitCell, Vector3D};
use crate::files::{BinaryFile, Compression, FileError, Mode};
use crate::formats::{Format, FormatError, FormatMetadata};

pub(crate) const METADATA: FormatMetadata = FormatMetadata {
    name: "TRR",
    extension: Some("trr"),
    description: "GROMACS TRR binary format",
    supports_read: true,
    supports_write: true,
    supports_append: true,
};

pub(crate) fn factory(
    path: &Path,
    mode: Mode,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    Ok(Box::new(TrrFormat::new(path, mode, compression)?))
}

const TRR_MAGIC: i32 = 1993;
const TRR_VERSION: &str = "GMX_trn_file";

/// Adapter for the GROMACS TRR format: big-endian XDR frames, each with a
/// header of record sizes followed by box, position, velocity and force
/// blocks. Values are nanometers on disk and angstroms in memory; both
/// single and double precision files are read, single precision is written.
pub struct TrrFormat {
    file: BinaryFile,
    step_positions: Vec<u64>,
    nwritten: usize,
}

#[derive(Debug, Clone, Copy)]
struct TrrHeader {
    use_double: bool,
    box_size: usize,
    vir_size: usize,
    pres_size: usize,
    x_size: usize,
    v_size: usize,
    f_size: usize,
    natoms: usize,
    time: f64,
}

impl TrrHeader {
    fn data_size(&self) -> u64 {
        (self.box_size + self.vir_size + self.pres_size + self.x_size + self.v_size + self.f_size)
            as u64
    }
}

fn read_i32(file: &mut BinaryFile) -> Result<i32, FileError> {
    let mut buffer = [0u8; 4];
    file.read_exact(&mut buffer)?;
    Ok(i32::from_be_bytes(buffer))
}

fn read_f32(file: &mut BinaryFile) -> Result<f32, FileError> {
    let mut buffer = [0u8; 4];
    file.read_exact(&mut buffer)?;
    Ok(f32::from_be_bytes(buffer))
}

fn read_f64(file: &mut BinaryFile) -> Result<f64, FileError> {
    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)?;
    Ok(f64::from_be_bytes(buffer))
}

fn read_real(file: &mut BinaryFile, use_double: bool) -> Result<f64, FileError> {
    if use_double {
        read_f64(file)
    } else {
        read_f32(file).map(f64::from)
    }
}

/// XDR strings are a length, the bytes (including the terminator), and
/// padding to a four-byte boundary.
fn read_xdr_string(file: &mut BinaryFile) -> Result<String, FormatError> {
    let length = read_i32(file)?;
    if !(0..=1024).contains(&length) {
        return Err(FormatError::malformed(
            "TRR",
            format!("invalid string length {length}"),
        ));
    }
    let padded = (length as usize).div_ceil(4) * 4;
    let mut buffer = vec![0u8; padded];
    file.read_exact(&mut buffer)?;
    let end = buffer
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(length as usize);
    Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
}

fn write_i32(file: &mut BinaryFile, value: i32) -> Result<(), FileError> {
    file.write_bytes(&value.to_be_bytes())
}

fn write_f32(file: &mut BinaryFile, value: f32) -> Result<(), FileError> {
    file.write_bytes(&value.to_be_bytes())
}

fn write_xdr_string(file: &mut BinaryFile, value: &str) -> Result<(), FileError> {
    let bytes = value.as_bytes();
    let length = bytes.len() + 1;
    write_i32(file, length as i32)?;
    let padded = length.div_ceil(4) * 4;
    let mut buffer = vec![0u8; padded];
    buffer[..bytes.len()].copy_from_slice(bytes);
    file.write_bytes(&buffer)
}

/// Read one frame header, or None on a clean end of file.
fn read_header(file: &mut BinaryFile) -> Result<Option<TrrHeader>, FormatError> {
    let magic = match read_i32(file) {
        Ok(magic) => magic,
        Err(FileError::Eof) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if magic != TRR_MAGIC {
        return Err(FormatError::malformed(
            "TRR",
            format!("invalid magic number {magic}"),
        ));
    }
    let version = read_xdr_string(file)?;
    if version != TRR_VERSION {
        return Err(FormatError::malformed(
            "TRR",
            format!("unexpected version string '{version}'"),
        ));
    }

    let _ir_size = read_i32(file)?;
    let _e_size = read_i32(file)?;
    let box_size = read_i32(file)? as usize;
    let vir_size = read_i32(file)? as usize;
    let pres_size = read_i32(file)? as usize;
    let _top_size = read_i32(file)?;
    let _sym_size = read_i32(file)?;
    let x_size = read_i32(file)? as usize;
    let v_size = read_i32(file)? as usize;
    let f_size = read_i32(file)? as usize;
    let natoms = read_i32(file)? as usize;
    let _step = read_i32(file)?;
    let _nre = read_i32(file)?;

    // Precision comes from the record sizes
    let use_double = if box_size != 0 {
        box_size / 9 == 8
    } else if natoms != 0 && x_size != 0 {
        x_size / (3 * natoms) == 8
    } else {
        false
    };

    let time = read_real(file, use_double)?;
    let _lambda = read_real(file, use_double)?;

    Ok(Some(TrrHeader {
        use_double,
        box_size,
        vir_size,
        pres_size,
        x_size,
        v_size,
        f_size,
        natoms,
        time,
    }))
}

fn read_box(file: &mut BinaryFile, use_double: bool) -> Result<UnitCell, FormatError> {
    // GROMACS stores the cell vectors as rows, in nanometers
    let mut matrix = Matrix3D::zeros();
    for i in 0..3 {
        for j in 0..3 {
            matrix[(j, i)] = read_real(file, use_double)? * 10.0;
        }
    }
    Ok(UnitCell::from_matrix(matrix)?)
}

fn read_vectors(
    file: &mut BinaryFile,
    use_double: bool,
    natoms: usize,
) -> Result<Vec<Vector3D>, FormatError> {
    let mut vectors = Vec::with_capacity(natoms);
    for _ in 0..natoms {
        let x = read_real(file, use_double)? * 10.0;
        let y = read_real(file, use_double)? * 10.0;
        let z = read_real(file, use_double)? * 10.0;
        vectors.push(Vector3D::new(x, y, z));
    }
    Ok(vectors)
}

impl TrrFormat {
    pub fn new(path: &Path, mode: Mode, compression: Compression) -> Result<Self, FormatError> {
        let mut file = BinaryFile::open(path, mode, compression)?;
        let mut step_positions = Vec::new();
        if mode == Mode::Read {
            loop {
                let position = file.tell()?;
                match read_header(&mut file)? {
                    Some(header) => {
                        step_positions.push(position);
                        file.skip(header.data_size())?;
                    }
                    None => break,
                }
            }
            file.seek(0)?;
        }
        Ok(TrrFormat {
            file,
            step_positions,
            nwritten: 0,
        })
    }
}

impl Format for TrrFormat {
    fn nsteps(&self) -> usize {
        self.step_positions.len() + self.nwritten
    }

    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError> {
        let header = match read_header(&mut self.file)? {
            Some(header) => header,
            None => return Err(FileError::NoMoreSteps.into()),
        };

        let mut next = Frame::new();
        next.set("time", header.time);

        if header.box_size != 0 {
            next.set_cell(read_box(&mut self.file, header.use_double)?);
        }
        // Virial and pressure tensors are not part of the model
        self.file
            .skip((header.vir_size + header.pres_size) as u64)?;

        let positions = if header.x_size != 0 {
            read_vectors(&mut self.file, header.use_double, header.natoms)?
        } else {
            vec![Vector3D::zeros(); header.natoms]
        };
        let velocities = if header.v_size != 0 {
            Some(read_vectors(
                &mut self.file,
                header.use_double,
                header.natoms,
            )?)
        } else {
            None
        };
        self.file.skip(header.f_size as u64)?;

        if velocities.is_some() {
            next.add_velocities();
        }
        for (i, position) in positions.into_iter().enumerate() {
            let velocity = velocities.as_ref().map(|v| v[i]);
            next.add_atom(Atom::default(), position, velocity);
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
        self.file.seek(position)?;
        self.read(frame)
    }

    fn write(&mut self, frame: &Frame) -> Result<(), FormatError> {
        let natoms = frame.size();
        let has_box = frame.cell().shape() != crate::core::CellShape::Infinite;
        let box_size = if has_box { 9 * 4 } else { 0 };
        let x_size = 3 * natoms * 4;
        let v_size = if frame.velocities().is_some() {
            3 * natoms * 4
        } else {
            0
        };

        write_i32(&mut self.file, TRR_MAGIC)?;
        write_xdr_string(&mut self.file, TRR_VERSION)?;
        write_i32(&mut self.file, 0)?; // ir_size
        write_i32(&mut self.file, 0)?; // e_size
        write_i32(&mut self.file, box_size as i32)?;
        write_i32(&mut self.file, 0)?; // vir_size
        write_i32(&mut self.file, 0)?; // pres_size
        write_i32(&mut self.file, 0)?; // top_size
        write_i32(&mut self.file, 0)?; // sym_size
        write_i32(&mut self.file, x_size as i32)?;
        write_i32(&mut self.file, v_size as i32)?;
        write_i32(&mut self.file, 0)?; // f_size
        write_i32(&mut self.file, natoms as i32)?;
        write_i32(&mut self.file, self.nwritten as i32)?; // step
        write_i32(&mut self.file, 0)?; // nre

        let time = frame
            .get("time")
            .and_then(|p| p.as_double().ok())
            .unwrap_or(0.0);
        write_f32(&mut self.file, time as f32)?;
        write_f32(&mut self.file, 0.0)?; // lambda

        if has_box {
            let m = frame.cell().matrix();
            for i in 0..3 {
                for j in 0..3 {
                    write_f32(&mut self.file, (m[(j, i)] / 10.0) as f32)?;
                }
            }
        }
        for position in frame.positions() {
            for d in 0..3 {
                write_f32(&mut self.file, (position[d] / 10.0) as f32)?;
            }
        }
        if let Some(velocities) = frame.velocities() {
            for velocity in velocities {
                for d in 0..3 {
                    write_f32(&mut self.file, (velocity[d] / 10.0) as f32)?;
                }
            }
        }

        self.nwritten += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FormatError> {
        Ok(self.file.flush()?)
    }
}
