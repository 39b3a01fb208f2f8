//! The file substrate: line- and byte-oriented handles with transparent
//! compression.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use xz2::read::XzDecoder;

/// Error raised by the file substrate.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("could not open file: {0}")]
    Open(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unexpected end of file")]
    Eof,

    #[error("no more steps")]
    NoMoreSteps,

    #[error("file is not seekable with {0} compression")]
    NotSeekable(&'static str),

    #[error("{0} compression does not support {1}")]
    Compression(&'static str, &'static str),

    #[error("file is not open for {0}")]
    WrongMode(&'static str),
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    Append,
}

/// Compression applied under a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Infer from the path extension (`.gz`, `.bz2`, `.xz`, `.lzma`)
    #[default]
    Auto,
    None,
    Gzip,
    Bzip2,
    Lzma,
}

impl Compression {
    /// Compression indicated by the extension of `path`.
    pub fn from_path(path: &Path) -> Compression {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            Some("xz") | Some("lzma") => Compression::Lzma,
            _ => Compression::None,
        }
    }

    /// Resolve `Auto` against the path extension.
    pub fn resolve(self, path: &Path) -> Compression {
        match self {
            Compression::Auto => Compression::from_path(path),
            other => other,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Compression::Auto => "auto",
            Compression::None => "no",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Lzma => "lzma",
        }
    }
}

/// Strip a recognized compression suffix from a path, leaving the format
/// extension visible (`traj.xyz.gz` -> `traj.xyz`).
pub fn strip_compression_suffix(path: &Path) -> PathBuf {
    if Compression::from_path(path) != Compression::None {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

enum TextReader {
    Plain(BufReader<File>),
    Gzip {
        inner: BufReader<MultiGzDecoder<File>>,
        pos: u64,
    },
    Bzip2 {
        inner: BufReader<MultiBzDecoder<File>>,
        pos: u64,
    },
    Lzma {
        inner: BufReader<XzDecoder<File>>,
        pos: u64,
    },
}

impl TextReader {
    fn new(path: &Path, compression: Compression) -> Result<Self, FileError> {
        if compression == Compression::Auto {
            return Self::new(path, compression.resolve(path));
        }
        let file = File::open(path).map_err(FileError::Open)?;
        Ok(match compression {
            Compression::Auto => unreachable!(),
            Compression::None => TextReader::Plain(BufReader::new(file)),
            Compression::Gzip => TextReader::Gzip {
                inner: BufReader::new(MultiGzDecoder::new(file)),
                pos: 0,
            },
            Compression::Bzip2 => TextReader::Bzip2 {
                inner: BufReader::new(MultiBzDecoder::new(file)),
                pos: 0,
            },
            Compression::Lzma => TextReader::Lzma {
                inner: BufReader::new(XzDecoder::new(file)),
                pos: 0,
            },
        })
    }

    fn read_line(&mut self, buffer: &mut String) -> Result<usize, FileError> {
        let read = match self {
            TextReader::Plain(inner) => inner.read_line(buffer)?,
            TextReader::Gzip { inner, pos } => {
                let n = inner.read_line(buffer)?;
                *pos += n as u64;
                n
            }
            TextReader::Bzip2 { inner, pos } => {
                let n = inner.read_line(buffer)?;
                *pos += n as u64;
                n
            }
            TextReader::Lzma { inner, pos } => {
                let n = inner.read_line(buffer)?;
                *pos += n as u64;
                n
            }
        };
        Ok(read)
    }

    fn tell(&mut self) -> Result<u64, FileError> {
        match self {
            TextReader::Plain(inner) => Ok(inner.stream_position()?),
            TextReader::Gzip { pos, .. }
            | TextReader::Bzip2 { pos, .. }
            | TextReader::Lzma { pos, .. } => Ok(*pos),
        }
    }

    fn seek(&mut self, target: u64, path: &Path) -> Result<(), FileError> {
        match self {
            TextReader::Plain(inner) => {
                inner.seek(SeekFrom::Start(target))?;
                Ok(())
            }
            TextReader::Gzip { inner, pos } => {
                // Decompress-forward; going backwards restarts the stream
                if target < *pos {
                    let file = File::open(path).map_err(FileError::Open)?;
                    *inner = BufReader::new(MultiGzDecoder::new(file));
                    *pos = 0;
                }
                let mut remaining = target - *pos;
                let mut scratch = [0u8; 8192];
                while remaining > 0 {
                    let chunk = remaining.min(scratch.len() as u64) as usize;
                    inner.read_exact(&mut scratch[..chunk])?;
                    remaining -= chunk as u64;
                }
                *pos = target;
                Ok(())
            }
            TextReader::Bzip2 { .. } => Err(FileError::NotSeekable("bzip2")),
            TextReader::Lzma { .. } => Err(FileError::NotSeekable("lzma")),
        }
    }

    fn rewind(&mut self, path: &Path) -> Result<(), FileError> {
        match self {
            TextReader::Plain(inner) => {
                inner.seek(SeekFrom::Start(0))?;
            }
            TextReader::Gzip { inner, pos } => {
                let file = File::open(path).map_err(FileError::Open)?;
                *inner = BufReader::new(MultiGzDecoder::new(file));
                *pos = 0;
            }
            TextReader::Bzip2 { inner, pos } => {
                let file = File::open(path).map_err(FileError::Open)?;
                *inner = BufReader::new(MultiBzDecoder::new(file));
                *pos = 0;
            }
            TextReader::Lzma { inner, pos } => {
                let file = File::open(path).map_err(FileError::Open)?;
                *inner = BufReader::new(XzDecoder::new(file));
                *pos = 0;
            }
        }
        Ok(())
    }
}

enum TextWriter {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl TextWriter {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            TextWriter::Plain(inner) => inner.write_all(bytes),
            TextWriter::Gzip(inner) => inner.write_all(bytes),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TextWriter::Plain(inner) => inner.flush(),
            TextWriter::Gzip(inner) => inner.flush(),
        }
    }

    /// Flush and, for gzip, write the stream trailer. The handle is not
    /// writable afterwards.
    fn finish(&mut self) -> io::Result<()> {
        match self {
            TextWriter::Plain(inner) => inner.flush(),
            TextWriter::Gzip(inner) => {
                inner.flush()?;
                inner.get_mut().try_finish()
            }
        }
    }
}

/// A line-oriented file handle with transparent compression.
///
/// Reading strips line terminators; writing is buffered and flushed on
/// [TextFile::close] or on drop. Seeking works on plain files always and on
/// gzip files in read mode (by decompressing forward); other compressions
/// are not seekable.
pub struct TextFile {
    path: PathBuf,
    compression: Compression,
    reader: Option<TextReader>,
    writer: Option<TextWriter>,
    eof: bool,
}

impl TextFile {
    pub fn open(
        path: impl AsRef<Path>,
        mode: Mode,
        compression: Compression,
    ) -> Result<Self, FileError> {
        let path = path.as_ref().to_path_buf();
        let compression = compression.resolve(&path);

        let (reader, writer) = match mode {
            Mode::Read => (Some(TextReader::new(&path, compression)?), None),
            Mode::Write => {
                let file = File::create(&path).map_err(FileError::Open)?;
                let writer = match compression {
                    Compression::None => TextWriter::Plain(BufWriter::new(file)),
                    Compression::Gzip => TextWriter::Gzip(BufWriter::new(GzEncoder::new(
                        file,
                        flate2::Compression::default(),
                    ))),
                    other => return Err(FileError::Compression(other.name(), "writing")),
                };
                (None, Some(writer))
            }
            Mode::Append => {
                if compression != Compression::None {
                    return Err(FileError::Compression(compression.name(), "appending"));
                }
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)
                    .map_err(FileError::Open)?;
                (None, Some(TextWriter::Plain(BufWriter::new(file))))
            }
        };

        Ok(TextFile {
            path,
            compression,
            reader,
            writer,
            eof: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Read the next line, without its `\n` or `\r\n` terminator.
    pub fn readline(&mut self) -> Result<String, FileError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or(FileError::WrongMode("reading"))?;
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            self.eof = true;
            return Err(FileError::Eof);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }

    /// Read exactly `n` lines.
    pub fn readlines(&mut self, n: usize) -> Result<Vec<String>, FileError> {
        let mut lines = Vec::with_capacity(n);
        for _ in 0..n {
            lines.push(self.readline()?);
        }
        Ok(lines)
    }

    /// Current read position, usable with [TextFile::seekg].
    pub fn tellg(&mut self) -> Result<u64, FileError> {
        self.reader
            .as_mut()
            .ok_or(FileError::WrongMode("reading"))?
            .tell()
    }

    pub fn seekg(&mut self, position: u64) -> Result<(), FileError> {
        let path = self.path.clone();
        self.reader
            .as_mut()
            .ok_or(FileError::WrongMode("reading"))?
            .seek(position, &path)?;
        self.eof = false;
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<(), FileError> {
        let path = self.path.clone();
        self.reader
            .as_mut()
            .ok_or(FileError::WrongMode("reading"))?
            .rewind(&path)?;
        self.eof = false;
        Ok(())
    }

    /// Whether a read has already hit the end of the file.
    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn write_str(&mut self, data: &str) -> Result<(), FileError> {
        self.writer
            .as_mut()
            .ok_or(FileError::WrongMode("writing"))?
            .write_all(data.as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FileError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flush buffers and write any compression trailer. The handle is not
    /// writable afterwards.
    pub fn finish(&mut self) -> Result<(), FileError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.finish()?;
        }
        Ok(())
    }

    /// Flush and release the handle. Closing a write handle is the only way
    /// to guarantee durability of trailing writes.
    pub fn close(mut self) -> Result<(), FileError> {
        self.finish()
    }
}

impl Drop for TextFile {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.finish();
        }
    }
}

impl io::Write for TextFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => {
                writer.write_all(buf)?;
                Ok(buf.len())
            }
            None => Err(io::Error::other("file is not open for writing")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// A byte-oriented file handle for binary framed formats.
///
/// Binary formats manage their own framing, so this handle only offers raw
/// reads, writes and seeks. Compression is not supported.
pub struct BinaryFile {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    writer: Option<BufWriter<File>>,
}

impl BinaryFile {
    pub fn open(
        path: impl AsRef<Path>,
        mode: Mode,
        compression: Compression,
    ) -> Result<Self, FileError> {
        let path = path.as_ref().to_path_buf();
        if compression.resolve(&path) != Compression::None {
            return Err(FileError::Compression(
                compression.resolve(&path).name(),
                "binary I/O",
            ));
        }
        let (reader, writer) = match mode {
            Mode::Read => (
                Some(BufReader::new(File::open(&path).map_err(FileError::Open)?)),
                None,
            ),
            Mode::Write => (
                None,
                Some(BufWriter::new(
                    File::create(&path).map_err(FileError::Open)?,
                )),
            ),
            Mode::Append => (
                None,
                Some(BufWriter::new(
                    OpenOptions::new()
                        .append(true)
                        .create(true)
                        .open(&path)
                        .map_err(FileError::Open)?,
                )),
            ),
        };
        Ok(BinaryFile {
            path,
            reader,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&mut self) -> Result<&mut BufReader<File>, FileError> {
        self.reader.as_mut().ok_or(FileError::WrongMode("reading"))
    }

    /// Read exactly `buffer.len()` bytes.
    pub fn read_exact(&mut self, buffer: &mut [u8]) -> Result<(), FileError> {
        self.reader()?.read_exact(buffer).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                FileError::Eof
            } else {
                FileError::Io(e)
            }
        })
    }

    /// Read bytes up to and including `delimiter`.
    pub fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, FileError> {
        let mut buffer = Vec::new();
        let read = self.reader()?.read_until(delimiter, &mut buffer)?;
        if read == 0 {
            return Err(FileError::Eof);
        }
        Ok(buffer)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), FileError> {
        self.writer
            .as_mut()
            .ok_or(FileError::WrongMode("writing"))?
            .write_all(bytes)?;
        Ok(())
    }

    pub fn tell(&mut self) -> Result<u64, FileError> {
        Ok(self.reader()?.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<(), FileError> {
        self.reader()?.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: u64) -> Result<(), FileError> {
        self.reader()?.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }

    pub fn size(&mut self) -> Result<u64, FileError> {
        let reader = self.reader()?;
        let current = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(current))?;
        Ok(end)
    }

    pub fn flush(&mut self) -> Result<(), FileError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for BinaryFile {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mdio-files-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn plain_roundtrip() -> anyhow::Result<()> {
        let path = temp_path("plain.txt");
        let mut file = TextFile::open(&path, Mode::Write, Compression::Auto)?;
        write!(file, "first\r\nsecond\nthird\n")?;
        file.close()?;

        let mut file = TextFile::open(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(file.readline()?, "first");
        let pos = file.tellg()?;
        assert_eq!(file.readlines(2)?, vec!["second", "third"]);
        assert!(matches!(file.readline(), Err(FileError::Eof)));
        assert!(file.eof());

        file.seekg(pos)?;
        assert!(!file.eof());
        assert_eq!(file.readline()?, "second");
        file.rewind()?;
        assert_eq!(file.readline()?, "first");

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn gzip_roundtrip_and_seek() -> anyhow::Result<()> {
        let path = temp_path("data.txt.gz");
        let mut file = TextFile::open(&path, Mode::Write, Compression::Auto)?;
        assert_eq!(file.compression(), Compression::Gzip);
        write!(file, "297\n generated by VMD\nO 0.0 0.0 0.0\n")?;
        file.close()?;

        let mut file = TextFile::open(&path, Mode::Read, Compression::Auto)?;
        assert_eq!(file.readline()?, "297");
        let pos = file.tellg()?;
        assert_eq!(file.readline()?, " generated by VMD");
        // Backward seek restarts the decompression
        file.seekg(pos)?;
        assert_eq!(file.readline()?, " generated by VMD");
        file.rewind()?;
        assert_eq!(file.readline()?, "297");

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn append_mode() -> anyhow::Result<()> {
        let path = temp_path("append.txt");
        let mut file = TextFile::open(&path, Mode::Write, Compression::None)?;
        write!(file, "one\n")?;
        file.close()?;

        let mut file = TextFile::open(&path, Mode::Append, Compression::None)?;
        write!(file, "two\n")?;
        file.close()?;

        let mut file = TextFile::open(&path, Mode::Read, Compression::None)?;
        assert_eq!(file.readlines(2)?, vec!["one", "two"]);

        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn compressed_append_is_rejected() {
        let path = temp_path("nope.gz");
        assert!(matches!(
            TextFile::open(&path, Mode::Append, Compression::Auto),
            Err(FileError::Compression("gzip", "appending"))
        ));
    }

    #[test]
    fn compression_from_path() {
        assert_eq!(
            Compression::from_path(Path::new("a.xyz.gz")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path(Path::new("a.xyz.bz2")),
            Compression::Bzip2
        );
        assert_eq!(
            Compression::from_path(Path::new("a.xyz.lzma")),
            Compression::Lzma
        );
        assert_eq!(Compression::from_path(Path::new("a.xyz")), Compression::None);
    }

    #[test]
    fn binary_roundtrip() -> anyhow::Result<()> {
        let path = temp_path("data.bin");
        let mut file = BinaryFile::open(&path, Mode::Write, Compression::None)?;
        file.write_bytes(&[1, 2, 3, 4, 5, 6])?;
        file.flush()?;

        let mut file = BinaryFile::open(&path, Mode::Read, Compression::None)?;
        let mut buffer = [0u8; 4];
        file.read_exact(&mut buffer)?;
        assert_eq!(buffer, [1, 2, 3, 4]);
        file.seek(1)?;
        file.read_exact(&mut buffer)?;
        assert_eq!(buffer, [2, 3, 4, 5]);
        assert!(matches!(
            file.read_exact(&mut buffer),
            Err(FileError::Eof)
        ));

        std::fs::remove_file(&path)?;
        Ok(())
    }
}
