//! Format adapters, the contract they share and the registry that
//! dispatches paths to them.

use std::collections::HashMap;
use std::num::{ParseFloatError, ParseIntError};
use std::path::Path;
use std::sync::{OnceLock, RwLock, RwLockReadGuard};

use thiserror::Error;

use crate::core::{ConfigurationError, Frame};
use crate::files::{strip_compression_suffix, Compression, FileError, Mode};

mod gro;
mod lammps_data;
mod mol2;
mod pdb;
mod sdf;
mod tinker;
mod trr;
mod xyz;

pub use gro::GroFormat;
pub use lammps_data::LammpsDataFormat;
pub use mol2::Mol2Format;
pub use pdb::PdbFormat;
pub use sdf::SdfFormat;
pub use tinker::TinkerFormat;
pub use trr::TrrFormat;
pub use xyz::XyzFormat;

/// Error raised by format adapters and the registry.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("invalid integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("invalid number: {0}")]
    ParseFloat(#[from] ParseFloatError),

    #[error("cannot find a format for extension {0}")]
    UnknownExtension(String),

    #[error("file has no extension and no format was given")]
    NoExtension,

    #[error("cannot find a format named {0}")]
    UnknownName(String),

    #[error("a format named {0} is already registered")]
    DuplicateName(String),

    #[error("extension {0} is already registered to the {1} format")]
    DuplicateExtension(String, String),

    #[error("the {0} format does not support reading")]
    NotReadable(String),

    #[error("the {0} format does not support writing")]
    NotWritable(String),

    #[error("the {0} format does not support appending")]
    NotAppendable(String),

    #[error("cannot read step {step}: the file only contains {nsteps} steps")]
    StepOutOfRange { step: usize, nsteps: usize },

    #[error("malformed {format} file: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },
}

impl FormatError {
    pub(crate) fn malformed(format: &'static str, message: impl Into<String>) -> FormatError {
        FormatError::Malformed {
            format,
            message: message.into(),
        }
    }
}

/// The contract every format adapter honors.
///
/// An adapter is bound to one file for its whole lifetime. Text adapters
/// index the start offset of every step while being constructed; binary
/// adapters use their format's own framing.
pub trait Format {
    /// Number of steps stored in the file.
    fn nsteps(&self) -> usize;

    /// Read the next step into `frame`. The frame is either completely
    /// overwritten (positions, velocities, topology, cell and properties)
    /// or, on error, left untouched. Past the last step this is
    /// `FileError::NoMoreSteps`.
    fn read(&mut self, frame: &mut Frame) -> Result<(), FormatError>;

    /// Random-access read of the given step.
    fn read_step(&mut self, step: usize, frame: &mut Frame) -> Result<(), FormatError>;

    /// Append one step to the file.
    fn write(&mut self, frame: &Frame) -> Result<(), FormatError>;

    /// Whether frames read from this format conventionally get their bonds
    /// guessed from distances, because the format carries no connectivity.
    fn guess_bonds_after_read(&self) -> bool {
        false
    }

    /// Flush buffered writes. Called when the owning trajectory is closed.
    fn finish(&mut self) -> Result<(), FormatError> {
        Ok(())
    }
}

/// Static description of a format.
#[derive(Debug, Clone, Copy)]
pub struct FormatMetadata {
    /// Name used for explicit format selection, e.g. `"XYZ"`
    pub name: &'static str,
    /// Extension (without the dot) dispatched to this format, if any
    pub extension: Option<&'static str>,
    pub description: &'static str,
    pub supports_read: bool,
    pub supports_write: bool,
    pub supports_append: bool,
}

/// Builds an adapter bound to the file at `path`.
pub type FormatFactory =
    fn(&Path, Mode, Compression) -> Result<Box<dyn Format>, FormatError>;

#[derive(Clone)]
struct RegistryEntry {
    metadata: FormatMetadata,
    factory: FormatFactory,
}

/// Mapping from format names and extensions to adapter factories.
///
/// The process-wide instance behind [FormatRegistry::global] is populated
/// with the built-in formats on first use. Register custom formats before
/// opening trajectories; registration is not synchronized with concurrent
/// readers beyond a lock, and late registration is not observable by
/// already-open trajectories.
pub struct FormatRegistry {
    entries: Vec<RegistryEntry>,
    by_name: HashMap<String, usize>,
    by_extension: HashMap<String, usize>,
}

impl FormatRegistry {
    /// An empty registry, without the built-in formats.
    pub fn empty() -> Self {
        FormatRegistry {
            entries: Vec::new(),
            by_name: HashMap::new(),
            by_extension: HashMap::new(),
        }
    }

    /// A registry containing all built-in formats.
    pub fn with_builtin_formats() -> Self {
        let mut registry = FormatRegistry::empty();
        for (metadata, factory) in [
            (xyz::METADATA, xyz::factory as FormatFactory),
            (gro::METADATA, gro::factory as FormatFactory),
            (pdb::METADATA, pdb::factory as FormatFactory),
            (sdf::METADATA, sdf::factory as FormatFactory),
            (mol2::METADATA, mol2::factory as FormatFactory),
            (tinker::METADATA, tinker::factory as FormatFactory),
            (lammps_data::METADATA, lammps_data::factory as FormatFactory),
            (trr::METADATA, trr::factory as FormatFactory),
        ] {
            registry
                .register(metadata, factory)
                .unwrap_or_else(|_| unreachable!("built-in formats never collide"));
        }
        registry
    }

    /// The process-wide registry.
    pub fn global() -> &'static RwLock<FormatRegistry> {
        static GLOBAL: OnceLock<RwLock<FormatRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| RwLock::new(FormatRegistry::with_builtin_formats()))
    }

    fn global_read() -> RwLockReadGuard<'static, FormatRegistry> {
        FormatRegistry::global()
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a format. Both the name and the extension (when present)
    /// must be unused.
    pub fn register(
        &mut self,
        metadata: FormatMetadata,
        factory: FormatFactory,
    ) -> Result<(), FormatError> {
        let name_key = metadata.name.to_lowercase();
        if self.by_name.contains_key(&name_key) {
            return Err(FormatError::DuplicateName(metadata.name.into()));
        }
        if let Some(extension) = metadata.extension {
            let ext_key = extension.to_lowercase();
            if let Some(&existing) = self.by_extension.get(&ext_key) {
                return Err(FormatError::DuplicateExtension(
                    extension.into(),
                    self.entries[existing].metadata.name.into(),
                ));
            }
            self.by_extension.insert(ext_key, self.entries.len());
        }
        self.by_name.insert(name_key, self.entries.len());
        self.entries.push(RegistryEntry { metadata, factory });
        Ok(())
    }

    /// Metadata of every registered format.
    pub fn formats(&self) -> impl Iterator<Item = &FormatMetadata> {
        self.entries.iter().map(|entry| &entry.metadata)
    }

    pub fn by_name(&self, name: &str) -> Result<&FormatMetadata, FormatError> {
        self.entry_by_name(name).map(|entry| &entry.metadata)
    }

    fn entry_by_name(&self, name: &str) -> Result<&RegistryEntry, FormatError> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.entries[i])
            .ok_or_else(|| FormatError::UnknownName(name.into()))
    }

    fn entry_for_path(&self, path: &Path) -> Result<&RegistryEntry, FormatError> {
        let stripped = strip_compression_suffix(path);
        let extension = stripped
            .extension()
            .and_then(|e| e.to_str())
            .ok_or(FormatError::NoExtension)?;
        self.by_extension
            .get(&extension.to_lowercase())
            .map(|&i| &self.entries[i])
            .ok_or_else(|| FormatError::UnknownExtension(extension.into()))
    }

    fn create(
        entry: &RegistryEntry,
        path: &Path,
        mode: Mode,
        compression: Compression,
    ) -> Result<Box<dyn Format>, FormatError> {
        let metadata = &entry.metadata;
        match mode {
            Mode::Read if !metadata.supports_read => {
                return Err(FormatError::NotReadable(metadata.name.into()))
            }
            Mode::Write if !metadata.supports_write => {
                return Err(FormatError::NotWritable(metadata.name.into()))
            }
            Mode::Append if !metadata.supports_append => {
                return Err(FormatError::NotAppendable(metadata.name.into()))
            }
            _ => {}
        }
        (entry.factory)(path, mode, compression)
    }
}

/// Build an adapter for `path`, dispatching on the explicit format name
/// when given and on the extension otherwise.
pub(crate) fn create_format(
    path: &Path,
    mode: Mode,
    format_name: Option<&str>,
    compression: Compression,
) -> Result<Box<dyn Format>, FormatError> {
    let registry = FormatRegistry::global_read();
    let entry = match format_name {
        Some(name) => registry.entry_by_name(name)?,
        None => registry.entry_for_path(path)?,
    };
    FormatRegistry::create(entry, path, mode, compression)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let registry = FormatRegistry::with_builtin_formats();
        assert_eq!(registry.by_name("XYZ").unwrap().extension, Some("xyz"));
        assert_eq!(registry.by_name("gro").unwrap().name, "GRO");
        assert!(matches!(
            registry.by_name("nope"),
            Err(FormatError::UnknownName(_))
        ));
    }

    #[test]
    fn extension_dispatch_strips_compression() {
        let registry = FormatRegistry::with_builtin_formats();
        let entry = registry.entry_for_path(Path::new("water.xyz.gz")).unwrap();
        assert_eq!(entry.metadata.name, "XYZ");
        let entry = registry.entry_for_path(Path::new("conf.gro")).unwrap();
        assert_eq!(entry.metadata.name, "GRO");

        assert!(matches!(
            registry.entry_for_path(Path::new("file.unknown")),
            Err(FormatError::UnknownExtension(_))
        ));
        assert!(matches!(
            registry.entry_for_path(Path::new("file")),
            Err(FormatError::NoExtension)
        ));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = FormatRegistry::with_builtin_formats();
        let metadata = FormatMetadata {
            name: "XYZ",
            extension: None,
            description: "clone",
            supports_read: true,
            supports_write: false,
            supports_append: false,
        };
        assert!(matches!(
            registry.register(metadata, super::xyz::factory),
            Err(FormatError::DuplicateName(_))
        ));

        let metadata = FormatMetadata {
            name: "OtherXYZ",
            extension: Some("xyz"),
            description: "clone",
            supports_read: true,
            supports_write: false,
            supports_append: false,
        };
        assert!(matches!(
            registry.register(metadata, super::xyz::factory),
            Err(FormatError::DuplicateExtension(..))
        ));
    }
}
