//! mdio - reading and writing of molecular simulation trajectories.
//!
//! A trajectory is an ordered sequence of frames stored in a file. Every
//! supported on-disk format is exposed through the same in-memory model
//! ([Frame](core::Frame), [Topology](core::Topology), [UnitCell](core::UnitCell))
//! and the same streaming API ([Trajectory](trajectory::Trajectory)).

pub mod core;
pub mod files;
pub mod formats;
pub mod selection;
pub mod trajectory;

pub mod prelude {
    pub use crate::core::*;
    pub use crate::files::{Compression, Mode};
    pub use crate::formats::{Format, FormatError, FormatMetadata, FormatRegistry};
    pub use crate::selection::{Context, Match, Selection, SelectionError};
    pub use crate::trajectory::Trajectory;
    pub use crate::Error;
}

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use thiserror::Error;

pub use crate::core::ConfigurationError;
pub use crate::files::FileError;
pub use crate::formats::FormatError;
pub use crate::selection::SelectionError;

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from a format adapter or the file substrate, with the path of
    /// the offending file.
    #[error("file '{}': {source}", path.display())]
    Trajectory {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

type WarningCallback = Box<dyn Fn(&str) + Send + Sync>;

static WARNING_CALLBACK: OnceLock<Mutex<WarningCallback>> = OnceLock::new();

fn warning_callback() -> &'static Mutex<WarningCallback> {
    WARNING_CALLBACK.get_or_init(|| Mutex::new(Box::new(|message| log::warn!("{message}"))))
}

/// Replace the sink used for non-fatal diagnostics.
///
/// The default sink forwards everything to `log::warn!`. Warnings signal
/// recoverable format quirks (truncated fields, ignored records); they never
/// fail the operation that emitted them.
pub fn set_warning_callback(callback: impl Fn(&str) + Send + Sync + 'static) {
    let mut guard = warning_callback()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Box::new(callback);
}

pub(crate) fn warning(message: impl AsRef<str>) {
    let guard = warning_callback()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard(message.as_ref());
}
