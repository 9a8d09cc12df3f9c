//! Reader and writer for OPL object files (OPO and OPA).
//!
//! # Usage
//!
//! ```
//! use opo_common::ProcedureSections;
//! use opo_loader::{load, ObjectFileWriter};
//!
//! let image = ObjectFileWriter::new("HELLO.OPL")
//!     .procedure(ProcedureSections {
//!         name: "MAIN".into(),
//!         bytecode: vec![0xC0],
//!         ..ProcedureSections::default()
//!     })
//!     .finish()
//!     .unwrap();
//! let file = load(&image).unwrap();
//! assert_eq!(file.procedures[0].name, "MAIN");
//! ```
//!
//! Loading is all-or-nothing: a malformed image yields a [`LoadError`] and
//! no partial structure.

pub mod error;
pub mod reader;
pub mod writer;

mod cursor;

pub use error::{LoadError, WriteError};
pub use reader::load;
pub use writer::ObjectFileWriter;

use std::path::Path;

use opo_common::ObjectFile;

/// Reads and parses an object file from disk.
pub fn load_file(path: &Path) -> Result<ObjectFile, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    load(&bytes)
}
