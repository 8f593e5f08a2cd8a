//! Error taxonomy for the configuration-error class described in the design
//! (bad flags, missing file, unreadable file, image too large). Architectural
//! halts are deliberately not represented here — they are observable only
//! through `Hart::is_halted`/`Hart::halt_reason`.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LoadError {
    #[error("Program too big.")]
    ImageTooBig { image_len: usize, memory_len: usize },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Can't open file '{path}' for reading.")]
    CantOpenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
}
