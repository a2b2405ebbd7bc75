//! Error type.
//!
//! This is the shared error type for the whole crate. Usage errors (calling
//! a method out of sequence, double-presenting a swap-chain, and the like)
//! are not represented here: those are programmer mistakes and are reported
//! with a `log::error!` line followed by a panic, not a `Result`.

use std::{error, fmt};

#[derive(Clone, Debug)]
pub enum Error {
    /// The backend's memory allocator (or a `Pool`'s chunk allocator)
    /// could not satisfy a request.
    OutOfDeviceMemory,
    /// A swap-chain's native surface was lost and could not be recreated.
    SurfaceLost,
    /// Shader module compilation failed; commands that depend on the
    /// resulting pipeline are skipped with an error log instead of
    /// propagating this further.
    ShaderCompilationFailed(String),
    /// A backend entry point returned a fatal error (submit/acquire
    /// failures are always fatal).
    Backend(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OutOfDeviceMemory => write!(f, "out of device memory"),
            Error::SurfaceLost => write!(f, "swap-chain surface lost"),
            Error::ShaderCompilationFailed(msg) => write!(f, "shader compilation failed: {}", msg),
            Error::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = ::std::result::Result<T, Error>;
