use std::path::PathBuf;
use thiserror::Error;

/// Reasons a server operation is refused before anything touches the process.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServerError {
    #[error("Server '{0}' not found")]
    NotFound(String),

    #[error("Server name or path cannot be empty")]
    InvalidRecord,

    #[error("A server named '{0}' already exists")]
    DuplicateName(String),

    #[error("Please download a server JAR first or select an existing one")]
    NoJar,

    #[error("Server '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Server '{0}' is not running")]
    NotRunning(String),

    #[error("EULA not accepted for server '{0}'. Please accept EULA first")]
    EulaNotAccepted(String),

    #[error("Server JAR not found at '{}'", .0.display())]
    JarMissing(PathBuf),
}
