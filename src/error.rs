//! Error types for containerdisk.
//!
//! Every fallible operation in the library returns [`Result<T>`], an alias for
//! `Result<T, Error>`.  Nothing is retried or downgraded: an error always aborts the whole
//! wrap or upload operation.
//!
//! # Error Categories
//!
//! - **Configuration errors**: [`MissingRepository`], [`ImageExists`], [`MissingMetaField`],
//!   [`MissingImage`], [`NoBuilds`], [`BuildNotFound`], [`InvalidSchema`],
//!   [`SchemaViolation`]
//! - **Subprocess errors**: [`EmptyCommand`], [`Spawn`], [`CommandFailed`], [`EmptyOutput`],
//!   [`InvalidDigest`]
//! - **System errors**: [`Io`], [`Json`]
//!
//! [`MissingRepository`]: Error::MissingRepository
//! [`ImageExists`]: Error::ImageExists
//! [`MissingMetaField`]: Error::MissingMetaField
//! [`MissingImage`]: Error::MissingImage
//! [`NoBuilds`]: Error::NoBuilds
//! [`BuildNotFound`]: Error::BuildNotFound
//! [`InvalidSchema`]: Error::InvalidSchema
//! [`SchemaViolation`]: Error::SchemaViolation
//! [`EmptyCommand`]: Error::EmptyCommand
//! [`Spawn`]: Error::Spawn
//! [`CommandFailed`]: Error::CommandFailed
//! [`EmptyOutput`]: Error::EmptyOutput
//! [`InvalidDigest`]: Error::InvalidDigest
//! [`Io`]: Error::Io
//! [`Json`]: Error::Json

use std::{path::PathBuf, process::ExitStatus};

/// Result type alias for operations that may return an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for wrap and upload operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No target repository was given for an upload.
    #[error("--repository must not be empty")]
    MissingRepository,

    /// The final artifact is already present and overwriting was not requested.
    #[error("{0} already exists; use --force to overwrite")]
    ImageExists(PathBuf),

    /// A required key is absent from the build metadata.
    #[error("build metadata is missing {0:?}")]
    MissingMetaField(&'static str),

    /// The build metadata has no artifact recorded for the given platform.
    #[error("build has no {0} image")]
    MissingImage(String),

    /// The builds index lists no builds at all.
    #[error("no builds found in {0}")]
    NoBuilds(PathBuf),

    /// The requested build (or architecture) is not in the builds index.
    #[error("build {id} for {arch} not found")]
    BuildNotFound { id: String, arch: String },

    /// The schema file is not a usable JSON schema.
    #[error("invalid schema {schema}: {message}")]
    InvalidSchema { schema: PathBuf, message: String },

    /// The metadata does not validate against the schema.
    #[error("build metadata does not satisfy {schema}: {}", errors.join("; "))]
    SchemaViolation { schema: PathBuf, errors: Vec<String> },

    /// An attempt was made to run an empty command line.
    #[error("empty command line")]
    EmptyCommand,

    /// The program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but did not exit successfully.
    #[error("`{command}` failed: {status}")]
    CommandFailed { command: String, status: ExitStatus },

    /// The program succeeded but printed nothing where an identifier was expected.
    #[error("`{0}` produced no output")]
    EmptyOutput(String),

    /// The digest reported for an archive is not a valid OCI digest.
    #[error("invalid digest {digest:?}: {source}")]
    InvalidDigest {
        digest: String,
        #[source]
        source: oci_spec::OciSpecError,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
