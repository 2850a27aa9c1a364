use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SkcmError {
    #[error("invalid submitter id: {0}")]
    InvalidSubmitterId(String),

    #[error("invalid rename rule: {0}")]
    InvalidRenameRule(String),

    #[error("invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("missing config file skcm.json in current directory")]
    MissingConfig,

    #[error("config file already exists at {0} (use --force to overwrite)")]
    ConfigExists(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("required input not found: {0}")]
    MissingInput(PathBuf),

    #[error("failed to parse metadata {path}: {message}")]
    MetadataParse { path: PathBuf, message: String },

    #[error("metadata file contains no records: {0}")]
    EmptyMetadata(PathBuf),

    #[error("failed to parse table {path}: {message}")]
    TableParse { path: PathBuf, message: String },

    #[error("column not found in {path}: {column}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("invalid GDC manifest: {0}")]
    InvalidManifest(String),

    #[error("GDC request failed: {0}")]
    GdcHttp(String),

    #[error("GDC returned status {status}: {message}")]
    GdcStatus { status: u16, message: String },

    #[error("download size mismatch for {file}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("no usable rows for {0}")]
    NoData(String),

    #[error("survival data is invalid: {0}")]
    InvalidSurvivalData(String),

    #[error("dimensions don't match: {0}")]
    InvalidDimensions(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("Cox model did not converge after {0} iterations")]
    NotConverged(usize),

    #[error("failed to write plot {path}: {message}")]
    Plot { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
