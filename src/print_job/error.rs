use std::io;
use std::path::PathBuf;
use std::time::Duration;

use snafu::Snafu;

/// Why a print job stopped. Every variant is terminal for the job.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum JobError {
    #[snafu(display("Document payload is not valid base64"))]
    InvalidPayload { source: base64::DecodeError },

    #[snafu(display("Could not stage document at {}", path.display()))]
    Staging { path: PathBuf, source: io::Error },

    #[snafu(display("Printer '{printer}' not found"))]
    PrinterNotFound { printer: String },

    #[snafu(display("No converter found in {candidates} known location(s) or on PATH as {program_names}"))]
    ConverterNotFound { candidates: usize, program_names: String },

    #[snafu(display("Could not launch converter {}", converter.display()))]
    Spawn { converter: PathBuf, source: io::Error },

    #[snafu(display("Converter exited with {exit_code:?} on copy {copy} of {copies}: {diagnostics}"))]
    ProcessFailure { copy: u32, copies: u32, exit_code: Option<i32>, diagnostics: String },

    #[snafu(display(
        "Converter killed after {} on copy {copy} of {copies}: {diagnostics}",
        humantime::format_duration(*timeout)
    ))]
    ProcessTimeout { copy: u32, copies: u32, timeout: Duration, diagnostics: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobErrorKind {
    InvalidPayload,
    IoFailure,
    PrinterNotFound,
    ConverterNotFound,
    ProcessFailure,
    ProcessTimeout,
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            JobError::InvalidPayload { .. } => JobErrorKind::InvalidPayload,
            JobError::Staging { .. } | JobError::Spawn { .. } => JobErrorKind::IoFailure,
            JobError::PrinterNotFound { .. } => JobErrorKind::PrinterNotFound,
            JobError::ConverterNotFound { .. } => JobErrorKind::ConverterNotFound,
            JobError::ProcessFailure { .. } => JobErrorKind::ProcessFailure,
            JobError::ProcessTimeout { .. } => JobErrorKind::ProcessTimeout,
        }
    }
}
