//! Print job pipeline: decode the payload, stage it as a temp file, check
//! the printer, find the converter, run it once per copy, clean up.

pub mod converter;
pub mod error;
pub mod executor;
pub mod models;
pub mod process;

pub use converter::ConverterLocator;
pub use error::{JobError, JobErrorKind};
pub use executor::PrintExecutor;
pub use models::{JobContext, PrintRequest, ValidPrintRequest, ValidationError};
