//! Printer enumeration: which printers are installed and which one is the
//! system default.

use std::time::Duration;

use log::warn;
use snafu::Report;

use crate::config::models::Cups;
use crate::cups_client::client::CupsClient;

pub mod device;
pub mod directory;
pub mod models;
pub mod sources;

pub use directory::{DirectoryError, PrinterDirectory, PrinterSource};
pub use models::PrinterRecord;
pub use sources::LpstatSource;

/// CUPS over IPP first, `lpstat` names as the fallback.
pub fn system_directory(cups_settings: &Cups) -> PrinterDirectory {
    let mut sources: Vec<Box<dyn PrinterSource>> = Vec::new();
    match CupsClient::new(cups_settings) {
        Ok(client) => sources.push(Box::new(client)),
        Err(e) => warn!("CUPS source disabled: {}", Report::from_error(e)),
    }
    sources.push(Box::new(LpstatSource::new(lpstat_timeout(cups_settings))));
    PrinterDirectory::new(sources)
}

fn lpstat_timeout(cups_settings: &Cups) -> Duration {
    cups_settings.timeout.max(Duration::from_secs(1))
}
