use serde_derive::Serialize;

use crate::cups_client::models::CupsPrinter;

/// Snapshot of one installed printer. Identity is the name alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterRecord {
    pub name: String,
    #[serde(rename = "default")]
    pub is_default: bool,
    /// `None` when the source cannot tell (name-only fallback).
    #[serde(rename = "workOffline")]
    pub offline: Option<bool>,
    pub status: Option<String>,
}

impl PrinterRecord {
    pub fn name_only(name: impl Into<String>) -> Self {
        PrinterRecord { name: name.into(), is_default: false, offline: None, status: None }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

impl From<&CupsPrinter> for PrinterRecord {
    fn from(printer: &CupsPrinter) -> Self {
        PrinterRecord {
            name: printer.queue_name.clone(),
            is_default: false,
            offline: Some(printer.is_offline()),
            status: Some(printer.state.as_str().to_string()),
        }
    }
}
