use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde_derive::Deserialize;
use snafu::{ensure, OptionExt, Snafu};
use uuid::Uuid;

pub const MAX_COPIES: u32 = 999;

/// Body of `POST /print`, as sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrintRequest {
    #[serde(alias = "Printer")]
    pub printer: String,
    #[serde(alias = "Copies")]
    pub copies: i64,
    #[serde(alias = "Base64Pdf")]
    pub base64_pdf: String,
    #[serde(alias = "RemoveMargins")]
    pub remove_margins: bool,
}

impl Default for PrintRequest {
    fn default() -> Self {
        PrintRequest { printer: String::new(), copies: 1, base64_pdf: String::new(), remove_margins: false }
    }
}

impl PrintRequest {
    pub fn validate(self) -> Result<ValidPrintRequest, ValidationError> {
        ValidPrintRequest::try_from(self)
    }
}

/// Shape errors. The display strings are what clients get back.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ValidationError {
    #[snafu(display("Base64Pdf is required"))]
    MissingPayload {},
    #[snafu(display("Printer is required"))]
    MissingPrinter {},
    #[snafu(display("Copies must be at least 1"))]
    InvalidCopies {},
    #[snafu(display("Copies must be at most {max}"))]
    TooManyCopies { max: u32 },
}

/// A print request that passed shape validation. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPrintRequest {
    printer: String,
    copies: u32,
    payload: String,
    remove_margins: bool,
}

impl ValidPrintRequest {
    pub fn printer(&self) -> &str {
        &self.printer
    }

    pub fn copies(&self) -> u32 {
        self.copies
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn remove_margins(&self) -> bool {
        self.remove_margins
    }
}

impl TryFrom<PrintRequest> for ValidPrintRequest {
    type Error = ValidationError;

    fn try_from(request: PrintRequest) -> Result<Self, Self::Error> {
        ensure!(!request.base64_pdf.trim().is_empty(), MissingPayloadSnafu);
        ensure!(!request.printer.trim().is_empty(), MissingPrinterSnafu);
        ensure!(request.copies >= 1, InvalidCopiesSnafu);
        let copies = u32::try_from(request.copies)
            .ok()
            .filter(|c| *c <= MAX_COPIES)
            .context(TooManyCopiesSnafu { max: MAX_COPIES })?;

        Ok(ValidPrintRequest {
            printer: request.printer.trim().to_string(),
            copies,
            payload: request.base64_pdf,
            remove_margins: request.remove_margins,
        })
    }
}

/// Identity of one job, carried into every log line the job writes.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: Uuid,
    pub printer: String,
}

impl JobContext {
    pub fn new(printer: impl Into<String>) -> Self {
        JobContext { id: Uuid::new_v4(), printer: printer.into() }
    }

    pub fn title(&self) -> String {
        format!("liteprint-{}", self.id.simple())
    }
}

impl fmt::Display for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.simple().to_string();
        write!(f, "job {} ({})", &id[..8], self.printer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormattingHints {
    pub remove_margins: bool,
    /// Receipt-style roll printer, detected from the printer name.
    pub narrow_format: bool,
}

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub copies: u32,
    pub converter: PathBuf,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(printer: &str, copies: i64, payload: &str) -> PrintRequest {
        PrintRequest {
            printer: printer.to_string(),
            copies,
            base64_pdf: payload.to_string(),
            remove_margins: false,
        }
    }

    #[test]
    fn empty_printer_is_rejected() {
        let err = request("", 1, "Zm9v").validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingPrinter {});
        assert_eq!(err.to_string(), "Printer is required");
    }

    #[test]
    fn whitespace_printer_is_rejected() {
        assert_eq!(request("   ", 1, "Zm9v").validate().unwrap_err(), ValidationError::MissingPrinter {});
    }

    #[test]
    fn payload_is_checked_first() {
        let err = request("", 0, "").validate().unwrap_err();
        assert_eq!(err.to_string(), "Base64Pdf is required");
    }

    #[test]
    fn copies_must_be_positive() {
        assert_eq!(request("Office", 0, "Zm9v").validate().unwrap_err(), ValidationError::InvalidCopies {});
        assert_eq!(request("Office", -3, "Zm9v").validate().unwrap_err(), ValidationError::InvalidCopies {});
    }

    #[test]
    fn copies_are_capped() {
        let err = request("Office", i64::from(MAX_COPIES) + 1, "Zm9v").validate().unwrap_err();
        assert_eq!(err, ValidationError::TooManyCopies { max: MAX_COPIES });
    }

    #[test]
    fn valid_request_is_trimmed() {
        let valid = request("  Office-LaserJet ", 3, "Zm9v").validate().unwrap();
        assert_eq!(valid.printer(), "Office-LaserJet");
        assert_eq!(valid.copies(), 3);
        assert_eq!(valid.payload(), "Zm9v");
    }

    #[test]
    fn wire_names_and_defaults() {
        let req: PrintRequest = serde_json::from_str(r#"{"printer":"A","base64Pdf":"Zm9v"}"#).unwrap();
        assert_eq!(req.copies, 1);
        assert!(!req.remove_margins);

        let req: PrintRequest =
            serde_json::from_str(r#"{"Printer":"A","Copies":2,"Base64Pdf":"Zm9v","RemoveMargins":true}"#).unwrap();
        assert_eq!(req.printer, "A");
        assert_eq!(req.copies, 2);
        assert!(req.remove_margins);
    }

    #[test]
    fn context_display_is_short() {
        let ctx = JobContext::new("POS-80");
        let shown = ctx.to_string();
        assert!(shown.starts_with("job "));
        assert!(shown.ends_with("(POS-80)"));
        assert_eq!(shown.len(), "job ".len() + 8 + " (POS-80)".len());
    }
}
