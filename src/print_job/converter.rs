use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::debug;
use snafu::OptionExt;

use crate::config::models::Converter as ConverterSettings;

use super::error::{ConverterNotFoundSnafu, JobError};
use super::models::FormattingHints;

/// Page size passed to `lp` for roll printers.
const NARROW_MEDIA: &str = "media=Custom.80x297mm";

const NARROW_TOKENS: [&str; 3] = ["pos", "thermal", "receipt"];
const NARROW_FAMILIES: [&str; 8] = ["tm-t", "tm-m", "tm-u", "xp-58", "xp-80", "zj-58", "zj-80", "rp-80"];
const VIRTUAL_MARKERS: [&str; 6] = ["pdf", "xps", "onenote", "fax", "send to", "print to file"];

/// Argument grammar of the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    /// CUPS `lp`.
    Lp,
    /// SumatraPDF's `-print-to` command line.
    Sumatra,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    pub path: PathBuf,
    pub kind: ConverterKind,
}

impl Converter {
    pub fn from_path(path: PathBuf) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let kind = if stem.contains("sumatra") { ConverterKind::Sumatra } else { ConverterKind::Lp };
        Converter { path, kind }
    }

    /// Command line for printing one copy of `document` on `printer`.
    pub fn arguments(&self, document: &Path, printer: &str, hints: &FormattingHints, title: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self.kind {
            ConverterKind::Lp => {
                args.extend(["-d", printer, "-n", "1", "-t", title].map(OsString::from));
                if hints.narrow_format {
                    args.extend(["-o", NARROW_MEDIA].map(OsString::from));
                }
                args.extend(["-o", "fit-to-page"].map(OsString::from));
                if hints.remove_margins {
                    for margin in ["page-left=0", "page-right=0", "page-top=0", "page-bottom=0"] {
                        args.extend(["-o", margin].map(OsString::from));
                    }
                }
                args.push(OsString::from("--"));
                args.push(document.as_os_str().to_owned());
            }
            ConverterKind::Sumatra => {
                let scaling = if hints.narrow_format || hints.remove_margins { "noscale" } else { "fit" };
                args.extend(["-print-to", printer, "-print-settings", scaling, "-silent", "-exit-when-done"].map(OsString::from));
                args.push(document.as_os_str().to_owned());
            }
        }
        args
    }
}

/// Finds the converter executable: well-known locations first, newest
/// layout first, then `PATH`. First existing executable wins.
#[derive(Debug, Clone)]
pub struct ConverterLocator {
    candidates: Vec<PathBuf>,
    program_names: Vec<String>,
    search_path: Option<OsString>,
}

impl ConverterLocator {
    pub fn new(candidates: Vec<PathBuf>, program_names: Vec<String>, search_path: Option<OsString>) -> Self {
        Self { candidates, program_names, search_path }
    }

    pub fn from_settings(settings: &ConverterSettings) -> Self {
        Self::new(
            settings.effective_paths(),
            settings.effective_program_names(),
            std::env::var_os("PATH"),
        )
    }

    pub fn locate(&self) -> Result<Converter, JobError> {
        let on_path = self
            .search_path
            .iter()
            .flat_map(std::env::split_paths)
            .flat_map(|dir| self.program_names.iter().map(move |name| dir.join(name)));

        let found = self.candidates.iter().cloned().chain(on_path).find(|candidate| {
            let hit = is_executable(candidate);
            debug!("Probing converter {}: {}", candidate.display(), if hit { "found" } else { "absent" });
            hit
        });

        found.map(Converter::from_path).context(ConverterNotFoundSnafu {
            candidates: self.candidates.len(),
            program_names: self.program_names.join(", "),
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn name_tokens(printer: &str) -> Vec<String> {
    printer
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Receipt-style roll printers: `POS-80`, `Thermal Printer`, `EPSON TM-T20III`.
pub fn is_narrow_format(printer: &str) -> bool {
    let lower = printer.to_lowercase();
    if NARROW_FAMILIES.iter().any(|family| lower.contains(family)) {
        return true;
    }
    name_tokens(printer).iter().any(|token| {
        NARROW_TOKENS.contains(&token.as_str())
            || token
                .strip_prefix("pos")
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Printers that render to a file or a dialog. In a headless session those
/// can wait for input forever.
pub fn is_virtual_printer(printer: &str) -> bool {
    let lower = printer.to_lowercase();
    VIRTUAL_MARKERS.iter().any(|marker| lower.contains(marker))
}

pub fn hints_for(printer: &str, remove_margins: bool) -> FormattingHints {
    FormattingHints { remove_margins, narrow_format: is_narrow_format(printer) }
}
