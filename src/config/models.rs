use std::path::PathBuf;
use std::time::Duration;

use serde_derive::Deserialize;

// When changing anything here, make sure to add
// #[serde(alias = "ihavenounderscores")]
// where needed, so it can be read from the ENV vars.

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    #[serde(alias = "maxbodybytes")]
    pub max_body_bytes: usize,
    /// Empty means any origin is allowed.
    #[serde(alias = "allowedorigins", default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cups {
    pub uri: String,
    #[serde(alias = "ignoretlserrors")]
    pub ignore_tls_errors: bool,
    pub username: String,
    pub password: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Converter {
    /// Well-known install locations, probed in order before `PATH`.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// File names searched for on `PATH` once the probe list is exhausted.
    #[serde(alias = "programnames", default)]
    pub program_names: Vec<String>,
}

impl Converter {
    pub fn effective_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            default_converter_paths()
        } else {
            self.paths.clone()
        }
    }

    pub fn effective_program_names(&self) -> Vec<String> {
        if self.program_names.is_empty() {
            default_program_names()
        } else {
            self.program_names.clone()
        }
    }
}

#[cfg(windows)]
fn default_converter_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        paths.push(PathBuf::from(local).join("SumatraPDF").join("SumatraPDF.exe"));
    }
    paths.push(PathBuf::from(r"C:\Program Files\SumatraPDF\SumatraPDF.exe"));
    paths.push(PathBuf::from(r"C:\Program Files (x86)\SumatraPDF\SumatraPDF.exe"));
    paths
}

#[cfg(not(windows))]
fn default_converter_paths() -> Vec<PathBuf> {
    ["/usr/bin/lp", "/usr/local/bin/lp", "/opt/homebrew/bin/lp"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

#[cfg(windows)]
fn default_program_names() -> Vec<String> {
    vec!["SumatraPDF.exe".to_string()]
}

#[cfg(not(windows))]
fn default_program_names() -> Vec<String> {
    vec!["lp".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    #[serde(alias = "printertimeout", with = "humantime_serde")]
    pub printer_timeout: Duration,
    #[serde(alias = "virtualprintertimeout", with = "humantime_serde")]
    pub virtual_printer_timeout: Duration,
    #[serde(alias = "copypause", with = "humantime_serde")]
    pub copy_pause: Duration,
    #[serde(alias = "cleanupdelay", with = "humantime_serde")]
    pub cleanup_delay: Duration,
    #[serde(alias = "tempdir")]
    pub temp_dir: String,
}

impl Job {
    pub fn effective_temp_dir(&self) -> PathBuf {
        if self.temp_dir.trim().is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.temp_dir)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub cups: Cups,
    pub converter: Converter,
    pub job: Job,
    #[serde(alias = "deviceid")]
    pub device_id: Option<String>,
    #[serde(alias = "sentrydsn")]
    pub sentry_dsn: Option<String>,
}

impl Settings {
    pub fn sentry_dsn(&self) -> Option<&str> {
        self.sentry_dsn.as_deref().filter(|dsn| !dsn.trim().is_empty())
    }

    pub fn device_id_override(&self) -> Option<&str> {
        self.device_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}
