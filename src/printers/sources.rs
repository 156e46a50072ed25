use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::process::Command;

use crate::cups_client::client::CupsClient;

use super::directory::{CupsSnafu, DirectoryError, ExitSnafu, PrinterSource, SpawnSnafu, TimeoutSnafu};
use super::models::PrinterRecord;

#[async_trait]
impl PrinterSource for CupsClient {
    fn name(&self) -> &'static str {
        "cups"
    }

    async fn list_printers(&self) -> Result<Vec<PrinterRecord>, DirectoryError> {
        let printers = self.get_printers().await.context(CupsSnafu)?;
        Ok(printers.iter().map(PrinterRecord::from).collect())
    }

    async fn default_printer(&self) -> Result<Option<String>, DirectoryError> {
        self.get_default_printer().await.context(CupsSnafu)
    }

    async fn lookup(&self, name: &str) -> Result<bool, DirectoryError> {
        if self.has_printer(name).await.context(CupsSnafu)? {
            return Ok(true);
        }
        // Queue URIs are case-sensitive, names are not.
        Ok(self.list_printers().await?.iter().any(|p| p.matches(name)))
    }
}

/// Name-only fallback built on the `lpstat` command line tool.
#[derive(Debug, Clone)]
pub struct LpstatSource {
    program: String,
    timeout: Duration,
}

impl LpstatSource {
    pub fn new(timeout: Duration) -> Self {
        Self { program: "lpstat".to_string(), timeout }
    }

    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self { program: program.into(), timeout }
    }

    async fn run(&self, arg: &str) -> Result<String, DirectoryError> {
        let child = Command::new(&self.program)
            .arg(arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context(SpawnSnafu { program: &self.program })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.context(SpawnSnafu { program: &self.program })?,
            Err(_) => return TimeoutSnafu { program: &self.program, timeout: self.timeout }.fail(),
        };

        if !output.status.success() {
            return ExitSnafu {
                program: &self.program,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .fail();
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PrinterSource for LpstatSource {
    fn name(&self) -> &'static str {
        "lpstat"
    }

    async fn list_printers(&self) -> Result<Vec<PrinterRecord>, DirectoryError> {
        let stdout = self.run("-e").await?;
        Ok(parse_destinations(&stdout).into_iter().map(PrinterRecord::name_only).collect())
    }

    async fn default_printer(&self) -> Result<Option<String>, DirectoryError> {
        let stdout = self.run("-d").await?;
        Ok(parse_default_destination(&stdout))
    }
}

fn parse_destinations(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `system default destination: NAME`, or `no system default destination`.
fn parse_default_destination(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("system default destination:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations_one_per_line() {
        assert_eq!(
            parse_destinations("Office-LaserJet\nPOS-80\n\n  Kitchen \n"),
            vec!["Office-LaserJet", "POS-80", "Kitchen"]
        );
    }

    #[test]
    fn default_destination_is_parsed() {
        assert_eq!(
            parse_default_destination("system default destination: Office-LaserJet\n"),
            Some("Office-LaserJet".to_string())
        );
        assert_eq!(parse_default_destination("no system default destination\n"), None);
    }

    #[tokio::test]
    async fn missing_lpstat_binary_is_an_error() {
        let source = LpstatSource::with_program("/nonexistent/lpstat", Duration::from_secs(1));
        let err = source.list_printers().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn lpstat_output_becomes_name_only_records() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("lpstat");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$1\" = \"-d\" ]; then echo 'system default destination: Bar'; else printf 'Kitchen\\nBar\\n'; fi\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = LpstatSource::with_program(script.to_string_lossy(), Duration::from_secs(5));
        let printers = source.list_printers().await.unwrap();
        assert_eq!(printers, vec![PrinterRecord::name_only("Kitchen"), PrinterRecord::name_only("Bar")]);
        assert_eq!(source.default_printer().await.unwrap(), Some("Bar".to_string()));
        assert!(source.lookup("kitchen").await.unwrap());
    }
}
