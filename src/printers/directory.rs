use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use snafu::{Report, Snafu};

use crate::cups_client::client::CupsError;

use super::models::PrinterRecord;

/// One way of asking the platform which printers exist.
#[async_trait]
pub trait PrinterSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_printers(&self) -> Result<Vec<PrinterRecord>, DirectoryError>;

    async fn default_printer(&self) -> Result<Option<String>, DirectoryError>;

    async fn lookup(&self, name: &str) -> Result<bool, DirectoryError> {
        Ok(self.list_printers().await?.iter().any(|p| p.matches(name)))
    }
}

/// Ordered chain of [`PrinterSource`]s. The first source that answers wins,
/// a failing source hands over to the next one. Nothing here is cached.
pub struct PrinterDirectory {
    sources: Vec<Box<dyn PrinterSource>>,
}

impl PrinterDirectory {
    pub fn new(sources: Vec<Box<dyn PrinterSource>>) -> Self {
        Self { sources }
    }

    /// Records with the default flagged. The default is asked only from the
    /// source that answered the listing.
    pub async fn list_printers(&self) -> Vec<PrinterRecord> {
        let Some((source, mut printers)) = self.first_listing().await else {
            return Vec::new();
        };

        match source.default_printer().await {
            Ok(Some(default_name)) if !default_name.trim().is_empty() => {
                for printer in printers.iter_mut() {
                    printer.is_default = printer.is_default || printer.matches(&default_name);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("{} could not report a default printer: {}", source.name(), Report::from_error(e)),
        }
        printers
    }

    async fn first_listing(&self) -> Option<(&dyn PrinterSource, Vec<PrinterRecord>)> {
        for source in &self.sources {
            match source.list_printers().await {
                Ok(printers) => {
                    debug!("{} listed {} printer(s)", source.name(), printers.len());
                    return Some((source.as_ref(), printers));
                }
                Err(e) => warn!("Printer source {} failed: {}", source.name(), Report::from_error(e)),
            }
        }

        warn!("No printer source answered, reporting an empty printer list");
        None
    }

    /// Empty when no source can tell.
    pub async fn default_printer_name(&self) -> String {
        for source in &self.sources {
            match source.default_printer().await {
                Ok(Some(name)) if !name.trim().is_empty() => return name,
                Ok(_) => {}
                Err(e) => debug!("{} could not report a default printer: {}", source.name(), Report::from_error(e)),
            }
        }
        String::new()
    }

    pub async fn printer_names(&self) -> Vec<String> {
        self.first_listing()
            .await
            .map(|(_, printers)| printers.into_iter().map(|p| p.name).collect())
            .unwrap_or_default()
    }

    pub async fn printer_exists(&self, name: &str) -> bool {
        self.first_listing()
            .await
            .is_some_and(|(_, printers)| printers.iter().any(|p| p.matches(name)))
    }

    /// Pre-flight check used by print jobs. The first source that gives an
    /// answer decides; erroring sources fall through to the next one.
    pub async fn lookup_printer(&self, name: &str) -> bool {
        for source in &self.sources {
            match source.lookup(name).await {
                Ok(found) => {
                    debug!("{} answered lookup for '{}': {}", source.name(), name, found);
                    return found;
                }
                Err(e) => warn!("{} lookup for '{}' failed: {}", source.name(), name, Report::from_error(e)),
            }
        }
        false
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DirectoryError {
    #[snafu(display("CUPS query failed"))]
    Cups { source: CupsError },
    #[snafu(display("Could not run {program}"))]
    Spawn { program: String, source: io::Error },
    #[snafu(display("{program} did not finish within {}", humantime::format_duration(*timeout)))]
    Timeout { program: String, timeout: Duration },
    #[snafu(display("{program} exited with {code:?}: {stderr}"))]
    Exit { program: String, code: Option<i32>, stderr: String },
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// In-memory source, optionally failing every call.
    pub(crate) struct StaticSource {
        pub printers: Vec<PrinterRecord>,
        pub default: Option<String>,
        pub fail: bool,
        pub default_queries: Arc<AtomicUsize>,
    }

    impl StaticSource {
        pub(crate) fn with_names(names: &[&str]) -> Self {
            StaticSource {
                printers: names.iter().map(|n| PrinterRecord::name_only(*n)).collect(),
                default: None,
                fail: false,
                default_queries: Arc::default(),
            }
        }

        pub(crate) fn failing() -> Self {
            StaticSource { printers: Vec::new(), default: None, fail: true, default_queries: Arc::default() }
        }

        fn check(&self) -> Result<(), DirectoryError> {
            if self.fail {
                return ExitSnafu { program: "static", code: Some(1), stderr: "unavailable" }.fail();
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PrinterSource for StaticSource {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn list_printers(&self) -> Result<Vec<PrinterRecord>, DirectoryError> {
            self.check()?;
            Ok(self.printers.clone())
        }

        async fn default_printer(&self) -> Result<Option<String>, DirectoryError> {
            self.default_queries.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self.default.clone())
        }
    }

    fn directory(sources: Vec<StaticSource>) -> PrinterDirectory {
        PrinterDirectory::new(
            sources.into_iter().map(|s| Box::new(s) as Box<dyn PrinterSource>).collect(),
        )
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let dir = directory(vec![StaticSource::failing(), StaticSource::with_names(&["Office-LaserJet"])]);
        let printers = dir.list_printers().await;
        assert_eq!(printers, vec![PrinterRecord::name_only("Office-LaserJet")]);
    }

    #[tokio::test]
    async fn first_answering_source_wins() {
        let dir = directory(vec![
            StaticSource::with_names(&["A"]),
            StaticSource::with_names(&["B", "C"]),
        ]);
        assert_eq!(dir.printer_names().await, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn all_sources_failing_yields_empty_list() {
        let dir = directory(vec![StaticSource::failing(), StaticSource::failing()]);
        assert!(dir.list_printers().await.is_empty());
        assert_eq!(dir.default_printer_name().await, "");
    }

    #[tokio::test]
    async fn default_printer_is_flagged_case_insensitively() {
        let mut source = StaticSource::with_names(&["Office-LaserJet", "POS-80"]);
        source.default = Some("pos-80".to_string());
        let dir = directory(vec![source]);

        let printers = dir.list_printers().await;
        assert!(!printers[0].is_default);
        assert!(printers[1].is_default);
        assert_eq!(dir.default_printer_name().await, "pos-80");
    }

    #[tokio::test]
    async fn names_do_not_ask_for_the_default() {
        let primary = StaticSource::failing();
        let fallback = StaticSource::with_names(&["Office-LaserJet"]);
        let (primary_queries, fallback_queries) =
            (Arc::clone(&primary.default_queries), Arc::clone(&fallback.default_queries));
        let dir = directory(vec![primary, fallback]);

        assert_eq!(dir.printer_names().await, vec!["Office-LaserJet".to_string()]);
        assert_eq!(primary_queries.load(Ordering::SeqCst), 0);
        assert_eq!(fallback_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_is_asked_only_from_the_listing_source() {
        let primary = StaticSource::failing();
        let mut fallback = StaticSource::with_names(&["Office-LaserJet", "Kitchen"]);
        fallback.default = Some("Kitchen".to_string());
        let (primary_queries, fallback_queries) =
            (Arc::clone(&primary.default_queries), Arc::clone(&fallback.default_queries));
        let dir = directory(vec![primary, fallback]);

        let printers = dir.list_printers().await;
        assert!(printers[1].is_default);
        assert_eq!(primary_queries.load(Ordering::SeqCst), 0);
        assert_eq!(fallback_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exists_matches_listing_ignoring_case() {
        let dir = directory(vec![StaticSource::with_names(&["Office-LaserJet"])]);
        for name in dir.printer_names().await {
            assert!(dir.printer_exists(&name.to_uppercase()).await);
        }
        assert!(dir.printer_exists("office-laserjet").await);
        assert!(!dir.printer_exists("Office").await);
    }

    #[tokio::test]
    async fn lookup_falls_through_erroring_sources() {
        let dir = directory(vec![StaticSource::failing(), StaticSource::with_names(&["Kitchen"])]);
        assert!(dir.lookup_printer("kitchen").await);
        assert!(!dir.lookup_printer("Bar").await);
    }

    #[tokio::test]
    async fn lookup_without_any_answer_is_not_found() {
        let dir = directory(vec![StaticSource::failing()]);
        assert!(!dir.lookup_printer("Kitchen").await);
    }
}
