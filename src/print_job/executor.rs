use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, error, info, warn};
use snafu::{ensure, ResultExt};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::models::Job as JobSettings;
use crate::printers::PrinterDirectory;

use super::converter::{hints_for, is_virtual_printer, Converter, ConverterLocator};
use super::error::{
    InvalidPayloadSnafu, JobError, PrinterNotFoundSnafu, ProcessFailureSnafu, ProcessTimeoutSnafu, SpawnSnafu,
    StagingSnafu,
};
use super::models::{FormattingHints, JobContext, JobSummary, ValidPrintRequest};
use super::process::invoke_once;

pub fn decode(payload: &str) -> Result<Vec<u8>, JobError> {
    STANDARD.decode(payload.trim()).context(InvalidPayloadSnafu)
}

/// The temp file of one job. Whoever holds it owns the file: hand it to
/// cleanup when done; dropping it removes the file right away.
#[derive(Debug)]
pub struct StagedDocument {
    path: PathBuf,
    armed: bool,
}

impl StagedDocument {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedDocument {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Could not remove staged document {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Writes `bytes` to a fresh, unpredictably named file under `temp_dir`.
pub async fn stage(temp_dir: &Path, bytes: &[u8]) -> Result<StagedDocument, JobError> {
    let path = temp_dir.join(format!("print_{}.pdf", Uuid::new_v4()));
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .context(StagingSnafu { path: &path })?;
    // From here on the guard owns the file, even if writing fails.
    let staged = StagedDocument { path, armed: true };

    file.write_all(bytes).await.context(StagingSnafu { path: staged.path() })?;
    file.flush().await.context(StagingSnafu { path: staged.path() })?;
    Ok(staged)
}

/// Runs print jobs against the printer directory and the external converter.
///
/// Jobs and cleanups are spawned on `runtime`, not on the caller's runtime:
/// HTTP workers tear theirs down on stop, and `shutdown` must still find them.
pub struct PrintExecutor {
    directory: Arc<PrinterDirectory>,
    locator: ConverterLocator,
    settings: JobSettings,
    temp_dir: PathBuf,
    tracker: TaskTracker,
    runtime: Handle,
}

impl PrintExecutor {
    pub fn new(
        directory: Arc<PrinterDirectory>,
        locator: ConverterLocator,
        settings: JobSettings,
        runtime: Handle,
    ) -> Self {
        let temp_dir = settings.effective_temp_dir();
        Self { directory, locator, settings, temp_dir, tracker: TaskTracker::new(), runtime }
    }

    pub fn directory(&self) -> &Arc<PrinterDirectory> {
        &self.directory
    }

    /// Starts the job in the background and returns its id right away.
    /// The outcome only shows up in the logs.
    pub fn submit(self: &Arc<Self>, request: ValidPrintRequest) -> Uuid {
        let ctx = JobContext::new(request.printer());
        let id = ctx.id;
        let executor = Arc::clone(self);

        info!("{ctx}: accepted, {} copy(ies)", request.copies());
        let job = async move {
            match executor.execute(&ctx, &request).await {
                Ok(summary) => info!(
                    "{ctx}: printed {} copy(ies) with {} in {}",
                    summary.copies,
                    summary.converter.display(),
                    humantime::format_duration(round_to_millis(summary.elapsed))
                ),
                Err(e) => {
                    error!("{ctx}: failed ({:?}): {}", e.kind(), snafu::Report::from_error(&e));
                    sentry::capture_error(&e);
                }
            }
        };
        self.tracker.spawn_on(job, &self.runtime);
        id
    }

    pub async fn execute(&self, ctx: &JobContext, request: &ValidPrintRequest) -> Result<JobSummary, JobError> {
        let bytes = decode(request.payload())?;
        debug!("{ctx}: decoded {} byte(s)", bytes.len());
        self.print_document(ctx, &bytes, request.copies(), request.remove_margins()).await
    }

    /// Stage, verify, locate, print, clean up. The staged file is handed to
    /// cleanup whatever the outcome.
    pub async fn print_document(
        &self,
        ctx: &JobContext,
        bytes: &[u8],
        copies: u32,
        remove_margins: bool,
    ) -> Result<JobSummary, JobError> {
        let started = Instant::now();
        let staged = stage(&self.temp_dir, bytes).await?;
        debug!("{ctx}: staged at {}", staged.path().display());

        let outcome = self.print_staged(ctx, staged.path(), copies, remove_margins).await;
        self.cleanup(ctx, staged);

        outcome.map(|converter| JobSummary { copies, converter, elapsed: started.elapsed() })
    }

    async fn print_staged(
        &self,
        ctx: &JobContext,
        document: &Path,
        copies: u32,
        remove_margins: bool,
    ) -> Result<PathBuf, JobError> {
        self.verify_printer(ctx, &ctx.printer).await?;
        let converter = self.locate_converter(ctx)?;
        let hints = hints_for(&ctx.printer, remove_margins);
        self.print_copies(ctx, &converter, document, &hints, copies).await?;
        Ok(converter.path)
    }

    pub async fn verify_printer(&self, ctx: &JobContext, printer: &str) -> Result<(), JobError> {
        ensure!(self.directory.lookup_printer(printer).await, PrinterNotFoundSnafu { printer });
        debug!("{ctx}: printer verified");
        Ok(())
    }

    pub fn locate_converter(&self, ctx: &JobContext) -> Result<Converter, JobError> {
        let converter = self.locator.locate()?;
        debug!("{ctx}: using {:?} converter {}", converter.kind, converter.path.display());
        Ok(converter)
    }

    pub fn timeout_for(&self, printer: &str) -> Duration {
        if is_virtual_printer(printer) {
            self.settings.virtual_printer_timeout
        } else {
            self.settings.printer_timeout
        }
    }

    /// One converter run per copy, strictly in sequence. The first failing
    /// copy ends the job.
    pub async fn print_copies(
        &self,
        ctx: &JobContext,
        converter: &Converter,
        document: &Path,
        hints: &FormattingHints,
        copies: u32,
    ) -> Result<(), JobError> {
        let timeout = self.timeout_for(&ctx.printer);
        let args = converter.arguments(document, &ctx.printer, hints, &ctx.title());

        for copy in 1..=copies {
            let output = invoke_once(&converter.path, &args, timeout)
                .await
                .context(SpawnSnafu { converter: &converter.path })?;

            if output.timed_out {
                return ProcessTimeoutSnafu { copy, copies, timeout, diagnostics: output.diagnostics() }.fail();
            }
            if !output.success() {
                return ProcessFailureSnafu {
                    copy,
                    copies,
                    exit_code: output.exit_code,
                    diagnostics: output.diagnostics(),
                }
                .fail();
            }
            debug!("{ctx}: copy {copy}/{copies} done in {:?}", output.elapsed);

            if copy < copies {
                tokio::time::sleep(self.settings.copy_pause).await;
            }
        }
        Ok(())
    }

    /// Deletes the staged file once the grace delay has passed, so a slow
    /// spooler can finish reading it. Failures are logged only.
    pub fn cleanup(&self, ctx: &JobContext, staged: StagedDocument) {
        let path = staged.disarm();
        let delay = self.settings.cleanup_delay;
        let ctx = ctx.clone();
        let removal = async move {
            tokio::time::sleep(delay).await;
            match remove_with_retry(&path).await {
                Ok(()) => debug!("{ctx}: removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => debug!("{ctx}: {} already gone", path.display()),
                Err(e) => warn!("{ctx}: could not remove {}: {}", path.display(), e),
            }
        };
        self.tracker.spawn_on(removal, &self.runtime);
    }

    /// Waits for every running job and pending cleanup.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn remove_with_retry(path: &Path) -> io::Result<()> {
    (|| tokio::fs::remove_file(path))
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(250))
                .with_max_times(3),
        )
        .when(|e: &io::Error| e.kind() != io::ErrorKind::NotFound)
        .notify(|e: &io::Error, wait: Duration| debug!("Removing {} failed ({}), retrying in {:?}", path.display(), e, wait))
        .await
}

fn round_to_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
