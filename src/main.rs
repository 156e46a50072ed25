use std::process::ExitCode;
use std::sync::Arc;

use actix_web::web;
use clap::Parser;
use log::{error, info};
use snafu::Report;
use tokio::runtime::Handle;

use liteprint::cli::{Cli, Commands};
use liteprint::config::loading::load_config;
use liteprint::config::models::Settings;
use liteprint::http_server::models::PrinterDetailsResponse;
use liteprint::http_server::{self, AppState};
use liteprint::print_job::{ConverterLocator, JobContext, PrintExecutor};
use liteprint::printers::device::device_id;
use liteprint::printers::system_directory;

#[actix_web::main]
async fn main() -> ExitCode {
    colog::init();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Could not load configuration: {}", Report::from_error(e));
            return ExitCode::FAILURE;
        }
    };

    let _sentry = settings.sentry_dsn().map(|dsn| {
        info!("Sentry reporting enabled");
        sentry::init((dsn, sentry::ClientOptions { release: sentry::release_name!(), ..Default::default() }))
    });

    let directory = Arc::new(system_directory(&settings.cups));
    let locator = ConverterLocator::from_settings(&settings.converter);
    let executor = Arc::new(PrintExecutor::new(directory, locator, settings.job.clone(), Handle::current()));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&settings, executor).await,
        Commands::Printers => dump_printers(&settings, &executor).await,
        Commands::Print { printer, copies, remove_margins, file } => {
            let bytes = match tokio::fs::read(&file).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Could not read {}: {}", file.display(), e);
                    return ExitCode::FAILURE;
                }
            };

            let ctx = JobContext::new(printer.trim());
            let outcome = executor.print_document(&ctx, &bytes, copies, remove_margins).await;
            executor.shutdown().await;
            match outcome {
                Ok(summary) => {
                    info!("{ctx}: printed {} copy(ies) with {}", summary.copies, summary.converter.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{ctx}: failed ({:?}): {}", e.kind(), Report::from_error(e));
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn serve(settings: &Settings, executor: Arc<PrintExecutor>) -> ExitCode {
    let state = web::Data::new(AppState {
        executor: Arc::clone(&executor),
        device_id: device_id(settings.device_id_override()),
    });

    let result = http_server::run(&settings.server, state).await;
    info!("Server stopped, waiting for running jobs");
    executor.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dump_printers(settings: &Settings, executor: &PrintExecutor) -> ExitCode {
    let printers = executor.directory().list_printers().await;
    let default_printer = printers.iter().find(|p| p.is_default).map(|p| p.name.clone()).unwrap_or_default();
    let details = PrinterDetailsResponse {
        device_id: device_id(settings.device_id_override()),
        default_printer,
        printers,
    };

    match serde_json::to_string_pretty(&details) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Could not serialize printers: {}", e);
            ExitCode::FAILURE
        }
    }
}
