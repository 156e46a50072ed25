use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::print_job::models::MAX_COPIES;

// ///////////// //
// CLI interface //
// ///////////// //

/// liteprint - A small local HTTP service that lists the installed printers and prints base64 PDFs on them.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the HTTP service. This is the default.
    Serve,
    /// Prints the printer details as JSON to stdout.
    Printers,
    /// Prints a local PDF file and waits for the result.
    Print {
        #[arg(short, long)]
        printer: String,
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=MAX_COPIES as i64))]
        copies: u32,
        #[arg(long)]
        remove_margins: bool,
        file: PathBuf,
    },
}
