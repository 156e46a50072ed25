pub mod cli;
pub mod config;
pub mod cups_client;
pub mod http_server;
pub mod print_job;
pub mod printers;
