use actix_web::{web, HttpResponse};
use chrono::Local;
use log::info;

use crate::print_job::PrintRequest;

use super::models::{AcceptedResponse, ErrorResponse, HealthResponse, PrinterDetailsResponse, PrintersResponse};
use super::AppState;

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok".to_string(), time: Local::now().to_rfc3339() })
}

pub async fn list_printers(state: web::Data<AppState>) -> HttpResponse {
    let printers = state.executor.directory().printer_names().await;
    HttpResponse::Ok().json(PrintersResponse { device_id: state.device_id.clone(), printers })
}

pub async fn printer_details(state: web::Data<AppState>) -> HttpResponse {
    let directory = state.executor.directory();
    let printers = directory.list_printers().await;
    let default_printer = printers
        .iter()
        .find(|p| p.is_default)
        .map(|p| p.name.clone())
        .unwrap_or_default();

    HttpResponse::Ok().json(PrinterDetailsResponse { device_id: state.device_id.clone(), default_printer, printers })
}

/// Validates the request shape and queues the job. Anything that goes wrong
/// after that is reported in the logs, not in this response.
pub async fn print(state: web::Data<AppState>, body: web::Json<PrintRequest>) -> HttpResponse {
    match body.into_inner().validate() {
        Ok(request) => {
            let job_id = state.executor.submit(request);
            HttpResponse::Accepted().json(AcceptedResponse { message: "Print job accepted".to_string(), job_id })
        }
        Err(e) => {
            info!("Rejected print request: {e}");
            HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string()))
        }
    }
}
