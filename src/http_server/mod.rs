use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{error, web, App, HttpResponse, HttpServer};
use log::info;

use crate::config::models::Server;
use crate::print_job::PrintExecutor;

use models::ErrorResponse;

pub mod handlers;
pub mod models;

pub struct AppState {
    pub executor: Arc<PrintExecutor>,
    pub device_id: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/healthz").route(web::get().to(handlers::healthz)))
        .service(web::resource("/printers").route(web::get().to(handlers::list_printers)))
        .service(web::resource("/printers/details").route(web::get().to(handlers::printer_details)))
        .service(web::resource("/print").route(web::post().to(handlers::print)));
}

/// JSON extractor settings: body size limit, and `400 {error}` for bodies
/// that do not parse.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default().limit(limit).error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorResponse::new(err.to_string()));
        error::InternalError::from_response(err, response).into()
    })
}

/// No configured origins means any origin may call the service.
pub fn cors(allowed_origins: &[String]) -> Cors {
    let any = allowed_origins.is_empty() || allowed_origins.iter().any(|o| o.trim() == "*");
    let cors = if any {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin.trim()))
    };
    cors.allow_any_method().allow_any_header().max_age(3600)
}

pub async fn run(settings: &Server, state: web::Data<AppState>) -> std::io::Result<()> {
    let allowed_origins = settings.allowed_origins.clone();
    let body_limit = settings.max_body_bytes;

    info!("Starting server at http://{}:{}", settings.host, settings.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors(&allowed_origins))
            .app_data(state.clone())
            .app_data(json_config(body_limit))
            .configure(configure)
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await
}
