use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};

use crate::config::MetricsConfig;

use super::Metrics;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Mount the scrape endpoint at `scrape_path` and the health check at /health
fn routes(cfg: &mut web::ServiceConfig, scrape_path: &str) {
    cfg.route(scrape_path, web::get().to(scrape))
        .route("/health", web::get().to(health));
}

/// Serve dispatch metrics until the server stops.
/// Runs on its own thread and runtime, apart from request handling.
pub async fn start_metrics_server(metrics: Arc<Metrics>, settings: MetricsConfig) -> std::io::Result<()> {
    tracing::info!(
        "📊 Serving metrics on http://{}:{}{}",
        settings.bind_address,
        settings.port,
        settings.path
    );

    let scrape_path = settings.path.clone();
    HttpServer::new(move || {
        let scrape_path = scrape_path.clone();
        App::new()
            .app_data(web::Data::new(metrics.clone()))
            .configure(move |cfg| routes(cfg, &scrape_path))
    })
    .workers(1)
    .bind((settings.bind_address.as_str(), settings.port))?
    .run()
    .await
}

async fn scrape(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    let mut body = Vec::new();
    match TextEncoder::new().encode(&metrics.registry().gather(), &mut body) {
        Ok(()) => HttpResponse::Ok().content_type(TEXT_FORMAT).body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Healthy once the dispatcher has registered its handlers
async fn health(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let handlers = metrics.registered_handlers.get();
    let body = serde_json::json!({
        "service": "realestate-core",
        "status": if handlers > 0 { "healthy" } else { "starting" },
        "handlers": handlers,
    });
    if handlers > 0 {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
