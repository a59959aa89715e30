use actix_web::{get, http::header::CONTENT_TYPE, web::Data, HttpResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{event, Level};

#[get("/metrics")]
pub async fn vending_metrics(registry: Data<Registry>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&metric_families[..], &mut buf) {
        event!(Level::ERROR, %err, "Failed to encode metrics.");
        return HttpResponse::InternalServerError().finish();
    }

    let body = String::from_utf8(buf).unwrap_or_default();
    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, prometheus::TEXT_FORMAT))
        .body(body)
}
