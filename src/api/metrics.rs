use actix_web::{web, HttpResponse, Responder};

use crate::metrics::METRICS;
use crate::state::AppState;

pub async fn get_metrics(data: web::Data<AppState>) -> impl Responder {
    // 资源类指标在抓取时刷新
    if let Some(stats) = data.stats_collector.collect() {
        METRICS.process_memory_bytes.set(stats.memory_bytes as f64);
    }

    let model = data
        .segmenter
        .as_ref()
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| "none".to_string());
    METRICS
        .model_loaded
        .with_label_values(&[model.as_str()])
        .set(if data.segmenter.is_some() { 1.0 } else { 0.0 });

    match METRICS.render() {
        Ok(metrics_text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics_text),
        Err(e) => {
            log::error!("Failed to render metrics: {}", e);
            HttpResponse::InternalServerError().body("Failed to render metrics")
        }
    }
}
