use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder, register_gauge_vec_with_registry, register_gauge_with_registry,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
};
use lazy_static::lazy_static;
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,

    // Counter metrics
    pub requests_total: IntCounterVec,
    pub image_source_total: IntCounterVec,

    // Histogram metrics
    pub inference_seconds: HistogramVec,

    // Gauge metrics
    pub model_loaded: GaugeVec,
    pub process_memory_bytes: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = register_int_counter_vec_with_registry!(
            Opts::new("bgremover_requests_total", "HTTP requests by endpoint and status code"),
            &["endpoint", "status"],
            registry
        ).unwrap();

        let image_source_total = register_int_counter_vec_with_registry!(
            Opts::new("bgremover_image_source_total", "Images received per input source"),
            &["source"],
            registry
        ).unwrap();

        let inference_seconds = register_histogram_vec_with_registry!(
            HistogramOpts::new("bgremover_inference_seconds", "Background removal latency")
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
            &["model"],
            registry
        ).unwrap();

        let model_loaded = register_gauge_vec_with_registry!(
            Opts::new("bgremover_model_loaded", "Segmentation model is loaded (1) or not (0)"),
            &["model"],
            registry
        ).unwrap();

        let process_memory_bytes = register_gauge_with_registry!(
            Opts::new("bgremover_process_memory_bytes", "Resident memory of the service process"),
            registry
        ).unwrap();

        Self {
            registry,
            requests_total,
            image_source_total,
            inference_seconds,
            model_loaded,
            process_memory_bytes,
        }
    }

    pub fn observe_request(&self, endpoint: &str, status: u16) {
        self.requests_total
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
