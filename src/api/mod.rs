pub mod metrics;
pub mod remove_bg;

pub use metrics::get_metrics;
pub use remove_bg::remove_bg;

use actix_web::{web, HttpResponse, Responder};

use crate::metrics::METRICS;
use crate::state::AppState;

/// 注册全部路由，main 和测试共用
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/remove-bg", web::post().to(remove_bg))
        .route("/ping", web::get().to(ping))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(get_metrics));
}

pub async fn ping() -> impl Responder {
    METRICS.observe_request("/ping", 200);
    HttpResponse::Ok().json(serde_json::json!({
        "message": "API is running"
    }))
}

pub async fn health(data: web::Data<AppState>) -> impl Responder {
    METRICS.observe_request("/health", 200);
    let stats = data.stats_collector.collect();

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "model_loaded": data.segmenter.is_some(),
        "model": data.segmenter.as_ref().map(|s| s.name()),
        "uptime_seconds": data.started_at.elapsed().as_secs(),
        "memory_bytes": stats.map(|s| s.memory_bytes),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::segmenter::testing::{FailingSegmenter, HalfMaskSegmenter};
    use crate::services::{ImageLoader, Segmenter};
    use crate::state::new_state;
    use actix_web::{http::StatusCode, test, App};
    use base64::Engine;
    use serde_json::Value;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn state_with(segmenter: Option<Arc<dyn Segmenter>>, max_bytes: usize) -> AppState {
        let loader = ImageLoader::new(Duration::from_secs(5), max_bytes).unwrap();
        new_state(segmenter, loader)
    }

    fn half_mask() -> Option<Arc<dyn Segmenter>> {
        Some(Arc::new(HalfMaskSegmenter { size: (16, 16) }))
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, value) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, f
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_ping() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let req = test::TestRequest::get().uri("/ping").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "API is running");
    }

    #[actix_web::test]
    async fn test_health_reports_model() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["model"], "half-mask");

        let app = app!(state_with(None, 1 << 20));
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["model_loaded"], false);
        assert!(body["model"].is_null());
    }

    #[actix_web::test]
    async fn test_remove_bg_json_base64() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(24, 12));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
        assert_eq!(resp.headers().get("x-image-width").unwrap(), "24");

        let body = test::read_body(resp).await;
        let out = image::load_from_memory(&body).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (24, 12));
        assert_eq!(out.get_pixel(0, 6).0, [200, 100, 50, 255]);
        assert_eq!(out.get_pixel(23, 6).0[3], 0);
    }

    #[actix_web::test]
    async fn test_remove_bg_multipart_file_wins() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let file = png_bytes(10, 10);
        let body = multipart_body(&[
            ("image_url", None, &b"http://127.0.0.1:9/unreachable.png"[..]),
            ("image_file", Some("cat.png"), file.as_slice()),
            ("format", None, &b"jpg"[..]),
        ]);
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");
        assert_eq!(
            resp.headers().get("content-disposition").unwrap(),
            "inline; filename=\"output.jpg\""
        );
    }

    #[actix_web::test]
    async fn test_remove_bg_no_source() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "size": "hd" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No image source provided.");
    }

    #[actix_web::test]
    async fn test_remove_bg_unsupported_content_type() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .insert_header(("content-type", "text/plain"))
            .set_payload("hello")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"],
            "Unsupported content type. Use multipart/form-data or application/json."
        );
    }

    #[actix_web::test]
    async fn test_remove_bg_bad_image() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(b"definitely not an image");
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Error reading image_file_b64:"));
    }

    #[actix_web::test]
    async fn test_remove_bg_unsupported_format() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(4, 4));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64, "format": "tiff" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_remove_bg_payload_too_large() {
        let app = app!(state_with(half_mask(), 64));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(32, 32));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn test_remove_bg_multipart_too_large() {
        let app = app!(state_with(half_mask(), 64));
        let file = vec![0xABu8; 4096];
        let body = multipart_body(&[("image_file", Some("big.png"), file.as_slice())]);
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Payload exceeds the 64 byte limit");
    }

    #[actix_web::test]
    async fn test_remove_bg_preview_downscales() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(1000, 500));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64, "size": "preview" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        // 0.5 MP -> 0.25 MP: 每边乘以 sqrt(0.5)
        assert_eq!(resp.headers().get("x-image-width").unwrap(), "707");
        assert_eq!(resp.headers().get("x-image-height").unwrap(), "353");

        let body = test::read_body(resp).await;
        let out = image::load_from_memory(&body).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (707, 353));
        assert!(out.width() as u64 * out.height() as u64 <= 250_000);
    }

    #[actix_web::test]
    async fn test_remove_bg_structured_json_content_type() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(6, 6));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .insert_header(("content-type", "application/vnd.api+json"))
            .set_payload(serde_json::json!({ "image_file_b64": b64 }).to_string())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-image-width").unwrap(), "6");
    }

    #[actix_web::test]
    async fn test_remove_bg_non_utf8_params() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let file = png_bytes(4, 4);
        for field in ["size", "format"] {
            let body = multipart_body(&[
                ("image_file", Some("cat.png"), file.as_slice()),
                (field, None, &[0xff, 0xfe][..]),
            ]);
            let req = test::TestRequest::post()
                .uri("/remove-bg")
                .insert_header((
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                ))
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(
                body["error"],
                format!("Invalid request body: {} field is not valid UTF-8", field)
            );
        }
    }

    #[actix_web::test]
    async fn test_remove_bg_without_model() {
        let app = app!(state_with(None, 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(4, 4));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_remove_bg_inference_failure() {
        let app = app!(state_with(Some(Arc::new(FailingSegmenter)), 1 << 20));
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(4, 4));
        let req = test::TestRequest::post()
            .uri("/remove-bg")
            .set_json(serde_json::json!({ "image_file_b64": b64 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_metrics_endpoint() {
        let app = app!(state_with(half_mask(), 1 << 20));
        let req = test::TestRequest::get().uri("/ping").to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("bgremover_requests_total"));
        assert!(text.contains("bgremover_model_loaded{model=\"half-mask\"} 1"));
    }
}
