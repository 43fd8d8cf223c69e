use actix_multipart::Multipart;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, ResponseError};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Instant;

use crate::error::RemoveBgError;
use crate::metrics::METRICS;
use crate::models::{OutputFormat, OutputSize, SourceKind, SourceSet};
use crate::services::{image_loader::decode_rgb, remove, render, RenderedImage};
use crate::state::AppState;

/// application/json 请求体；JSON 不支持 image_file
#[derive(Debug, Default, Deserialize)]
pub struct RemoveBgJson {
    #[serde(default)]
    pub image_file_b64: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// 两种编码解析后的统一形式
#[derive(Debug, Default)]
struct RemoveBgForm {
    sources: SourceSet,
    size: Option<String>,
    format: Option<String>,
}

impl From<RemoveBgJson> for RemoveBgForm {
    fn from(body: RemoveBgJson) -> Self {
        Self {
            sources: SourceSet {
                image_file: None,
                image_file_b64: body.image_file_b64,
                image_url: body.image_url,
            },
            size: body.size,
            format: body.format,
        }
    }
}

pub async fn remove_bg(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RemoveBgError> {
    let result = handle(&req, payload, &data).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    METRICS.observe_request("/remove-bg", status);
    if let Err(e) = &result {
        log::warn!("remove-bg failed ({}): {}", status, e);
    }

    let rendered = result?;
    Ok(HttpResponse::Ok()
        .content_type(rendered.format.mime_type())
        .insert_header((
            "Content-Disposition",
            format!("inline; filename=\"output.{}\"", rendered.format.extension()),
        ))
        .insert_header(("X-Image-Width", rendered.width.to_string()))
        .insert_header(("X-Image-Height", rendered.height.to_string()))
        .body(rendered.bytes))
}

async fn handle(
    req: &HttpRequest,
    payload: web::Payload,
    data: &AppState,
) -> Result<RenderedImage, RemoveBgError> {
    let segmenter = data
        .segmenter
        .clone()
        .ok_or(RemoveBgError::ModelUnavailable)?;
    let limit = data.image_loader.max_bytes();

    let content_type = req.content_type().to_ascii_lowercase();
    let form = if content_type.starts_with("multipart/form-data") {
        read_multipart(Multipart::new(req.headers(), payload), limit).await?
    } else if is_json(&content_type) {
        let body = read_body(payload, limit).await?;
        let json: RemoveBgJson = serde_json::from_slice(&body)
            .map_err(|e| RemoveBgError::InvalidBody(e.to_string()))?;
        json.into()
    } else {
        return Err(RemoveBgError::UnsupportedContentType);
    };

    // 参数先校验，避免无效请求也去下载 / 推理
    let size = OutputSize::parse(form.size.as_deref());
    let format = OutputFormat::parse(form.format.as_deref())?;

    let source = form.sources.select()?;
    let kind = source.kind();
    METRICS
        .image_source_total
        .with_label_values(&[kind.field_name()])
        .inc();

    let bytes = data.image_loader.fetch_bytes(source).await?;
    log::info!("Processing {} ({} bytes) as {:?}", kind, bytes.len(), format);

    web::block(move || {
        let image = decode_rgb(kind, &bytes)?;
        let t0 = Instant::now();
        let rgba = remove(&image, segmenter.as_ref())?;
        METRICS
            .inference_seconds
            .with_label_values(&[segmenter.name()])
            .observe(t0.elapsed().as_secs_f64());
        log::debug!(
            "Mask for {}x{} image computed in {:.0}ms",
            image.width(),
            image.height(),
            t0.elapsed().as_secs_f64() * 1000.0
        );
        render(rgba, size, format)
    })
    .await
    .map_err(|e| RemoveBgError::Inference(e.to_string()))?
}

async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Vec<u8>, RemoveBgError> {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| RemoveBgError::InvalidBody(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(RemoveBgError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

async fn read_multipart(mut multipart: Multipart, limit: usize) -> Result<RemoveBgForm, RemoveBgError> {
    let mut form = RemoveBgForm::default();
    let mut total = 0usize;

    while let Some(item) = multipart.next().await {
        let mut field = item.map_err(|e| RemoveBgError::InvalidBody(e.to_string()))?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        let mut value = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| RemoveBgError::InvalidBody(e.to_string()))?;
            total += chunk.len();
            if total > limit {
                return Err(RemoveBgError::PayloadTooLarge(limit));
            }
            value.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "image_file" => form.sources.image_file = Some(value),
            "image_file_b64" => {
                form.sources.image_file_b64 = Some(text_field(SourceKind::ImageFileB64, value)?)
            }
            "image_url" => form.sources.image_url = Some(text_field(SourceKind::ImageUrl, value)?),
            "size" => form.size = Some(param_field("size", value)?),
            "format" => form.format = Some(param_field("format", value)?),
            other => log::debug!("Ignoring multipart field '{}'", other),
        }
    }

    Ok(form)
}

/// application/json 以及 application/*+json
fn is_json(content_type: &str) -> bool {
    content_type == "application/json"
        || content_type
            .strip_prefix("application/")
            .is_some_and(|sub| sub.ends_with("+json"))
}

fn param_field(name: &str, value: Vec<u8>) -> Result<String, RemoveBgError> {
    String::from_utf8(value)
        .map_err(|_| RemoveBgError::InvalidBody(format!("{} field is not valid UTF-8", name)))
}

fn text_field(kind: SourceKind, value: Vec<u8>) -> Result<String, RemoveBgError> {
    String::from_utf8(value).map_err(|_| RemoveBgError::invalid_source(kind, "field is not valid UTF-8"))
}
