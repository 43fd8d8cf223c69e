use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::RgbImage;
use std::time::Duration;

use crate::error::RemoveBgError;
use crate::models::{ImageSource, SourceKind};

/// 容忍缺省 padding 的标准 base64
const LENIENT_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// 负责把请求里的图片来源变成 RGB 图像
#[derive(Clone)]
pub struct ImageLoader {
    client: reqwest::Client,
    max_bytes: usize,
}

impl ImageLoader {
    pub fn new(timeout: Duration, max_bytes: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bg-remover/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, max_bytes })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// 取出原始字节；image_url 会在这里被下载
    pub async fn fetch_bytes(&self, source: ImageSource) -> Result<Vec<u8>, RemoveBgError> {
        let kind = source.kind();
        let bytes = match source {
            ImageSource::File(bytes) => bytes,
            ImageSource::Base64(text) => {
                decode_base64(&text).map_err(|e| RemoveBgError::invalid_source(kind, e))?
            }
            ImageSource::Url(url) => self
                .download(&url)
                .await
                .map_err(|e| RemoveBgError::invalid_source(kind, e))?,
        };

        if bytes.len() > self.max_bytes {
            return Err(RemoveBgError::PayloadTooLarge(self.max_bytes));
        }
        Ok(bytes)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid URL: {}", e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme '{}'", parsed.scheme()));
        }

        log::debug!("Fetching image from {}", parsed);
        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_bytes {
                return Err(format!(
                    "remote image is {} bytes, limit is {}",
                    len, self.max_bytes
                ));
            }
        }

        let body = resp.bytes().await.map_err(|e| e.to_string())?;
        if body.len() > self.max_bytes {
            return Err(format!(
                "remote image is {} bytes, limit is {}",
                body.len(),
                self.max_bytes
            ));
        }
        Ok(body.to_vec())
    }
}

/// 去掉 `data:<mime>;base64,` 前缀和空白后解码
pub fn decode_base64(text: &str) -> Result<Vec<u8>, String> {
    let payload = match text.trim().strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((_, data)) => data,
            None => return Err("malformed data URL".to_string()),
        },
        None => text,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    LENIENT_B64.decode(compact.as_bytes()).map_err(|e| e.to_string())
}

/// 解码并统一转为 RGB
pub fn decode_rgb(kind: SourceKind, bytes: &[u8]) -> Result<RgbImage, RemoveBgError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| RemoveBgError::invalid_source(kind, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 30]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn loader() -> ImageLoader {
        ImageLoader::new(Duration::from_secs(5), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_decode_base64_variants() {
        let expected = b"hello world".to_vec();
        assert_eq!(decode_base64("aGVsbG8gd29ybGQ=").unwrap(), expected);
        assert_eq!(decode_base64("aGVsbG8gd29ybGQ").unwrap(), expected);
        assert_eq!(decode_base64("aGVsbG8g\nd29ybGQ=\n").unwrap(), expected);
        assert_eq!(
            decode_base64("data:text/plain;base64,aGVsbG8gd29ybGQ=").unwrap(),
            expected
        );
        assert!(decode_base64("data:text/plain;base64").is_err());
        assert!(decode_base64("!!!not base64!!!").is_err());
    }

    #[test]
    fn test_decode_rgb_rejects_garbage() {
        let err = decode_rgb(SourceKind::ImageFile, b"not an image").unwrap_err();
        assert!(err.to_string().starts_with("Error reading image_file:"));

        let img = decode_rgb(SourceKind::ImageFile, &png_bytes(3, 2)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[tokio::test]
    async fn test_fetch_base64_source() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes(2, 2));
        let bytes = loader().fetch_bytes(ImageSource::Base64(b64)).await.unwrap();
        assert_eq!(bytes, png_bytes(2, 2));
    }

    #[tokio::test]
    async fn test_fetch_url_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(4, 4)))
            .mount(&server)
            .await;

        let url = format!("{}/cat.png", server.uri());
        let bytes = loader().fetch_bytes(ImageSource::Url(url)).await.unwrap();
        assert_eq!(bytes, png_bytes(4, 4));
    }

    #[tokio::test]
    async fn test_fetch_url_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing.png", server.uri());
        let err = loader().fetch_bytes(ImageSource::Url(url)).await.unwrap_err();
        assert!(err.to_string().starts_with("Error reading image_url:"));
    }

    #[tokio::test]
    async fn test_fetch_url_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let small = ImageLoader::new(Duration::from_secs(5), 1024).unwrap();
        let err = small
            .fetch_bytes(ImageSource::Url(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoveBgError::InvalidSource { .. }));
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let err = loader()
            .fetch_bytes(ImageSource::Url("file:///etc/passwd".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme 'file'"));
    }

    #[tokio::test]
    async fn test_oversized_upload() {
        let small = ImageLoader::new(Duration::from_secs(5), 8).unwrap();
        let err = small
            .fetch_bytes(ImageSource::File(vec![0u8; 16]))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoveBgError::PayloadTooLarge(8)));
    }
}
