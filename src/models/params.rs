use crate::error::RemoveBgError;

/// 输出尺寸档位，按目标像素面积（百万像素）缩小
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputSize {
    Original,
    Megapixels(f64),
}

impl OutputSize {
    /// full / 4k / auto / 缺省 / 未知值 都保持原尺寸
    pub fn parse(value: Option<&str>) -> Self {
        let value = match value {
            Some(v) => v.trim().to_lowercase(),
            None => return OutputSize::Original,
        };
        match value.as_str() {
            "preview" => OutputSize::Megapixels(0.25),
            "medium" => OutputSize::Megapixels(1.5),
            "hd" => OutputSize::Megapixels(4.0),
            "50mp" => OutputSize::Megapixels(50.0),
            "" | "full" | "4k" | "auto" => OutputSize::Original,
            other => {
                log::debug!("Unknown size '{}', keeping original dimensions", other);
                OutputSize::Original
            }
        }
    }

    /// 只缩小不放大；返回 None 表示不需要缩放
    pub fn target_dimensions(&self, (width, height): (u32, u32)) -> Option<(u32, u32)> {
        let megapixels = match self {
            OutputSize::Original => return None,
            OutputSize::Megapixels(mp) => *mp,
        };

        let original_area = width as f64 * height as f64;
        let target_area = megapixels * 1e6;
        if original_area <= target_area {
            return None;
        }

        let scale = (target_area / original_area).sqrt();
        let new_width = ((width as f64 * scale) as u32).max(1);
        let new_height = ((height as f64 * scale) as u32).max(1);
        Some((new_width, new_height))
    }
}

/// 输出编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
}

impl OutputFormat {
    pub fn parse(value: Option<&str>) -> Result<Self, RemoveBgError> {
        let value = match value {
            Some(v) => v.trim().to_lowercase(),
            None => return Ok(OutputFormat::Png),
        };
        match value.as_str() {
            "" | "png" | "auto" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(RemoveBgError::UnsupportedFormat(value)),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
        }
    }
}
