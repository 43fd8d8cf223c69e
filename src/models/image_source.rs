use std::fmt;

use crate::error::RemoveBgError;

/// 图片来源字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    ImageFile,
    ImageFileB64,
    ImageUrl,
}

impl SourceKind {
    pub fn field_name(&self) -> &'static str {
        match self {
            SourceKind::ImageFile => "image_file",
            SourceKind::ImageFileB64 => "image_file_b64",
            SourceKind::ImageUrl => "image_url",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// 已选定的单个图片来源（尚未解码）
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    File(Vec<u8>),
    Base64(String),
    Url(String),
}

impl ImageSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ImageSource::File(_) => SourceKind::ImageFile,
            ImageSource::Base64(_) => SourceKind::ImageFileB64,
            ImageSource::Url(_) => SourceKind::ImageUrl,
        }
    }
}

/// 请求中出现的全部图片来源
///
/// 优先级: image_file > image_file_b64 > image_url。
/// JSON 请求不会带 image_file，因此同一顺序对两种编码都成立。
#[derive(Debug, Default, Clone)]
pub struct SourceSet {
    pub image_file: Option<Vec<u8>>,
    pub image_file_b64: Option<String>,
    pub image_url: Option<String>,
}

impl SourceSet {
    /// 空字符串 / 空文件视为未提供
    pub fn select(self) -> Result<ImageSource, RemoveBgError> {
        if let Some(bytes) = self.image_file.filter(|b| !b.is_empty()) {
            return Ok(ImageSource::File(bytes));
        }
        if let Some(b64) = self.image_file_b64.filter(|s| !s.trim().is_empty()) {
            return Ok(ImageSource::Base64(b64));
        }
        if let Some(url) = self.image_url.filter(|s| !s.trim().is_empty()) {
            return Ok(ImageSource::Url(url.trim().to_string()));
        }
        Err(RemoveBgError::NoImageSource)
    }
}
