use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;

use crate::error::RemoveBgError;
use crate::models::{OutputFormat, OutputSize};
use crate::services::segmenter::{preprocess, Segmenter};

/// 编码后的输出图片
#[derive(Debug)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// 预测前景 mask 并作为 alpha 通道贴回原图
pub fn remove(image: &RgbImage, segmenter: &dyn Segmenter) -> Result<RgbaImage, RemoveBgError> {
    let (width, height) = image.dimensions();
    let input = preprocess(image, segmenter.input_size());

    let probabilities = segmenter
        .predict(input)
        .map_err(|e| RemoveBgError::Inference(format!("{:#}", e)))?;

    let (mask_h, mask_w) = probabilities.dim();
    let raw: Vec<u8> = probabilities
        .iter()
        .map(|p| (p.clamp(0.0, 1.0) * 255.0) as u8)
        .collect();
    let mask = GrayImage::from_raw(mask_w as u32, mask_h as u32, raw)
        .ok_or_else(|| RemoveBgError::Inference("mask buffer size mismatch".to_string()))?;
    let mask = imageops::resize(&mask, width, height, FilterType::Lanczos3);

    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        image::Rgba([r, g, b, mask.get_pixel(x, y).0[0]])
    }))
}

/// 按 size 缩小并按 format 编码；JPEG 没有 alpha，铺白底
pub fn render(
    image: RgbaImage,
    size: OutputSize,
    format: OutputFormat,
) -> Result<RenderedImage, RemoveBgError> {
    let image = match size.target_dimensions(image.dimensions()) {
        Some((w, h)) => imageops::resize(&image, w, h, FilterType::Lanczos3),
        None => image,
    };
    let (width, height) = image.dimensions();

    let (dynamic, image_format) = match format {
        OutputFormat::Png => (DynamicImage::ImageRgba8(image), ImageFormat::Png),
        OutputFormat::WebP => (DynamicImage::ImageRgba8(image), ImageFormat::WebP),
        OutputFormat::Jpeg => (
            DynamicImage::ImageRgb8(flatten_on_white(&image)),
            ImageFormat::Jpeg,
        ),
    };

    let mut bytes = Vec::new();
    dynamic
        .write_to(&mut Cursor::new(&mut bytes), image_format)
        .map_err(|e| RemoveBgError::Encode(e.to_string()))?;

    Ok(RenderedImage {
        bytes,
        width,
        height,
        format,
    })
}

fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
