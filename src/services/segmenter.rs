use image::RgbImage;
use image::imageops::{self, FilterType};
use tract_onnx::prelude::tract_ndarray::{Array2, Array4};

/// ImageNet 均值 / 方差
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 前景分割模型
///
/// 输入为归一化后的 `1x3xHxW` 张量，输出为 `[0, 1]` 区间的前景概率图。
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    /// 模型输入尺寸 (width, height)
    fn input_size(&self) -> (u32, u32);

    fn predict(&self, input: Array4<f32>) -> anyhow::Result<Array2<f32>>;
}

/// 缩放到模型输入尺寸并做归一化，布局 NCHW
pub fn preprocess(image: &RgbImage, (width, height): (u32, u32)) -> Array4<f32> {
    let resized = imageops::resize(image, width, height, FilterType::Triangle);
    Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, c, y, x)| {
            let value = resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0;
            (value - MEAN[c]) / STD[c]
        },
    )
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let img = RgbImage::from_pixel(20, 10, image::Rgb([255, 0, 128]));
        let tensor = preprocess(&img, (16, 8));
        assert_eq!(tensor.shape(), &[1, 3, 8, 16]);

        let r = tensor[[0, 0, 3, 5]];
        let g = tensor[[0, 1, 3, 5]];
        assert!((r - (1.0 - MEAN[0]) / STD[0]).abs() < 1e-5);
        assert!((g - (0.0 - MEAN[1]) / STD[1]).abs() < 1e-5);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }
}
