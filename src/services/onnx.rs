use anyhow::{anyhow, bail, Context};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::tract_ndarray::{Array2, Array4};
use tract_onnx::prelude::*;

use crate::services::segmenter::{sigmoid, Segmenter};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// 通过 tract 在 CPU 上运行导出为 ONNX 的 BiRefNet
pub struct OnnxSegmenter {
    name: String,
    plan: OnnxPlan,
    input_size: (u32, u32),
    apply_sigmoid: bool,
}

impl OnnxSegmenter {
    /// `probability_output` 为 true 时模型已输出概率，不再做 sigmoid
    pub fn load(path: &Path, input_size: u32, probability_output: bool) -> anyhow::Result<Self> {
        if !path.exists() {
            bail!("model file not found: {}", path.display());
        }
        if input_size == 0 {
            bail!("model input size must be positive");
        }

        let t0 = Instant::now();
        let side = input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read ONNX model {}", path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())?
            .into_optimized()?
            .into_runnable()?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        log::info!(
            "Model '{}' optimised in {:.1}s (input {}x{})",
            name,
            t0.elapsed().as_secs_f64(),
            input_size,
            input_size
        );

        Ok(Self {
            name,
            plan,
            input_size: (input_size, input_size),
            apply_sigmoid: !probability_output,
        })
    }
}

impl Segmenter for OnnxSegmenter {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn predict(&self, input: Array4<f32>) -> anyhow::Result<Array2<f32>> {
        let tensor: Tensor = input.into();
        let outputs = self.plan.run(tvec!(tensor.into()))?;

        // 多输出时最后一个是最终的精细 mask
        let last = outputs
            .last()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = last.to_array_view::<f32>()?;
        mask_from_output(view.shape(), view.iter().copied(), self.apply_sigmoid)
    }
}

/// 取最后两个维度作为 (H, W)，只用第一张 mask
fn mask_from_output(
    shape: &[usize],
    values: impl Iterator<Item = f32>,
    apply_sigmoid: bool,
) -> anyhow::Result<Array2<f32>> {
    if shape.len() < 2 {
        bail!("unexpected output shape {:?}", shape);
    }
    let (h, w) = (shape[shape.len() - 2], shape[shape.len() - 1]);
    if h == 0 || w == 0 {
        bail!("empty output mask {:?}", shape);
    }

    let mask: Vec<f32> = values
        .take(h * w)
        .map(|v| if apply_sigmoid { sigmoid(v) } else { v })
        .collect();
    Ok(Array2::from_shape_vec((h, w), mask)?)
}
