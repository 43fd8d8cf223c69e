pub mod bg_remover;
pub mod ecosystem;
pub mod image_loader;
pub mod onnx;
pub mod segmenter;
pub mod stats_collector;

pub use bg_remover::{remove, render, RenderedImage};
pub use ecosystem::render_ecosystem;
pub use image_loader::ImageLoader;
pub use onnx::OnnxSegmenter;
pub use segmenter::Segmenter;
pub use stats_collector::StatsCollector;
