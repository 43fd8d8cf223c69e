pub mod image_source;
pub mod launch;
pub mod params;

pub use image_source::{ImageSource, SourceKind, SourceSet};
pub use launch::LaunchProfile;
pub use params::{OutputFormat, OutputSize};
