use crate::services::{ImageLoader, Segmenter, StatsCollector};
use std::sync::Arc;
use std::time::Instant;

pub struct AppStateInner {
    /// 模型加载失败时为 None，服务仍然启动
    pub segmenter: Option<Arc<dyn Segmenter>>,
    pub image_loader: ImageLoader,
    pub stats_collector: StatsCollector,
    pub started_at: Instant,
}

pub type AppState = Arc<AppStateInner>;

pub fn new_state(segmenter: Option<Arc<dyn Segmenter>>, image_loader: ImageLoader) -> AppState {
    Arc::new(AppStateInner {
        segmenter,
        image_loader,
        stats_collector: StatsCollector::new(),
        started_at: Instant::now(),
    })
}
