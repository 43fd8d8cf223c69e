use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// BG Remover - 图像背景移除 HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(flatten)]
    pub serve: ServeArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 生成进程管理器使用的 ecosystem.config.js
    Ecosystem {
        /// 启动配置文件 (JSON)，缺省时使用当前服务参数生成
        #[arg(long)]
        profile: Option<PathBuf>,

        /// 输出文件，缺省输出到 stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 校验启动配置文件
    CheckProfile {
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// BiRefNet ONNX 模型路径
    #[arg(long, env = "MODEL_PATH", default_value = "models/birefnet.onnx")]
    pub model_path: PathBuf,

    /// 模型输入边长 (正方形)
    #[arg(long, env = "MODEL_INPUT_SIZE", default_value_t = 1024)]
    pub input_size: u32,

    /// 模型输出已经是概率 (不再做 sigmoid)
    #[arg(long, env = "MODEL_PROBABILITY_OUTPUT", default_value_t = false)]
    pub probability_output: bool,

    /// 单个请求 / 图片允许的最大体积 (MB)
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 20)]
    pub max_upload_mb: usize,

    /// 拉取 image_url 的超时时间 (秒)
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    /// HTTP worker 数量
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,
}

impl ServeArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
