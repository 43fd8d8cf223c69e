use lazy_static::lazy_static;
use regex::Regex;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

use crate::cli::ServeArgs;

pub const DEFAULT_PROCESS_NAME: &str = "bg-remover";
pub const DEFAULT_SCRIPT: &str = "./target/release/bg-remover";
pub const DEFAULT_OUT_FILE: &str = "./logs/out.log";
pub const DEFAULT_ERROR_FILE: &str = "./logs/error.log";
pub const DEFAULT_LOG_DATE_FORMAT: &str = "YYYY-MM-DD HH:mm:ss Z";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid profile JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected exactly one process entry, found {0}")]
    AppCount(usize),

    #[error("Invalid launch profile: {}", format_issues(.0))]
    Invalid(Vec<ProfileIssue>),
}

fn format_issues(issues: &[ProfileIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 单条校验问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileIssue {
    EmptyName,
    EmptyScript,
    InvalidEnvKey(String),
    LogPath {
        field: &'static str,
        path: String,
        reason: &'static str,
    },
}

impl fmt::Display for ProfileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileIssue::EmptyName => write!(f, "name must not be empty"),
            ProfileIssue::EmptyScript => write!(f, "script must not be empty"),
            ProfileIssue::InvalidEnvKey(key) => {
                write!(f, "env key '{}' is not a valid variable name", key)
            }
            ProfileIssue::LogPath { field, path, reason } => {
                write!(f, "{} '{}' {}", field, path, reason)
            }
        }
    }
}

/// 有序环境变量表，反序列化时拒绝重复的 key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars(Vec<(String, String)>);

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已存在的 key 会被覆盖，保持原位置
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for EnvVars {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvVars {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvVisitor;

        impl<'de> Visitor<'de> for EnvVisitor {
            type Value = EnvVars;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of environment variables")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<EnvVars, A::Error> {
                let mut vars: Vec<(String, String)> = Vec::new();
                while let Some((key, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    if vars.iter().any(|(k, _)| *k == key) {
                        return Err(de::Error::custom(format!(
                            "duplicate env key '{}'",
                            key
                        )));
                    }
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(de::Error::custom(format!(
                                "env key '{}' must be a string, number or bool, got {}",
                                key, other
                            )))
                        }
                    };
                    vars.push((key, value));
                }
                Ok(EnvVars(vars))
            }
        }

        deserializer.deserialize_map(EnvVisitor)
    }
}

/// args 既可以写成字符串也可以写成数组
fn deserialize_args<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Args {
        Line(String),
        List(Vec<String>),
    }

    Ok(match Args::deserialize(deserializer)? {
        Args::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        Args::List(list) => list,
    })
}

fn default_true() -> bool {
    true
}

/// 进程管理器中的一条进程启动配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchProfile {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub script: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_args",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,

    /// 缺省为仓库根目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "EnvVars::is_empty")]
    pub env: EnvVars,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_file: Option<String>,

    /// stdout + stderr 合并日志
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,

    #[serde(default)]
    pub merge_logs: bool,

    /// 日志行是否带时间戳
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_date_format: Option<String>,

    #[serde(default = "default_true")]
    pub autorestart: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,

    /// 其余进程管理器字段 (instances, exec_mode, ...)，原样保留
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// ecosystem 文件的整体结构 `{ "apps": [...] }`
#[derive(Debug, Serialize, Deserialize)]
pub struct EcosystemDocument {
    pub apps: Vec<LaunchProfile>,
}

impl LaunchProfile {
    /// 以生产模式启动本服务的默认配置
    pub fn for_service(args: &ServeArgs, script: &str) -> Self {
        let mut env = EnvVars::new();
        env.set("APP_ENV", "production");
        env.set("RUST_LOG", "info");
        env.set("ADDRESS", args.address.clone());
        env.set("PORT", args.port.to_string());
        env.set("MODEL_PATH", args.model_path.display().to_string());
        env.set("MAX_UPLOAD_MB", args.max_upload_mb.to_string());
        env.set("MODEL_INPUT_SIZE", args.input_size.to_string());
        env.set("MODEL_PROBABILITY_OUTPUT", args.probability_output.to_string());
        env.set("FETCH_TIMEOUT_SECS", args.fetch_timeout_secs.to_string());
        if let Some(workers) = args.workers {
            env.set("WORKERS", workers.to_string());
        }

        Self {
            name: DEFAULT_PROCESS_NAME.to_string(),
            script: script.to_string(),
            interpreter: Some("none".to_string()),
            args: Vec::new(),
            cwd: None,
            env,
            out_file: Some(DEFAULT_OUT_FILE.to_string()),
            error_file: Some(DEFAULT_ERROR_FILE.to_string()),
            log_file: None,
            merge_logs: true,
            time: None,
            log_date_format: Some(DEFAULT_LOG_DATE_FORMAT.to_string()),
            autorestart: true,
            max_restarts: Some(10),
            extra: serde_json::Map::new(),
        }
    }

    /// 解析单个进程对象，或只含一条记录的 `{ "apps": [...] }`
    pub fn parse(json: &str) -> Result<Self, LaunchError> {
        // 先看结构，再按具体类型重新解析，保证 env 重复 key 能被检测到
        let shape: serde_json::Value = serde_json::from_str(json)?;
        if shape.get("apps").is_some() {
            let doc: EcosystemDocument = serde_json::from_str(json)?;
            let count = doc.apps.len();
            let mut apps = doc.apps.into_iter();
            match (apps.next(), count) {
                (Some(app), 1) => Ok(app),
                _ => Err(LaunchError::AppCount(count)),
            }
        } else {
            Ok(serde_json::from_str(json)?)
        }
    }

    pub fn load(path: &Path) -> Result<Self, LaunchError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// 收集所有问题，而不是遇到第一个就返回
    pub fn issues(&self) -> Vec<ProfileIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(ProfileIssue::EmptyName);
        }
        if self.script.trim().is_empty() {
            issues.push(ProfileIssue::EmptyScript);
        }

        for (key, _) in self.env.iter() {
            if !ENV_KEY.is_match(key) {
                issues.push(ProfileIssue::InvalidEnvKey(key.to_string()));
            }
        }

        let files = [
            ("out_file", self.out_file.as_deref()),
            ("error_file", self.error_file.as_deref()),
            ("log_file", self.log_file.as_deref()),
        ];
        let log_paths = files
            .into_iter()
            .filter_map(|(field, path)| path.map(|p| (field, p)))
            .chain(log_args(&self.args));

        for (field, path) in log_paths {
            if let Some(reason) = log_path_problem(path) {
                issues.push(ProfileIssue::LogPath {
                    field,
                    path: path.to_string(),
                    reason,
                });
            }
        }

        issues
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(LaunchError::Invalid(issues))
        }
    }
}

lazy_static! {
    static ref ENV_KEY: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// 启动参数里指定日志文件的选项 (gunicorn 风格)
const LOG_FILE_FLAGS: [&str; 3] = ["--access-logfile", "--error-logfile", "--log-file"];

/// 取出 `--flag path` 与 `--flag=path` 两种写法中的路径；`-` 表示 stdout/stderr
fn log_args(args: &[String]) -> Vec<(&'static str, &str)> {
    let mut found = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        for flag in LOG_FILE_FLAGS {
            let path = if arg == flag {
                iter.next().map(String::as_str).unwrap_or("")
            } else if let Some(value) = arg.strip_prefix(flag).and_then(|r| r.strip_prefix('=')) {
                value
            } else {
                continue;
            };
            if path != "-" {
                found.push((flag, path));
            }
            break;
        }
    }
    found
}

fn log_path_problem(path: &str) -> Option<&'static str> {
    if path.trim().is_empty() {
        return Some("is empty");
    }
    if path.contains('\0') {
        return Some("contains a NUL byte");
    }
    let p = Path::new(path);
    if p.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Some("must be a relative path");
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Some("must not contain '..'");
    }
    if path.ends_with('/') || path.ends_with('\\') || p.file_name().is_none() {
        return Some("does not name a file");
    }
    None
}
