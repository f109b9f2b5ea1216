// error.rs
// 定义评测调度的通用错误类型（IO、JSON、CSV、配置、检查点、外部命令、作业提交、结果汇总）和Result类型。
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 项目通用错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),
    /// JSON解析或序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
    /// CSV读写错误
    #[error("CSV错误: {0}")]
    Csv(#[from] csv::Error),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
    /// 检查点目录错误
    #[error("检查点错误: {}: {reason}", .path.display())]
    Checkpoint { path: PathBuf, reason: String },
    /// 外部命令执行失败
    #[error("命令执行失败: {program}: {reason}")]
    Command { program: String, reason: String },
    /// 集群作业提交失败
    #[error("作业提交失败: {0}")]
    Submit(String),
    /// 结果文件内容不符合预期
    #[error("结果错误: {}: {reason}", .path.display())]
    Results { path: PathBuf, reason: String },
}

/// 通用结果类型
pub type Result<T> = std::result::Result<T, Error>;

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(format!("TOML解析失败: {}", e))
    }
}
