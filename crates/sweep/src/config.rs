// config.rs
// 评测调度的全局配置：结果目录、入口脚本、子集数量、完成标记、汇总工具、集群提交与重试参数。
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 集群作业提交配置
///
/// `args` 中可使用占位符 `{job_name}`、`{log_path}`、`{command}`，提交时逐个替换。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubmitConfig {
    /// 提交程序，默认 sbatch
    pub program: String,
    /// 提交参数模板
    pub args: Vec<String>,
    /// 作业名前缀
    pub job_name_prefix: String,
    /// 作业日志目录
    pub log_dir: PathBuf,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            program: "sbatch".to_string(),
            args: vec![
                "--parsable".to_string(),
                "--job-name={job_name}".to_string(),
                "--output={log_path}".to_string(),
                "--wrap={command}".to_string(),
            ],
            job_name_prefix: "eval".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// 外部命令重试策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 基础退避时间（毫秒），第n次重试等待 n * backoff_ms 加随机抖动
    pub backoff_ms: u64,
    /// 总耗时上限（毫秒），超过后不再重试
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            timeout_ms: 60_000,
        }
    }
}

/// 评测调度全局配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    /// 结果根目录，其下每个模型一个 `<来源>--<模型名>` 子目录
    pub results_root: PathBuf,
    /// 每个子集调用一次的入口脚本
    pub entry_script: PathBuf,
    /// 执行入口脚本的 shell
    pub shell: String,
    /// 基准子集数量
    pub num_subsets: usize,
    /// 完成标记文件，相对于模型结果目录
    pub sentinel: PathBuf,
    /// Python 解释器，用于外部汇总工具
    pub python: String,
    /// 外部汇总工具；为空时使用内置汇总
    pub gather_tools: Vec<PathBuf>,
    /// 传给入口脚本的额外环境变量
    pub env: BTreeMap<String, String>,
    pub submit: SubmitConfig,
    pub retry: RetryConfig,
}

impl Default for SweepConfig {
    /// 默认配置：results/ 下存放结果，6个子集，以 udpos 结果作为完成标记
    fn default() -> Self {
        Self {
            results_root: PathBuf::from("results"),
            entry_script: PathBuf::from("scripts/entry.sh"),
            shell: "bash".to_string(),
            num_subsets: 6,
            sentinel: PathBuf::from("udpos").join(crate::types::RESULTS_FILE),
            python: "python".to_string(),
            gather_tools: Vec::new(),
            env: BTreeMap::new(),
            submit: SubmitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl SweepConfig {
    /// 从 TOML 文件加载配置；未给出路径时使用默认值。随后应用环境变量覆盖并校验。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("无法读取配置文件 {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 用外部键值（通常是环境变量）覆盖配置项
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("SWEEP_RESULTS_ROOT") {
            debug!(results_root = %root, "使用环境变量覆盖结果目录");
            self.results_root = PathBuf::from(root);
        }
        if let Some(script) = lookup("SWEEP_ENTRY_SCRIPT") {
            self.entry_script = PathBuf::from(script);
        }
        if let Some(count) = lookup("SWEEP_NUM_SUBSETS") {
            self.num_subsets = count.trim().parse().map_err(|_| {
                Error::Config(format!("SWEEP_NUM_SUBSETS 不是有效的整数: {}", count))
            })?;
        }
        if let Some(program) = lookup("SWEEP_SUBMIT_PROGRAM") {
            self.submit.program = program;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_subsets == 0 {
            return Err(Error::Config("num_subsets 必须至少为 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts 必须至少为 1".to_string()));
        }
        if self.sentinel.as_os_str().is_empty() || self.sentinel.is_absolute() {
            return Err(Error::Config(format!(
                "sentinel 必须是相对于模型结果目录的路径: {}",
                self.sentinel.display()
            )));
        }
        if self.submit.program.trim().is_empty() {
            return Err(Error::Config("submit.program 不能为空".to_string()));
        }
        Ok(())
    }
}
