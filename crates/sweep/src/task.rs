use crate::model::ModelRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 作业状态枚举，描述评测作业的生命周期
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// 等待提交
    Pending,
    /// 已存在完成标记，跳过
    Skipped,
    /// 已提交到集群，包含集群作业ID
    Submitted { cluster_id: String },
    /// 已在本地执行完成
    Completed,
    /// 提交或执行失败，包含失败原因
    Failed(String),
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Skipped => write!(f, "skipped"),
            JobStatus::Submitted { .. } => write!(f, "submitted"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed(_) => write!(f, "failed"),
        }
    }
}

/// 评测作业：对一个检查点运行全部基准子集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalJob {
    /// 作业唯一ID
    pub job_id: String,
    pub model: ModelRef,
    /// 该模型的结果目录
    pub results_dir: PathBuf,
    /// 当前作业状态
    pub status: JobStatus,
    /// 提交时间，仅在提交后有值
    pub submitted_at: Option<DateTime<Utc>>,
}

impl EvalJob {
    pub fn new(model: ModelRef, results_root: &Path) -> Self {
        let results_dir = model.results_dir(results_root);
        Self {
            job_id: Uuid::new_v4().to_string(),
            model,
            results_dir,
            status: JobStatus::Pending,
            submitted_at: None,
        }
    }

    /// 集群作业名：`<前缀>-<来源>--<模型名>`
    pub fn job_name(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.model.results_dir_name()
        } else {
            format!("{}-{}", prefix, self.model.results_dir_name())
        }
    }

    pub fn cluster_id(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Submitted { cluster_id } => Some(cluster_id),
            _ => None,
        }
    }

    /// 作业ID前8位，用于表格展示
    pub fn short_id(&self) -> &str {
        self.job_id.get(..8).unwrap_or(&self.job_id)
    }
}
