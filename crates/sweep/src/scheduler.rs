use crate::config::SweepConfig;
use crate::error::Result;
use crate::model::ModelRef;
use crate::submit::JobBackend;
use crate::task::{EvalJob, JobStatus};
use crate::task_executor::CommandSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use uuid::Uuid;

/// 清单目录，位于结果根目录下
pub const MANIFEST_DIR: &str = ".sweeps";

/// 作业内运行的驱动程序
#[derive(Debug, Clone)]
pub struct DriverInvocation {
    /// 驱动可执行文件（通常是当前程序）
    pub program: PathBuf,
    /// 传给驱动的配置文件
    pub config_file: Option<PathBuf>,
}

/// 检查点扫描调度器，维护待提交作业的FIFO队列
pub struct SweepScheduler {
    /// 调度器配置
    pub config: SweepConfig,
    /// 作业队列，包含已跳过的作业以保持扫描顺序
    queue: VecDeque<EvalJob>,
}

impl SweepScheduler {
    /// 创建新的调度器实例
    pub fn new(config: SweepConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
        }
    }

    /// 提交一个新作业到队列
    pub fn submit_task(&mut self, job: EvalJob) {
        self.queue.push_back(job);
    }

    /// 获取下一个作业（FIFO）
    pub fn fetch_next_task(&mut self) -> Option<EvalJob> {
        self.queue.pop_front()
    }

    /// 为每个检查点生成作业；已有完成标记的标为 Skipped，`force` 时全部待提交。
    /// 返回待提交作业数。
    pub fn plan(&mut self, checkpoints: Vec<ModelRef>, force: bool) -> usize {
        let mut enqueued = 0;
        for model in checkpoints {
            let mut job = EvalJob::new(model, &self.config.results_root);
            if !force && job.model.is_evaluated(&self.config.results_root, &self.config.sentinel) {
                info!(model = %job.model, "已评测，跳过");
                job.status = JobStatus::Skipped;
            } else {
                enqueued += 1;
            }
            self.submit_task(job);
        }
        info!(enqueued, total = self.queue.len(), "扫描计划完成");
        enqueued
    }

    /// 作业内运行的驱动命令
    pub fn driver_command(&self, job: &EvalJob, driver: &DriverInvocation) -> CommandSpec {
        let mut spec = CommandSpec::new(driver.program.to_string_lossy());
        if let Some(config_file) = &driver.config_file {
            spec = spec.arg("--config").arg(config_file.to_string_lossy());
        }
        spec.args(["run", "--model"])
            .arg(job.model.path.to_string_lossy())
            .args(["--source", job.model.source.as_str(), "--name", job.model.name.as_str()])
    }

    /// 按顺序取出所有作业并提交待提交的作业；单个作业失败不影响其余作业
    pub fn launch(&mut self, backend: &dyn JobBackend, driver: &DriverInvocation) -> SweepReport {
        let mut report = SweepReport::new(backend.name());

        while let Some(mut job) = self.fetch_next_task() {
            if job.status == JobStatus::Pending {
                let command = self.driver_command(&job, driver);
                job.submitted_at = Some(Utc::now());
                job.status = match backend.submit(&job, &command) {
                    Ok(status) => status,
                    Err(e) => {
                        error!(model = %job.model, error = %e, "作业提交失败");
                        JobStatus::Failed(e.to_string())
                    }
                };
            }
            report.jobs.push(job);
        }

        info!(
            backend = %report.backend,
            submitted = report.count(|s| matches!(s, JobStatus::Submitted { .. } | JobStatus::Completed)),
            skipped = report.count(|s| *s == JobStatus::Skipped),
            failed = report.failed(),
            "扫描提交完成"
        );
        report
    }
}

/// 一次扫描的结果清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id: String,
    pub started_at: DateTime<Utc>,
    pub backend: String,
    pub jobs: Vec<EvalJob>,
}

impl SweepReport {
    pub fn new(backend: &str) -> Self {
        Self {
            sweep_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            backend: backend.to_string(),
            jobs: Vec::new(),
        }
    }

    pub fn count<F: Fn(&JobStatus) -> bool>(&self, predicate: F) -> usize {
        self.jobs.iter().filter(|j| predicate(&j.status)).count()
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Failed(_)))
    }

    /// 写入 `<结果根目录>/.sweeps/sweep-<时间>-<ID前缀>.json`，返回清单路径
    pub fn write_manifest(&self, results_root: &Path) -> Result<PathBuf> {
        let dir = results_root.join(MANIFEST_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "sweep-{}-{}.json",
            self.started_at.format("%Y%m%dT%H%M%S"),
            self.sweep_id.get(..8).unwrap_or(&self.sweep_id)
        ));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "已写入扫描清单");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::submit::DryRunBackend;
    use std::cell::Cell;

    fn checkpoints(names: &[&str]) -> Vec<ModelRef> {
        names
            .iter()
            .map(|n| ModelRef::from_path(format!("/ckpts/bert/{}", n), None, None).unwrap())
            .collect()
    }

    fn mark_evaluated(config: &SweepConfig, model: &ModelRef) {
        let sentinel = model.results_dir(&config.results_root).join(&config.sentinel);
        fs::create_dir_all(sentinel.parent().unwrap()).unwrap();
        fs::write(sentinel, "{}").unwrap();
    }

    fn driver() -> DriverInvocation {
        DriverInvocation {
            program: PathBuf::from("/opt/nlu-eval-sweep"),
            config_file: Some(PathBuf::from("sweep.toml")),
        }
    }

    #[test]
    fn test_plan_skips_evaluated() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SweepConfig {
            results_root: tmp.path().to_path_buf(),
            ..SweepConfig::default()
        };
        let ckpts = checkpoints(&["ba100", "ba200", "ba300"]);
        mark_evaluated(&config, &ckpts[1]);

        let mut scheduler = SweepScheduler::new(config.clone());
        assert_eq!(scheduler.plan(ckpts.clone(), false), 2);
        let statuses: Vec<_> = std::iter::from_fn(|| scheduler.fetch_next_task())
            .map(|j| j.status)
            .collect();
        assert_eq!(statuses, vec![JobStatus::Pending, JobStatus::Skipped, JobStatus::Pending]);

        let mut forced = SweepScheduler::new(config);
        assert_eq!(forced.plan(ckpts, true), 3);
    }

    #[test]
    fn test_launch_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SweepConfig {
            results_root: tmp.path().to_path_buf(),
            ..SweepConfig::default()
        };
        let ckpts = checkpoints(&["ba100", "ba200", "ba300"]);
        mark_evaluated(&config, &ckpts[0]);

        let mut scheduler = SweepScheduler::new(config);
        scheduler.plan(ckpts, false);
        let backend = DryRunBackend::new();
        let report = scheduler.launch(&backend, &driver());

        let statuses: Vec<_> = report.jobs.iter().map(|j| j.status.to_string()).collect();
        assert_eq!(statuses, vec!["skipped", "submitted", "submitted"]);
        assert_eq!(report.jobs[1].cluster_id(), Some("dry-run-1"));
        assert!(report.jobs[0].submitted_at.is_none());
        assert!(report.jobs[1].submitted_at.is_some());
        assert_eq!(scheduler.fetch_next_task().map(|j| j.job_id), None);

        let commands = backend.commands.borrow();
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0],
            "/opt/nlu-eval-sweep --config sweep.toml run --model /ckpts/bert/ba200 --source bert --name ba200"
        );
    }

    struct FlakyBackend {
        calls: Cell<usize>,
    }

    impl JobBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        fn submit(&self, _job: &EvalJob, _command: &CommandSpec) -> crate::error::Result<JobStatus> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n == 0 {
                Err(Error::Submit("partition unavailable".to_string()))
            } else {
                Ok(JobStatus::Submitted {
                    cluster_id: format!("{}", 1000 + n),
                })
            }
        }
    }

    #[test]
    fn test_failed_submission_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SweepConfig {
            results_root: tmp.path().to_path_buf(),
            ..SweepConfig::default()
        };
        let mut scheduler = SweepScheduler::new(config);
        scheduler.plan(checkpoints(&["a", "b"]), false);

        let backend = FlakyBackend { calls: Cell::new(0) };
        let report = scheduler.launch(&backend, &driver());
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.jobs[0].status, JobStatus::Failed(ref r) if r.contains("partition")));
        assert_eq!(report.jobs[1].cluster_id(), Some("1001"));
    }

    #[test]
    fn test_write_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SweepConfig {
            results_root: tmp.path().to_path_buf(),
            ..SweepConfig::default()
        };
        let mut scheduler = SweepScheduler::new(config);
        scheduler.plan(checkpoints(&["ba1"]), false);
        let report = scheduler.launch(&DryRunBackend::new(), &driver());

        let path = report.write_manifest(tmp.path()).unwrap();
        assert!(path.starts_with(tmp.path().join(MANIFEST_DIR)));
        let loaded: SweepReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.sweep_id, report.sweep_id);
        assert_eq!(loaded.backend, "dry-run");
        assert_eq!(loaded.jobs.len(), 1);
    }
}
