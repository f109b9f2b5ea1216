// driver.rs
// 评测驱动：对一个模型依次运行全部基准子集的入口脚本，然后汇总结果。
use crate::config::SweepConfig;
use crate::error::{Error, Result};
use crate::model::ModelRef;
use crate::result_merger::{GatherOutcome, ResultMerger};
use crate::task_executor::{CommandRunner, CommandSpec};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// 一次驱动运行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct DriverReport {
    pub model: ModelRef,
    pub results_dir: PathBuf,
    pub subsets_run: usize,
    /// (子集编号, 失败原因)
    pub failed_subsets: Vec<(usize, String)>,
    pub gather: Option<GatherOutcome>,
    pub gather_error: Option<String>,
}

impl DriverReport {
    pub fn is_success(&self) -> bool {
        self.failed_subsets.is_empty() && self.gather_error.is_none()
    }
}

pub struct EvalDriver<'a, R: CommandRunner + ?Sized> {
    config: &'a SweepConfig,
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> EvalDriver<'a, R> {
    pub fn new(config: &'a SweepConfig, runner: &'a R) -> Self {
        Self { config, runner }
    }

    /// 子集的入口脚本命令
    pub fn subset_command(&self, model: &ModelRef, subset: usize) -> CommandSpec {
        let results_dir = model.results_dir(&self.config.results_root);
        let mut spec = CommandSpec::new(self.config.shell.clone())
            .arg(self.config.entry_script.to_string_lossy())
            .arg(subset.to_string())
            .inherit_output();
        for (key, value) in &self.config.env {
            spec = spec.env(key.clone(), value.clone());
        }
        spec.env("MODEL_PATH", model.path.to_string_lossy())
            .env("MODEL_NAME", model.results_dir_name())
            .env("OUTPUT_DIR", results_dir.to_string_lossy())
            .env("SUBSET", subset.to_string())
    }

    /// 依次运行所有子集，单个子集失败后继续运行其余子集，最后汇总结果
    pub fn run(&self, model: &ModelRef) -> Result<DriverReport> {
        if !self.config.entry_script.is_file() {
            return Err(Error::Config(format!(
                "入口脚本不存在: {}",
                self.config.entry_script.display()
            )));
        }

        let results_dir = model.results_dir(&self.config.results_root);
        fs::create_dir_all(&results_dir)?;
        info!(model = %model, results_dir = %results_dir.display(), "开始评测");

        let mut failed_subsets = Vec::new();
        for subset in 0..self.config.num_subsets {
            let spec = self.subset_command(model, subset);
            info!(model = %model, subset, total = self.config.num_subsets, "运行子集");

            let failure = match self.runner.run(&spec) {
                Ok(output) if output.is_success() => None,
                Ok(output) => Some(format!("退出码 {:?}", output.code)),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                error!(model = %model, subset, reason = %reason, "子集评测失败");
                failed_subsets.push((subset, reason));
            }
        }

        let merger = ResultMerger::from_config(self.config);
        let (gather, gather_error) = match merger.gather_model(self.runner, &results_dir) {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => {
                warn!(model = %model, error = %e, "结果汇总失败");
                (None, Some(e.to_string()))
            }
        };

        let report = DriverReport {
            model: model.clone(),
            results_dir,
            subsets_run: self.config.num_subsets,
            failed_subsets,
            gather,
            gather_error,
        };
        info!(
            model = %model,
            failed = report.failed_subsets.len(),
            success = report.is_success(),
            "评测结束"
        );
        Ok(report)
    }
}
