// result_merger.rs
// 结果合并器，负责把各任务目录下的 all_results.json 汇总为 glue.csv / xtreme.csv，
// 或者调用外部汇总工具完成同样的工作。
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::task_executor::{execute_with_retry, CommandRunner, CommandSpec};
use crate::types::{glue_primary_score, Metrics, Suite, GLUE_TASKS, RESULTS_FILE};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// 单个模型的 GLUE 汇总行
#[derive(Debug, Clone, PartialEq)]
pub struct GlueRow {
    pub model: String,
    /// 任务 -> 主指标（百分数）
    pub scores: BTreeMap<String, f64>,
}

impl GlueRow {
    /// 已有任务的平均分
    pub fn average(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.values().sum::<f64>() / self.scores.len() as f64)
    }
}

/// 单个模型的 XTREME 汇总行，列名为 `<任务>-<指标>`
#[derive(Debug, Clone, PartialEq)]
pub struct XtremeRow {
    pub model: String,
    pub columns: BTreeMap<String, f64>,
}

/// 内置汇总的结果
#[derive(Debug, Clone, PartialEq)]
pub struct GatherSummary {
    pub model: String,
    pub glue: Option<GlueRow>,
    pub xtreme: Option<XtremeRow>,
}

/// 一个模型目录的汇总结果
#[derive(Debug, Clone, PartialEq)]
pub enum GatherOutcome {
    Builtin(GatherSummary),
    External { tools_run: usize },
}

/// 批量汇总的统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GatherReport {
    pub gathered: Vec<String>,
    /// (模型目录名, 失败原因)
    pub failed: Vec<(String, String)>,
}

/// 读取一个任务的 all_results.json，只保留数值指标
pub fn read_task_metrics(path: &Path) -> Result<Metrics> {
    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    let object = value.as_object().ok_or_else(|| Error::Results {
        path: path.to_path_buf(),
        reason: "顶层不是 JSON 对象".to_string(),
    })?;

    Ok(object
        .iter()
        .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
        .collect())
}

/// 收集模型目录下属于指定套件的任务指标；读取失败的任务记录警告后跳过
fn collect_suite(model_dir: &Path, suite: Suite) -> Result<BTreeMap<String, Metrics>> {
    let mut tasks = BTreeMap::new();
    for entry in fs::read_dir(model_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let task = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if Suite::of_task(&task) != Some(suite) {
            continue;
        }
        let results_path = entry.path().join(RESULTS_FILE);
        if !results_path.is_file() {
            debug!(task = %task, "任务尚无结果文件");
            continue;
        }
        match read_task_metrics(&results_path) {
            Ok(metrics) => {
                tasks.insert(task, metrics);
            }
            Err(e) => warn!(path = %results_path.display(), error = %e, "跳过无法解析的结果文件"),
        }
    }
    Ok(tasks)
}

fn model_label(model_dir: &Path) -> String {
    model_dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| model_dir.display().to_string())
}

fn format_score(value: f64) -> String {
    format!("{:.4}", value)
}

/// 没有可汇总的任务时删除旧的汇总表，避免对比表读到过期数据
fn remove_stale_summary(model_dir: &Path, suite: Suite) -> Result<()> {
    let path = model_dir.join(suite.summary_file());
    if path.is_file() {
        fs::remove_file(&path)?;
        warn!(path = %path.display(), suite = %suite, "没有可汇总的结果，已删除旧汇总表");
    }
    Ok(())
}

/// 汇总 GLUE 结果并写入 `<模型目录>/glue.csv`；没有可用的 GLUE 结果时不写文件并删除旧文件
pub fn gather_glue(model_dir: &Path) -> Result<Option<GlueRow>> {
    let tasks = collect_suite(model_dir, Suite::Glue)?;
    let mut scores = BTreeMap::new();
    for (task, metrics) in &tasks {
        match glue_primary_score(task, metrics) {
            Some(score) => {
                scores.insert(task.clone(), score);
            }
            None => warn!(task = %task, "结果中缺少主指标"),
        }
    }
    if scores.is_empty() {
        remove_stale_summary(model_dir, Suite::Glue)?;
        return Ok(None);
    }

    let row = GlueRow {
        model: model_label(model_dir),
        scores,
    };

    let mut writer = csv::Writer::from_path(model_dir.join(Suite::Glue.summary_file()))?;
    let mut header = vec!["model", "avg glue"];
    header.extend_from_slice(GLUE_TASKS);
    writer.write_record(&header)?;

    let mut record = vec![row.model.clone()];
    record.push(row.average().map(format_score).unwrap_or_default());
    for task in GLUE_TASKS {
        record.push(row.scores.get(*task).copied().map(format_score).unwrap_or_default());
    }
    writer.write_record(&record)?;
    writer.flush()?;

    info!(model = %row.model, tasks = row.scores.len(), "已写入 GLUE 汇总");
    Ok(Some(row))
}

/// 汇总 XTREME 结果并写入 `<模型目录>/xtreme.csv`；没有任何 XTREME 结果时不写文件并删除旧文件
pub fn gather_xtreme(model_dir: &Path) -> Result<Option<XtremeRow>> {
    let tasks = collect_suite(model_dir, Suite::Xtreme)?;
    let columns: BTreeMap<String, f64> = tasks
        .iter()
        .flat_map(|(task, metrics)| {
            metrics
                .iter()
                .map(move |(key, value)| (format!("{}-{}", task, key), *value))
        })
        .collect();
    if columns.is_empty() {
        remove_stale_summary(model_dir, Suite::Xtreme)?;
        return Ok(None);
    }

    let row = XtremeRow {
        model: model_label(model_dir),
        columns,
    };

    let mut writer = csv::Writer::from_path(model_dir.join(Suite::Xtreme.summary_file()))?;
    let header: Vec<&str> = std::iter::once("model")
        .chain(row.columns.keys().map(String::as_str))
        .collect();
    writer.write_record(&header)?;
    let record: Vec<String> = std::iter::once(row.model.clone())
        .chain(row.columns.values().map(|v| v.to_string()))
        .collect();
    writer.write_record(&record)?;
    writer.flush()?;

    info!(model = %row.model, columns = row.columns.len(), "已写入 XTREME 汇总");
    Ok(Some(row))
}

/// 结果合并器：内置汇总或调用外部汇总工具
pub struct ResultMerger {
    pub python: String,
    /// 外部工具，按顺序以 `<python> <工具> <模型结果目录>` 调用；为空时使用内置汇总
    pub tools: Vec<PathBuf>,
}

impl ResultMerger {
    pub fn new(python: impl Into<String>, tools: Vec<PathBuf>) -> Self {
        Self {
            python: python.into(),
            tools,
        }
    }

    pub fn from_config(config: &crate::config::SweepConfig) -> Self {
        Self::new(config.python.clone(), config.gather_tools.clone())
    }

    /// 汇总单个模型结果目录
    pub fn gather_model<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        model_dir: &Path,
    ) -> Result<GatherOutcome> {
        if !model_dir.is_dir() {
            return Err(Error::Results {
                path: model_dir.to_path_buf(),
                reason: "结果目录不存在".to_string(),
            });
        }

        if self.tools.is_empty() {
            let summary = GatherSummary {
                model: model_label(model_dir),
                glue: gather_glue(model_dir)?,
                xtreme: gather_xtreme(model_dir)?,
            };
            if summary.glue.is_none() && summary.xtreme.is_none() {
                warn!(model = %summary.model, "没有可汇总的任务结果");
            }
            return Ok(GatherOutcome::Builtin(summary));
        }

        // 汇总工具是确定性的，失败不重试
        let retry = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        };
        for tool in &self.tools {
            let spec = CommandSpec::new(self.python.clone())
                .arg(tool.to_string_lossy())
                .arg(model_dir.to_string_lossy());
            let output = execute_with_retry(runner, &spec, &retry)?;
            if !output.stdout.trim().is_empty() {
                debug!(tool = %tool.display(), stdout = %output.stdout.trim(), "汇总工具输出");
            }
        }
        Ok(GatherOutcome::External {
            tools_run: self.tools.len(),
        })
    }

    /// 对结果根目录下的每个模型目录重新汇总；单个目录失败不影响其他目录
    pub fn gather_all<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        results_root: &Path,
    ) -> Result<GatherReport> {
        let dirs = list_model_dirs(results_root)?;
        self.gather_dirs(runner, &dirs)
    }

    pub fn gather_dirs<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        dirs: &[PathBuf],
    ) -> Result<GatherReport> {
        let mut report = GatherReport::default();
        for dir in dirs {
            let label = model_label(dir);
            match self.gather_model(runner, dir) {
                Ok(_) => report.gathered.push(label),
                Err(e) => {
                    error!(model = %label, error = %e, "汇总失败");
                    report.failed.push((label, e.to_string()));
                }
            }
        }
        info!(
            gathered = report.gathered.len(),
            failed = report.failed.len(),
            "批量汇总完成"
        );
        Ok(report)
    }
}

/// 列出结果根目录下的模型目录（忽略以 `.` 开头的目录），按名称排序
pub fn list_model_dirs(results_root: &Path) -> Result<Vec<PathBuf>> {
    if !results_root.is_dir() {
        return Err(Error::Results {
            path: results_root.to_path_buf(),
            reason: "结果根目录不存在".to_string(),
        });
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(results_root)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_dir() && !hidden {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
