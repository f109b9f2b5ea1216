// types.rs
// 定义基准套件、任务分类、结果文件名常量以及GLUE主指标的选取规则。
use std::collections::BTreeMap;
use std::fmt;

// 常量定义，避免硬编码
pub const RESULTS_FILE: &str = "all_results.json";
pub const GLUE_CSV: &str = "glue.csv";
pub const XTREME_CSV: &str = "xtreme.csv";
pub const COMBINED_CSV: &str = "combined_results.csv";

/// GLUE 任务，顺序即 glue.csv 的列顺序
pub const GLUE_TASKS: &[&str] = &["cola", "mnli", "mrpc", "qnli", "qqp", "rte", "sst2", "stsb"];

/// XTREME 与 XTREME-R 任务
pub const XTREME_TASKS: &[&str] = &[
    "xnli", "paws-x", "xcopa", "udpos", "wikiann", "panx", "mewslix", "xquad", "mlqa", "tydiqa",
    "bucc", "tatoeba", "lareqa",
];

/// 基准套件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suite {
    Glue,
    Xtreme,
}

impl Suite {
    /// 按任务目录名判断所属套件，未知任务返回 None
    pub fn of_task(task: &str) -> Option<Suite> {
        let task = task.to_ascii_lowercase();
        if GLUE_TASKS.contains(&task.as_str()) {
            Some(Suite::Glue)
        } else if XTREME_TASKS.contains(&task.as_str()) {
            Some(Suite::Xtreme)
        } else {
            None
        }
    }

    /// 汇总表文件名
    pub fn summary_file(&self) -> &'static str {
        match self {
            Suite::Glue => GLUE_CSV,
            Suite::Xtreme => XTREME_CSV,
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suite::Glue => write!(f, "GLUE"),
            Suite::Xtreme => write!(f, "XTREME"),
        }
    }
}

/// 一个任务目录中 all_results.json 的数值指标
pub type Metrics = BTreeMap<String, f64>;

/// GLUE 各任务的主指标候选，按优先级排列
pub fn glue_metric_candidates(task: &str) -> &'static [&'static str] {
    match task {
        "cola" => &["matthews_correlation"],
        "stsb" => &["combined_score", "pearson"],
        "mrpc" | "qqp" => &["combined_score", "f1", "accuracy"],
        _ => &["accuracy"],
    }
}

/// 选出 GLUE 任务的主指标，先尝试 `eval_` 前缀再尝试裸键名。
/// 取值不超过 1.0 时视为比例，换算为百分数。
pub fn glue_primary_score(task: &str, metrics: &Metrics) -> Option<f64> {
    glue_metric_candidates(task).iter().find_map(|key| {
        metrics
            .get(&format!("eval_{}", key))
            .or_else(|| metrics.get(*key))
            .map(|value| as_percentage(*value))
    })
}

fn as_percentage(value: f64) -> f64 {
    if value.abs() <= 1.0 {
        value * 100.0
    } else {
        value
    }
}
