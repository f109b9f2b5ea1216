// compare.rs
// 跨模型对比：读取每个模型目录下的 glue.csv 与 xtreme.csv，合并为一张对比表并写出 combined_results.csv。
use crate::error::Result;
use crate::result_merger::list_model_dirs;
use crate::types::{GLUE_CSV, XTREME_CSV};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// 对比表的列顺序
pub const COMPARISON_COLUMNS: &[&str] = &[
    "avg glue", "cola", "mnli", "mrpc", "qnli", "qqp", "rte", "sst2", "stsb", "xnli", "paws-x",
    "xquad", "mlqa", "tydiqa", "xcopa", "mewslix", "wikiann", "udpos",
];

/// xtreme.csv 列名 -> 对比表列名
const XTREME_COLUMNS: &[(&str, &str)] = &[
    ("xnli-predict_accuracy", "xnli"),
    ("paws-x-predict_accuracy", "paws-x"),
    ("xquad-test_f1", "xquad"),
    ("mlqa-test_f1", "mlqa"),
    ("tydiqa-test_f1", "tydiqa"),
    ("xcopa-predict_accuracy", "xcopa"),
    ("mewslix-map_at_20", "mewslix"),
    ("wikiann-predict_f1", "wikiann"),
    ("udpos-predict_f1", "udpos"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub model: String,
    pub values: BTreeMap<String, f64>,
}

/// 跨模型对比表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    /// 至少一行有值的列，按 COMPARISON_COLUMNS 顺序
    pub columns: Vec<String>,
    /// 按模型名排序
    pub rows: Vec<ComparisonRow>,
}

impl Comparison {
    /// 扫描结果根目录构建对比表
    pub fn from_results_root(results_root: &Path) -> Result<Self> {
        let mut rows = Vec::new();
        for dir in list_model_dirs(results_root)? {
            if let Some(row) = read_model_row(&dir) {
                rows.push(row);
            }
        }
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(mut rows: Vec<ComparisonRow>) -> Self {
        rows.sort_by(|a, b| a.model.cmp(&b.model));
        let columns = COMPARISON_COLUMNS
            .iter()
            .filter(|c| rows.iter().any(|r| r.values.contains_key(**c)))
            .map(|c| c.to_string())
            .collect();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 写出 CSV：第一列为模型名，缺失值留空
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let header: Vec<&str> = std::iter::once("model")
            .chain(self.columns.iter().map(String::as_str))
            .collect();
        writer.write_record(&header)?;
        for row in &self.rows {
            let record: Vec<String> = std::iter::once(row.model.clone())
                .chain(self.columns.iter().map(|c| {
                    row.values
                        .get(c)
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_default()
                }))
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = self.rows.len(), "已写入对比表");
        Ok(())
    }
}

/// 读取汇总 CSV 的表头与第一行数据
fn read_first_record(path: &Path) -> Result<Option<Vec<(String, String)>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let Some(record) = reader.records().next() else {
        return Ok(None);
    };
    let record = record?;
    Ok(Some(
        headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.trim().to_string(), v.trim().to_string()))
            .collect(),
    ))
}

fn parse_cell(value: &str) -> Option<f64> {
    if value.is_empty() {
        None
    } else {
        value.parse().ok()
    }
}

/// 合并单个模型目录下的汇总表；两者都没有时返回 None
fn read_model_row(dir: &Path) -> Option<ComparisonRow> {
    let mut model = None;
    let mut values = BTreeMap::new();

    let glue_path = dir.join(GLUE_CSV);
    if glue_path.is_file() {
        match read_first_record(&glue_path) {
            Ok(Some(cells)) => {
                for (header, value) in cells {
                    if header == "model" {
                        model.get_or_insert(value);
                    } else if let Some(v) = parse_cell(&value) {
                        values.insert(header, v);
                    }
                }
            }
            Ok(None) => debug!(path = %glue_path.display(), "GLUE 汇总为空"),
            Err(e) => warn!(path = %glue_path.display(), error = %e, "无法读取 GLUE 汇总"),
        }
    }

    let xtreme_path = dir.join(XTREME_CSV);
    if xtreme_path.is_file() {
        match read_first_record(&xtreme_path) {
            Ok(Some(cells)) => {
                let cells: BTreeMap<String, String> = cells.into_iter().collect();
                if let Some(name) = cells.get("model") {
                    model.get_or_insert_with(|| name.clone());
                }
                for (source, column) in XTREME_COLUMNS {
                    if let Some(v) = cells.get(*source).and_then(|v| parse_cell(v)) {
                        values.insert(column.to_string(), v);
                    }
                }
            }
            Ok(None) => debug!(path = %xtreme_path.display(), "XTREME 汇总为空"),
            Err(e) => warn!(path = %xtreme_path.display(), error = %e, "无法读取 XTREME 汇总"),
        }
    }

    if values.is_empty() && model.is_none() {
        return None;
    }
    let model = model
        .filter(|m| !m.is_empty())
        .or_else(|| dir.file_name().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();
    Some(ComparisonRow { model, values })
}
