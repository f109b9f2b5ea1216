// report.rs
// 终端表格输出：作业列表与跨模型对比表。
use crate::compare::Comparison;
use crate::task::{EvalJob, JobStatus};
use prettytable::{Cell, Row, Table};

/// 作业表：作业ID前缀、模型、状态、集群作业ID或失败原因
pub fn jobs_table(jobs: &[EvalJob]) -> Table {
    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("作业ID"),
        Cell::new("模型"),
        Cell::new("状态"),
        Cell::new("集群作业/备注"),
    ]));

    for job in jobs {
        let detail = match &job.status {
            JobStatus::Submitted { cluster_id } => cluster_id.clone(),
            JobStatus::Failed(reason) => reason.clone(),
            JobStatus::Skipped => "已有完成标记".to_string(),
            _ => String::new(),
        };
        table.add_row(Row::new(vec![
            Cell::new(job.short_id()),
            Cell::new(&job.model.results_dir_name()),
            Cell::new(&job.status.to_string()),
            Cell::new(&detail),
        ]));
    }
    table
}

/// 对比表：数值保留两位小数，缺失值留空
pub fn comparison_table(comparison: &Comparison) -> Table {
    let mut table = Table::new();
    let mut titles = vec![Cell::new("model")];
    titles.extend(comparison.columns.iter().map(|c| Cell::new(c)));
    table.set_titles(Row::new(titles));

    for row in &comparison.rows {
        let mut cells = vec![Cell::new(&row.model)];
        cells.extend(comparison.columns.iter().map(|c| {
            let text = row
                .values
                .get(c)
                .map(|v| format!("{:.2}", v))
                .unwrap_or_default();
            Cell::new(&text)
        }));
        table.add_row(Row::new(cells));
    }
    table
}
