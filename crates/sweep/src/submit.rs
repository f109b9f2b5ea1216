// submit.rs
// 作业提交后端：集群批处理提交（默认 sbatch）、本地前台执行与仅打印命令的演练模式。
use crate::config::{RetryConfig, SubmitConfig};
use crate::error::{Error, Result};
use crate::task::{EvalJob, JobStatus};
use crate::task_executor::{execute_with_retry, CommandRunner, CommandSpec};
use std::cell::RefCell;
use std::fs;
use tracing::info;

/// 作业提交接口，返回提交后的作业状态
pub trait JobBackend {
    fn name(&self) -> &str;

    /// 提交一个评测作业；`command` 是在作业内运行的驱动命令
    fn submit(&self, job: &EvalJob, command: &CommandSpec) -> Result<JobStatus>;
}

/// 集群批处理提交
pub struct BatchBackend<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: SubmitConfig,
    retry: RetryConfig,
}

impl<'a, R: CommandRunner + ?Sized> BatchBackend<'a, R> {
    pub fn new(runner: &'a R, config: SubmitConfig, retry: RetryConfig) -> Self {
        Self {
            runner,
            config,
            retry,
        }
    }

    /// 展开参数模板中的占位符
    pub fn expand_args(&self, job_name: &str, log_path: &str, command: &str) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{job_name}", job_name)
                    .replace("{log_path}", log_path)
                    .replace("{command}", command)
            })
            .collect()
    }
}

impl<'a, R: CommandRunner + ?Sized> JobBackend for BatchBackend<'a, R> {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn submit(&self, job: &EvalJob, command: &CommandSpec) -> Result<JobStatus> {
        fs::create_dir_all(&self.config.log_dir)?;
        let job_name = job.job_name(&self.config.job_name_prefix);
        // %j 由调度系统替换为作业ID
        let log_path = self.config.log_dir.join(format!("{}.%j.log", job_name));

        let spec = CommandSpec::new(self.config.program.clone()).args(self.expand_args(
            &job_name,
            &log_path.to_string_lossy(),
            &command.to_shell_line(),
        ));
        let output = execute_with_retry(self.runner, &spec, &self.retry)?;

        let cluster_id = parse_job_id(&output.stdout).ok_or_else(|| {
            Error::Submit(format!(
                "无法从提交输出中解析作业ID: {:?}",
                output.stdout.trim()
            ))
        })?;
        info!(model = %job.model, cluster_id = %cluster_id, "作业已提交");
        Ok(JobStatus::Submitted { cluster_id })
    }
}

/// 从提交命令输出中解析作业ID。
/// 支持 `--parsable` 形式（`12345` 或 `12345;cluster`）与 `Submitted batch job 12345`。
pub fn parse_job_id(stdout: &str) -> Option<String> {
    let is_id = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let first = line.split(';').next().unwrap_or_default();
        if is_id(first) {
            return Some(first.to_string());
        }
        if let Some(token) = line.split_whitespace().rev().find(|t| is_id(*t)) {
            return Some(token.to_string());
        }
    }
    None
}

/// 本地前台执行：驱动命令在当前进程中同步运行
pub struct LocalBackend<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> LocalBackend<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }
}

impl<'a, R: CommandRunner + ?Sized> JobBackend for LocalBackend<'a, R> {
    fn name(&self) -> &str {
        "local"
    }

    fn submit(&self, job: &EvalJob, command: &CommandSpec) -> Result<JobStatus> {
        info!(model = %job.model, command = %command, "本地执行评测");
        let output = self.runner.run(&command.clone().inherit_output())?;
        if !output.is_success() {
            return Err(Error::Command {
                program: command.program.clone(),
                reason: format!("本地评测失败，退出码 {:?}", output.code),
            });
        }
        Ok(JobStatus::Completed)
    }
}

/// 演练模式：只记录将要提交的命令
#[derive(Default)]
pub struct DryRunBackend {
    pub commands: RefCell<Vec<String>>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn submit(&self, job: &EvalJob, command: &CommandSpec) -> Result<JobStatus> {
        let line = command.to_shell_line();
        info!(model = %job.model, command = %line, "演练模式，不提交");
        let mut commands = self.commands.borrow_mut();
        commands.push(line);
        Ok(JobStatus::Submitted {
            cluster_id: format!("dry-run-{}", commands.len()),
        })
    }
}
