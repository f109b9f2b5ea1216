// task_executor.rs
// 外部命令执行器，负责入口脚本、汇总工具与作业提交命令的执行、重试与超时处理。
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 待执行的外部命令
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// 直接继承父进程的标准输出/错误（长时间运行的评测脚本），不捕获输出
    pub inherit_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.inherit_output = true;
        self
    }

    /// 单行 shell 形式，用于日志与 `--wrap` 提交
    pub fn to_shell_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| shell_quote(s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_shell_line())
    }
}

/// 按 POSIX shell 规则对参数加引号
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// 外部命令的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// 退出码；被信号终止时为 None
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// 命令执行接口，便于在测试中替换真实进程
pub trait CommandRunner {
    /// 执行命令并返回结果；只有进程无法启动时才返回错误
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// 使用 std::process 启动真实进程
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env);
        debug!(command = %spec, "执行外部命令");

        let spawn_err = |e: std::io::Error| Error::Command {
            program: spec.program.clone(),
            reason: format!("无法启动进程: {}", e),
        };

        if spec.inherit_output {
            let status = command
                .stdin(Stdio::null())
                .status()
                .map_err(spawn_err)?;
            return Ok(CommandOutput {
                code: status.code(),
                ..Default::default()
            });
        }

        let output = command.stdin(Stdio::null()).output().map_err(spawn_err)?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 执行命令，失败时按重试策略重试。
///
/// 进程启动失败与非零退出都会触发重试；总耗时超过 `timeout_ms` 后不再重试。
pub fn execute_with_retry<R: CommandRunner + ?Sized>(
    runner: &R,
    spec: &CommandSpec,
    retry: &RetryConfig,
) -> Result<CommandOutput> {
    let start_time = Instant::now();
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match runner.run(spec) {
            Ok(output) if output.is_success() => return Ok(output),
            Ok(output) => Error::Command {
                program: spec.program.clone(),
                reason: format!(
                    "退出码 {}: {}",
                    output
                        .code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "信号终止".to_string()),
                    output.stderr.trim()
                ),
            },
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(error);
        }
        if start_time.elapsed() > Duration::from_millis(retry.timeout_ms) {
            return Err(Error::Command {
                program: spec.program.clone(),
                reason: format!("重试超时 ({} 次尝试后): {}", attempt, error),
            });
        }

        let delay = backoff_delay(retry.backoff_ms, attempt);
        warn!(
            program = %spec.program,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "命令失败，准备重试"
        );
        std::thread::sleep(delay);
    }
}

fn backoff_delay(backoff_ms: u64, attempt: u32) -> Duration {
    let base = backoff_ms.saturating_mul(attempt as u64);
    let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 2);
    Duration::from_millis(base.saturating_add(jitter))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    type Responder = Box<dyn Fn(&CommandSpec, usize) -> Result<CommandOutput>>;

    /// 按脚本返回结果并记录所有调用的命令
    pub struct ScriptedRunner {
        pub calls: RefCell<Vec<CommandSpec>>,
        responder: Responder,
    }

    impl ScriptedRunner {
        /// `responder` 收到命令及其调用序号（从0开始）
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&CommandSpec, usize) -> Result<CommandOutput> + 'static,
        {
            Self {
                calls: RefCell::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn always_ok(stdout: &str) -> Self {
            let stdout = stdout.to_string();
            Self::new(move |_, _| Ok(CommandOutput::success(stdout.clone())))
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let index = self.calls.borrow().len();
            self.calls.borrow_mut().push(spec.clone());
            (self.responder)(spec, index)
        }
    }

    pub fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff_ms: 0,
            timeout_ms: 60_000,
        }
    }
}
