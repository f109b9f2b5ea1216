//! nlu-eval-sweep：编码器模型 GLUE / XTREME 评测的驱动、检查点扫描与结果汇总

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use sweep::checkpoint::discover_checkpoints;
use sweep::compare::Comparison;
use sweep::driver::EvalDriver;
use sweep::report::{comparison_table, jobs_table};
use sweep::result_merger::ResultMerger;
use sweep::scheduler::{DriverInvocation, SweepScheduler};
use sweep::submit::{BatchBackend, DryRunBackend, JobBackend, LocalBackend};
use sweep::task_executor::SystemRunner;
use sweep::types::COMBINED_CSV;
use sweep::{ModelRef, SweepConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "nlu-eval-sweep")]
#[command(about = "Evaluate encoder checkpoints on GLUE / XTREME and aggregate the results")]
struct Cli {
    /// TOML 配置文件
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 对一个模型依次运行全部子集，然后汇总结果
    Run {
        /// 模型路径或模型仓库ID
        #[arg(long, short = 'm')]
        model: PathBuf,
        /// 来源目录名，默认取模型路径的上一级目录
        #[arg(long)]
        source: Option<String>,
        /// 模型名，默认取模型路径的最后一级
        #[arg(long)]
        name: Option<String>,
    },
    /// 为每个尚未评测的检查点提交一个评测作业
    Sweep {
        /// 检查点目录
        #[arg(long)]
        checkpoints: PathBuf,
        #[arg(long, value_enum, default_value_t = Backend::Batch)]
        backend: Backend,
        /// 忽略完成标记，重新提交所有检查点
        #[arg(long)]
        force: bool,
        /// 以 JSON 输出扫描清单
        #[arg(long)]
        json: bool,
    },
    /// 重新汇总结果目录（默认：结果根目录下的所有模型目录）
    Gather { dirs: Vec<PathBuf> },
    /// 生成跨模型对比表
    Compare {
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// 集群批处理提交
    Batch,
    /// 在本机前台依次运行
    Local,
    /// 只打印命令
    DryRun,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SweepConfig::load(cli.config.as_deref()).context("加载配置失败")?;

    match cli.command {
        Commands::Run {
            model,
            source,
            name,
        } => run_model(&config, model, source.as_deref(), name.as_deref()),
        Commands::Sweep {
            checkpoints,
            backend,
            force,
            json,
        } => sweep_checkpoints(&config, cli.config.as_deref(), &checkpoints, backend, force, json),
        Commands::Gather { dirs } => gather(&config, dirs),
        Commands::Compare { output } => compare(&config, output),
    }
}

fn run_model(
    config: &SweepConfig,
    model: PathBuf,
    source: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let model = ModelRef::from_path(model, source, name)?;
    let report = EvalDriver::new(config, &SystemRunner).run(&model)?;

    println!("\n=== 评测结束: {} ===", report.model);
    println!("结果目录: {}", report.results_dir.display());
    println!("子集: {} 个，失败 {} 个", report.subsets_run, report.failed_subsets.len());
    for (subset, reason) in &report.failed_subsets {
        println!("  子集 {}: {}", subset, reason);
    }
    if let Some(e) = &report.gather_error {
        println!("汇总失败: {}", e);
    }

    if !report.is_success() {
        bail!("模型 {} 的评测未全部成功", report.model);
    }
    Ok(())
}

fn sweep_checkpoints(
    config: &SweepConfig,
    config_file: Option<&Path>,
    checkpoints: &Path,
    backend: Backend,
    force: bool,
    json: bool,
) -> Result<()> {
    let found = discover_checkpoints(checkpoints)?;
    if found.is_empty() {
        warn!(root = %checkpoints.display(), "没有找到检查点");
        return Ok(());
    }

    // 作业可能在其他工作目录启动，配置文件使用绝对路径
    let config_file = config_file
        .map(|p| p.canonicalize().with_context(|| format!("无法解析配置文件路径 {}", p.display())))
        .transpose()?;
    let driver = DriverInvocation {
        program: std::env::current_exe().context("无法获取当前可执行文件路径")?,
        config_file,
    };

    let mut scheduler = SweepScheduler::new(config.clone());
    let pending = scheduler.plan(found, force);
    info!(pending, "开始提交");

    let runner = SystemRunner;
    let backend: Box<dyn JobBackend + '_> = match backend {
        Backend::Batch => Box::new(BatchBackend::new(
            &runner,
            config.submit.clone(),
            config.retry.clone(),
        )),
        Backend::Local => Box::new(LocalBackend::new(&runner)),
        Backend::DryRun => Box::new(DryRunBackend::new()),
    };
    let report = scheduler.launch(backend.as_ref(), &driver);

    if backend.name() != "dry-run" {
        report.write_manifest(&config.results_root)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        jobs_table(&report.jobs).printstd();
    }

    if report.failed() > 0 {
        bail!("{} 个作业提交失败", report.failed());
    }
    Ok(())
}

fn gather(config: &SweepConfig, dirs: Vec<PathBuf>) -> Result<()> {
    let merger = ResultMerger::from_config(config);
    let report = if dirs.is_empty() {
        merger.gather_all(&SystemRunner, &config.results_root)?
    } else {
        merger.gather_dirs(&SystemRunner, &dirs)?
    };

    println!("已汇总 {} 个模型目录", report.gathered.len());
    for (model, reason) in &report.failed {
        println!("  失败 {}: {}", model, reason);
    }
    if !report.failed.is_empty() {
        bail!("{} 个模型目录汇总失败", report.failed.len());
    }
    Ok(())
}

fn compare(config: &SweepConfig, output: Option<PathBuf>) -> Result<()> {
    let comparison = Comparison::from_results_root(&config.results_root)?;
    if comparison.is_empty() {
        println!("没有找到任何结果！");
        return Ok(());
    }

    let output = output.unwrap_or_else(|| PathBuf::from(COMBINED_CSV));
    comparison.write_csv(&output)?;
    println!("结果已保存到 {}", output.display());
    println!("列: {:?}", comparison.columns);
    comparison_table(&comparison).printstd();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sweep_with_global_config() {
        let cli = Cli::try_parse_from([
            "nlu-eval-sweep",
            "sweep",
            "--checkpoints",
            "ckpts/bert",
            "--backend",
            "dry-run",
            "--config",
            "sweep.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("sweep.toml")));
        match cli.command {
            Commands::Sweep {
                checkpoints,
                backend,
                force,
                json,
            } => {
                assert_eq!(checkpoints, PathBuf::from("ckpts/bert"));
                assert_eq!(backend, Backend::DryRun);
                assert!(!force);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_and_gather() {
        let cli = Cli::try_parse_from(["nlu-eval-sweep", "-v", "run", "-m", "org/model", "--name", "final"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Run { ref name, ref source, .. } if name.as_deref() == Some("final") && source.is_none()
        ));

        let cli = Cli::try_parse_from(["nlu-eval-sweep", "gather", "results/a--1", "results/b--2"]).unwrap();
        assert!(matches!(cli.command, Commands::Gather { ref dirs } if dirs.len() == 2));
    }

    #[test]
    fn test_driver_command_round_trips_through_cli() {
        let config = SweepConfig::default();
        let mut scheduler = SweepScheduler::new(config);
        let model = ModelRef::from_path("/ckpts/bert/ep1-ba100", None, None).unwrap();
        scheduler.plan(vec![model], true);
        let job = scheduler.fetch_next_task().unwrap();
        let driver = DriverInvocation {
            program: PathBuf::from("nlu-eval-sweep"),
            config_file: Some(PathBuf::from("/etc/sweep.toml")),
        };
        let spec = scheduler.driver_command(&job, &driver);

        let argv = std::iter::once(spec.program.clone()).chain(spec.args.clone());
        let cli = Cli::try_parse_from(argv).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sweep.toml")));
        match cli.command {
            Commands::Run { model, source, name } => {
                assert_eq!(model, PathBuf::from("/ckpts/bert/ep1-ba100"));
                assert_eq!(source.as_deref(), Some("bert"));
                assert_eq!(name.as_deref(), Some("ep1-ba100"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
