use std::fs;
use std::path::PathBuf;
use sweep::checkpoint::discover_checkpoints;
use sweep::error::Result;
use sweep::report::jobs_table;
use sweep::scheduler::{DriverInvocation, SweepScheduler};
use sweep::submit::DryRunBackend;
use sweep::SweepConfig;

/// 演示：构造一个检查点目录，标记其中一个已评测，然后以演练模式提交其余检查点
fn main() -> Result<()> {
    let workspace = std::env::temp_dir().join(format!("plan-sweep-demo-{}", std::process::id()));
    let ckpt_root = workspace.join("checkpoints").join("mosaic-bert");

    for step in ["ep0-ba500", "ep0-ba1000", "ep1-ba1500"] {
        let dir = ckpt_root.join(step);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("config.json"), "{}")?;
        fs::write(dir.join("model.safetensors"), "")?;
    }

    let config = SweepConfig {
        results_root: workspace.join("results"),
        ..SweepConfig::default()
    };

    // 第一个检查点已有完成标记
    let sentinel = config
        .results_root
        .join("mosaic-bert--ep0-ba500")
        .join(&config.sentinel);
    if let Some(parent) = sentinel.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&sentinel, "{}")?;

    let checkpoints = discover_checkpoints(&ckpt_root)?;
    println!("发现 {} 个检查点", checkpoints.len());

    let mut scheduler = SweepScheduler::new(config);
    let pending = scheduler.plan(checkpoints, false);
    println!("待提交 {} 个", pending);

    let backend = DryRunBackend::new();
    let driver = DriverInvocation {
        program: PathBuf::from("nlu-eval-sweep"),
        config_file: None,
    };
    let report = scheduler.launch(&backend, &driver);
    jobs_table(&report.jobs).printstd();

    for command in backend.commands.borrow().iter() {
        println!("{}", command);
    }

    fs::remove_dir_all(&workspace)?;
    Ok(())
}
