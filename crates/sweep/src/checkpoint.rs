// checkpoint.rs
// 检查点发现：扫描检查点目录，校验配置与权重文件是否齐全，并按自然顺序返回待评测模型。
use crate::error::{Error, Result};
use crate::model::ModelRef;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.json";

/// 权重文件，任意一个存在即可（含分片索引）
const WEIGHT_FILES: &[&str] = &[
    "pytorch_model.bin",
    "model.safetensors",
    "pytorch_model.bin.index.json",
    "model.safetensors.index.json",
];

/// 验证检查点目录是否完整
pub fn verify_checkpoint(dir: &Path) -> Result<()> {
    if !dir.join(CONFIG_FILE).is_file() {
        return Err(Error::Checkpoint {
            path: dir.to_path_buf(),
            reason: "缺少必要文件: config.json".to_string(),
        });
    }

    if !WEIGHT_FILES.iter().any(|f| dir.join(f).is_file()) {
        return Err(Error::Checkpoint {
            path: dir.to_path_buf(),
            reason: "缺少模型权重文件 (pytorch_model.bin 或 model.safetensors)".to_string(),
        });
    }

    Ok(())
}

/// 发现检查点。
///
/// `root` 本身是完整检查点时只返回它；否则返回其下所有完整的直接子目录，
/// 来源名取 `root` 的最后一级目录名。不完整的子目录会被跳过并记录警告。
/// 路径先规范化，结果目录名与调用时的工作目录和路径写法无关。
pub fn discover_checkpoints(root: &Path) -> Result<Vec<ModelRef>> {
    if !root.is_dir() {
        return Err(Error::Checkpoint {
            path: root.to_path_buf(),
            reason: "检查点目录不存在".to_string(),
        });
    }
    let root = root.canonicalize()?;

    if verify_checkpoint(&root).is_ok() {
        debug!(path = %root.display(), "根目录本身即为检查点");
        return Ok(vec![ModelRef::from_path(&root, None, None)?]);
    }

    let source = root.file_name().map(|s| s.to_string_lossy().into_owned());

    let mut dirs = Vec::new();
    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));

    let mut checkpoints = Vec::new();
    for dir in dirs {
        match verify_checkpoint(&dir) {
            Ok(()) => checkpoints.push(ModelRef::from_path(&dir, source.as_deref(), None)?),
            Err(e) => warn!(path = %dir.display(), error = %e, "跳过不完整的检查点"),
        }
    }

    debug!(root = %root.display(), count = checkpoints.len(), "检查点扫描完成");
    Ok(checkpoints)
}

/// 自然顺序比较：连续数字按数值比较，使 ba200 排在 ba1000 之前
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_digits(&mut a);
                let nb = take_digits(&mut b);
                // 先比较去掉前导零后的长度，再逐位比较，避免大数溢出
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_checkpoint(dir: &Path, weights: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("config.json"), "{}").unwrap();
        fs::write(dir.join(weights), "").unwrap();
    }

    #[test]
    fn test_verify_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("ckpt");
        fs::create_dir_all(&dir).unwrap();
        assert!(verify_checkpoint(&dir).is_err());

        fs::write(dir.join("config.json"), "{}").unwrap();
        assert!(verify_checkpoint(&dir).is_err());

        fs::write(dir.join("model.safetensors.index.json"), "{}").unwrap();
        assert!(verify_checkpoint(&dir).is_ok());
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("mosaic-bert");
        make_checkpoint(&root.join("ep1-ba1000"), "pytorch_model.bin");
        make_checkpoint(&root.join("ep0-ba200"), "model.safetensors");
        make_checkpoint(&root.join("ep1-ba300"), "model.safetensors");
        fs::create_dir_all(root.join("incomplete")).unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let found = discover_checkpoints(&root).unwrap();
        let names: Vec<_> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["ep0-ba200", "ep1-ba300", "ep1-ba1000"]);
        assert!(found.iter().all(|m| m.source == "mosaic-bert"));
        assert_eq!(found[0].path, root.canonicalize().unwrap().join("ep0-ba200"));
    }

    #[test]
    fn test_root_is_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("runs").join("final");
        make_checkpoint(&root, "model.safetensors");

        let found = discover_checkpoints(&root).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].results_dir_name(), "runs--final");
    }

    #[test]
    fn test_root_spelling_does_not_change_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let runs = tmp.path().join("runs");
        let root = runs.join("final");
        make_checkpoint(&root, "model.safetensors");

        for spelling in [root.clone(), root.join("."), runs.join("final").join("..").join("final")] {
            let found = discover_checkpoints(&spelling).unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].results_dir_name(), "runs--final", "{}", spelling.display());
            assert_eq!(found[0].path, root.canonicalize().unwrap());
        }

        // 子目录分支使用同一来源名
        let sweep_root = runs.join("..").join("runs");
        let found = discover_checkpoints(&sweep_root).unwrap();
        assert_eq!(found[0].results_dir_name(), "runs--final");
    }

    #[test]
    fn test_missing_root() {
        let err = discover_checkpoints(&PathBuf::from("/nonexistent/ckpts")).unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("ba200", "ba1000"), Ordering::Less);
        assert_eq!(natural_cmp("ep10", "ep9"), Ordering::Greater);
        assert_eq!(natural_cmp("step007", "step7"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "b"), Ordering::Less);
        assert_eq!(natural_cmp("ckpt", "ckpt-1"), Ordering::Less);
    }
}
