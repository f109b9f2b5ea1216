// model.rs
// 模型引用：由模型路径推导来源目录与模型名，并据此定位 `<来源>--<模型名>` 结果目录。
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// 没有上级目录时使用的来源名
pub const DEFAULT_SOURCE: &str = "local";

/// 待评测模型（本地检查点目录或模型仓库ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// 传给评测入口脚本的模型路径
    pub path: PathBuf,
    /// 来源目录名
    pub source: String,
    /// 模型名
    pub name: String,
}

impl ModelRef {
    /// 由路径推导模型引用，`source`/`name` 可显式覆盖。
    /// 例如 `checkpoints/mosaic-bert/ep1-ba1000` 得到来源 `mosaic-bert`、模型名 `ep1-ba1000`。
    pub fn from_path(
        path: impl Into<PathBuf>,
        source: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self> {
        let path = path.into();
        let mut components = path
            .components()
            .rev()
            .filter_map(|c| match c {
                std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            });

        let derived_name = components.next();
        let derived_source = components.next();

        let name = match name {
            Some(name) => name.to_string(),
            None => derived_name.ok_or_else(|| {
                Error::Config(format!("无法从路径推导模型名: {}", path.display()))
            })?,
        };
        let source = source
            .map(str::to_string)
            .or(derived_source)
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        validate_component("模型名", &name)?;
        validate_component("来源", &source)?;
        Ok(Self { path, source, name })
    }

    /// 结果目录名：`<来源>--<模型名>`
    pub fn results_dir_name(&self) -> String {
        format!("{}--{}", self.source, self.name)
    }

    pub fn results_dir(&self, results_root: &Path) -> PathBuf {
        results_root.join(self.results_dir_name())
    }

    /// 完成标记文件存在即视为已评测
    pub fn is_evaluated(&self, results_root: &Path, sentinel: &Path) -> bool {
        self.results_dir(results_root).join(sentinel).is_file()
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.results_dir_name())
    }
}

fn validate_component(label: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{}不能为空", label)));
    }
    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(Error::Config(format!("{}包含非法字符: {}", label, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_derive_from_checkpoint_path() {
        let model = ModelRef::from_path("checkpoints/mosaic-bert/ep1-ba1000", None, None).unwrap();
        assert_eq!(model.source, "mosaic-bert");
        assert_eq!(model.name, "ep1-ba1000");
        assert_eq!(model.results_dir_name(), "mosaic-bert--ep1-ba1000");
    }

    #[test]
    fn test_hub_id_and_trailing_slash() {
        let model = ModelRef::from_path("answerdotai/ModernBERT-base/", None, None).unwrap();
        assert_eq!(model.results_dir_name(), "answerdotai--ModernBERT-base");
    }

    #[test]
    fn test_single_component_uses_default_source() {
        let model = ModelRef::from_path("bert-base-multilingual-cased", None, None).unwrap();
        assert_eq!(model.results_dir_name(), "local--bert-base-multilingual-cased");
    }

    #[test]
    fn test_overrides_and_validation() {
        let model = ModelRef::from_path("/tmp/x/y", Some("sweep1"), Some("final")).unwrap();
        assert_eq!(model.results_dir_name(), "sweep1--final");
        assert_eq!(model.path, PathBuf::from("/tmp/x/y"));

        assert!(ModelRef::from_path("/", None, None).is_err());
        assert!(ModelRef::from_path("a/b", Some("x/y"), None).is_err());
        assert!(ModelRef::from_path("a/b", None, Some(" ")).is_err());
    }

    #[test]
    fn test_is_evaluated_checks_sentinel() {
        let root = tempfile::tempdir().unwrap();
        let model = ModelRef::from_path("ckpts/run/step-10", None, None).unwrap();
        let sentinel = Path::new("udpos/all_results.json");
        assert!(!model.is_evaluated(root.path(), sentinel));

        let task_dir = model.results_dir(root.path()).join("udpos");
        fs::create_dir_all(&task_dir).unwrap();
        assert!(!model.is_evaluated(root.path(), sentinel));

        fs::write(task_dir.join("all_results.json"), "{}").unwrap();
        assert!(model.is_evaluated(root.path(), sentinel));
    }
}
