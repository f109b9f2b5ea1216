// lib.rs
// 评测调度模块入口，声明并导出各子模块。
pub mod checkpoint;
pub mod compare;
pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod report;
pub mod result_merger;
pub mod scheduler;
pub mod submit;
pub mod task;
pub mod task_executor;
pub mod types;

pub use config::SweepConfig;
pub use error::{Error, Result};
pub use model::ModelRef;
