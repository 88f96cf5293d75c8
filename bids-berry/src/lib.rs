#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 把原始 MRI 采集目录转换为 BIDS 规范的目录结构,
//! 并提供 CAPS 产物目录的输入清单与路径模板.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 转换逻辑不直接写日志: 每个受试者的逐模态结果收敛为结构化
//!   报告 ([`SubjectReport`] / [`BatchReport`]), 由调用方决定呈现方式.
//!   只有 rescan 剔除这类发现期动作会经 `log` 门面发出警告.
//! 2. 外部工具 (fslsplit / fslmerge) 经 [`tools::VolumeTools`]
//!   特征注入, 测试无需真实 FSL 环境即可覆盖转换分支.
//! 3. 可恢复的跳过情形 (模态缺失/不完整/不支持的布局/已知坏文件)
//!   是值, 不是错误; 错误中只有 FLAIR 多候选歧义会中止整个批次.
//!
//! # 功能速览
//!
//! ### 模态发现与仲裁
//!
//! glob 模式匹配、rescan 剔除、梯度校正优先级选择.
//! 实现位于 `bids-berry/src/discover.rs`.
//!
//! ### 逐模态转换器
//!
//! T1 / FLAIR / fMRI 的单文件转换, 场图的单相位/双相位状态机,
//! DWI 多采集合并 (图像拼接 + sidecar 串接).
//! 实现位于 `bids-berry/src/convert/*`.
//!
//! ### 批量驱动
//!
//! 受试者粒度的转换任务描述与批次执行, 输出目录创建即加锁;
//! 开启 `rayon` feature 后受试者并行.
//! 实现位于 `bids-berry/src/batch.rs`.
//!
//! ### CAPS 输入层
//!
//! 受试者清单/诊断 TSV 解析, 体素/区域/顶点三类特征文件的路径模板
//! 与批量存在性检查. 实现位于 `bids-berry/src/caps.rs`.

/// 固定字符串与 glob 模式.
pub mod consts;

pub mod batch;
pub mod caps;
pub mod convert;
pub mod discover;
pub mod modality;
pub mod prelude;
pub mod report;
pub mod tools;

pub use batch::{convert_subject, run_batch, SubjectSpec};
pub use convert::{Conversion, ConvertError, Converted, SkipReason};
pub use modality::Modality;
pub use report::{BatchReport, ModalityOutcome, SubjectReport};
pub use tools::{FslTools, ToolError, VolumeTools};
