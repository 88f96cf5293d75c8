#![warn(missing_docs)]

//! FSL T1 分割流水线.
//!
//! 对已转换的 T1 加权图像串行执行 FSL 命令: `bet` 做脑提取
//! (分数强度阈值 0.15, robust 模式, 输出二值掩膜), 然后 `fast`
//! 做三类组织分割 (CSF/GM/WM). 输入图像未做偏置场校正时,
//! `fast` 额外输出校正后图像与偏置场估计.
//!
//! 外部命令复用 `bids-berry` 的带超时工具执行器, 运行前检查
//! `$FSLDIR` 环境变量.

pub mod segment;

pub use segment::{check_fsl_env, segment_t1, SegmentError, SegmentOptions, SegmentOutputs};
