//! 各模态的 BIDS 转换器.
//!
//! 每个转换器把原始采集目录中的一种模态落位成规范命名的输出文件.
//! 转换结果统一为 `Result<Conversion, ConvertError>`:
//!
//! - 可恢复的 "跳过" 情形 (模态缺失/不完整/不支持的布局/已知坏文件)
//!   是 [`Conversion::Skipped`] 值, 不是错误;
//! - 真正的错误进 [`ConvertError`], 其中只有极少数是致命的
//!   (见 [`ConvertError::is_fatal`]), 其余按受试者粒度聚合上报.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::modality::Modality;
use crate::tools::ToolError;

pub mod dwi;
pub mod fieldmap;
pub mod flair;
pub mod fmri;
pub mod t1;

pub use dwi::merge_dwi;
pub use fieldmap::{convert_fieldmap, FixedFieldmap};
pub use flair::convert_flair;
pub use fmri::convert_fmri;
pub use t1::convert_t1;

/// 转换被跳过的原因. 全部可恢复, 由调用方聚合上报.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// 输入目录下没有该模态的任何候选.
    ModalityMissing,

    /// 有候选但数据不完整 (如场图缺幅值/相位一侧, DWI 缺 sidecar).
    ModalityIncomplete,

    /// 场图的第 4 维卷数组合不在支持范围内.
    UnsupportedLayout {
        /// 相位图卷数.
        phase: u16,
        /// 幅值图卷数.
        magnitude: u16,
    },

    /// 选中的文件在已知坏文件清单里.
    KnownBadFile(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ModalityMissing => write!(f, "模态缺失"),
            SkipReason::ModalityIncomplete => write!(f, "模态数据不完整"),
            SkipReason::UnsupportedLayout { phase, magnitude } => {
                write!(f, "不支持的场图布局 (phase={phase}, magnitude={magnitude})")
            }
            SkipReason::KnownBadFile(name) => write!(f, "已知坏文件 `{name}`"),
        }
    }
}

/// 一次成功转换产出的文件清单.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Converted {
    /// 写入输出目录的规范命名文件.
    pub artifacts: Vec<PathBuf>,

    /// 因数据不完整而被排除的输入文件夹. 目前仅 DWI 合并会产生,
    /// 即使合并成功也必须上报给调用方.
    pub incomplete: Vec<PathBuf>,
}

impl Converted {
    /// 由产出文件列表构造, 无不完整文件夹.
    #[inline]
    pub fn from_artifacts(artifacts: Vec<PathBuf>) -> Self {
        Self {
            artifacts,
            incomplete: Vec::new(),
        }
    }
}

/// 单模态转换的结果.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    /// 转换完成.
    Done(Converted),

    /// 转换被跳过. 原因见 [`SkipReason`].
    Skipped(SkipReason),
}

/// 转换错误.
#[derive(Debug)]
pub enum ConvertError {
    /// 同一模态存在多个无法仲裁的候选.
    Ambiguous {
        /// 模态.
        modality: Modality,
        /// 候选个数.
        count: usize,
    },

    /// 输出目录已存在. 幂等性保护, 同时充当并行批次的目录锁.
    OutputAlreadyExists(PathBuf),

    /// 外部工具调用失败.
    Tool(ToolError),

    /// 文件系统操作失败.
    Io {
        /// 操作名.
        op: &'static str,
        /// 相关路径.
        path: PathBuf,
        /// 底层 I/O 错误.
        source: std::io::Error,
    },
}

impl ConvertError {
    /// 该错误是否应当中止整个批次.
    ///
    /// 仅 FLAIR 的多候选歧义是致命的: 源数据的歧义被视为硬停止,
    /// 而不是跳过. 其余错误都按受试者粒度恢复.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConvertError::Ambiguous {
                modality: Modality::Flair,
                ..
            }
        )
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Ambiguous { modality, count } => {
                write!(f, "模态 {modality} 存在 {count} 个无法仲裁的候选")
            }
            ConvertError::OutputAlreadyExists(p) => {
                write!(f, "输出目录 `{}` 已存在", p.display())
            }
            ConvertError::Tool(e) => write!(f, "外部工具失败: {e}"),
            ConvertError::Io { op, path, source } => {
                write!(f, "{op} `{}` 失败: {source}", path.display())
            }
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConvertError::Tool(e) => Some(e),
            ConvertError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ToolError> for ConvertError {
    #[inline]
    fn from(e: ToolError) -> Self {
        ConvertError::Tool(e)
    }
}

/// 构造带路径上下文的 I/O 错误.
pub(crate) fn io_err(op: &'static str, path: &Path, source: std::io::Error) -> ConvertError {
    ConvertError::Io {
        op,
        path: path.to_owned(),
        source,
    }
}

/// 创建全新的输出目录. 目录已存在时返回 [`ConvertError::OutputAlreadyExists`].
pub(crate) fn create_fresh_dir(dir: &Path) -> Result<(), ConvertError> {
    std::fs::create_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            ConvertError::OutputAlreadyExists(dir.to_owned())
        } else {
            io_err("创建目录", dir, e)
        }
    })
}
