//! `bet` + `fast` 命令链.

use std::env;
use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bids_berry::tools::{run_tool, ToolError};

/// 分割流水线错误.
#[derive(Debug)]
pub enum SegmentError {
    /// `$FSLDIR` 未设置或为空, FSL 环境不可用.
    FslEnvMissing,

    /// 外部命令失败.
    Tool(ToolError),

    /// 文件系统操作失败.
    Io {
        /// 相关路径.
        path: PathBuf,
        /// 底层 I/O 错误.
        source: std::io::Error,
    },
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::FslEnvMissing => write!(f, "环境变量 FSLDIR 未设置"),
            SegmentError::Tool(e) => write!(f, "外部命令失败: {e}"),
            SegmentError::Io { path, source } => {
                write!(f, "操作 `{}` 失败: {source}", path.display())
            }
        }
    }
}

impl Error for SegmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SegmentError::Tool(e) => Some(e),
            SegmentError::Io { source, .. } => Some(source),
            SegmentError::FslEnvMissing => None,
        }
    }
}

impl From<ToolError> for SegmentError {
    #[inline]
    fn from(e: ToolError) -> Self {
        SegmentError::Tool(e)
    }
}

/// 检查 FSL 环境, 返回 `$FSLDIR` 指向的安装目录.
pub fn check_fsl_env() -> Result<PathBuf, SegmentError> {
    match env::var("FSLDIR") {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => Err(SegmentError::FslEnvMissing),
    }
}

/// 分割流水线参数.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// 输入 T1 是否已做偏置场校正. 未校正时 `fast` 追加
    /// `-B -b` 输出校正后图像与偏置场估计.
    pub bias_corrected: bool,

    /// `bet` 的分数强度阈值. MRtrix 社区惯用 0.15.
    pub frac: f32,

    /// 单条命令的墙钟超时.
    pub timeout: Duration,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            bias_corrected: true,
            frac: 0.15,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// 分割流水线产物清单.
#[derive(Debug, Clone)]
pub struct SegmentOutputs {
    /// 脑提取结果 (输入未校正时为 `fast` 的校正后图像).
    pub brain_extracted: PathBuf,

    /// 脑区二值掩膜.
    pub bet_binary_mask: PathBuf,

    /// 三类组织 (0=CSF, 1=GM, 2=WM) 的部分容积估计.
    pub partial_volumes: [PathBuf; 3],

    /// 三类组织的二值分割图.
    pub tissue_classes: [PathBuf; 3],

    /// 偏置场估计. 仅在输入未校正时存在.
    pub bias_field: Option<PathBuf>,
}

/// 对一幅 T1 加权图像执行 `bet` + `fast` 分割链.
///
/// 产物落在 `datasink` 目录下: `brain.nii.gz` 及其掩膜来自 `bet`,
/// `fast_*` 系列来自 `fast`. 目录不存在时自动创建.
pub fn segment_t1<P, Q>(
    in_t1: P,
    datasink: Q,
    options: &SegmentOptions,
) -> Result<SegmentOutputs, SegmentError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let in_t1 = in_t1.as_ref();
    let datasink = datasink.as_ref();

    let fsl_dir = check_fsl_env()?;
    log::debug!("FSL 安装目录: {}", fsl_dir.display());

    fs::create_dir_all(datasink).map_err(|e| SegmentError::Io {
        path: datasink.to_owned(),
        source: e,
    })?;

    let brain = datasink.join("brain.nii.gz");
    run_tool(
        "bet",
        &[
            in_t1.into(),
            brain.clone().into(),
            OsString::from("-f"),
            OsString::from(options.frac.to_string()),
            OsString::from("-R"),
            OsString::from("-m"),
        ],
        options.timeout,
    )?;
    // bet 以 `<输出名>_mask` 命名掩膜.
    let mask = datasink.join("brain_mask.nii.gz");

    let fast_base = datasink.join("fast");
    let mut fast_args = vec![
        OsString::from("-t"),
        OsString::from("1"),
        OsString::from("-n"),
        OsString::from("3"),
        OsString::from("-g"),
        OsString::from("-o"),
        fast_base.clone().into(),
    ];
    if !options.bias_corrected {
        fast_args.push(OsString::from("-B"));
        fast_args.push(OsString::from("-b"));
    }
    fast_args.push(brain.clone().into());
    run_tool("fast", &fast_args, options.timeout)?;

    let fast_file = |suffix: &str| datasink.join(format!("fast_{suffix}.nii.gz"));

    let brain_extracted = if options.bias_corrected {
        brain
    } else {
        fast_file("restore")
    };

    Ok(SegmentOutputs {
        brain_extracted,
        bet_binary_mask: mask,
        partial_volumes: [fast_file("pve_0"), fast_file("pve_1"), fast_file("pve_2")],
        tissue_classes: [fast_file("seg_0"), fast_file("seg_1"), fast_file("seg_2")],
        bias_field: (!options.bias_corrected).then(|| fast_file("bias")),
    })
}
