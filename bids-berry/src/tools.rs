//! 外部协作工具.
//!
//! 卷切分/卷合并由 FSL 的 `fslsplit` / `fslmerge` 外部进程完成,
//! 第 4 维卷数从 nifti 文件 header 读取. 三者统一收敛在 [`VolumeTools`]
//! trait 后面, 以便转换逻辑在测试中注入替身.
//!
//! 所有外部进程调用都带显式超时, 非零退出码被归类为可恢复的
//! [`ToolError`], 而不是让整个批次崩溃.

use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nifti::{NiftiObject, ReaderOptions};

/// 外部进程的轮询间隔.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 外部工具调用错误.
#[derive(Debug)]
pub enum ToolError {
    /// 进程无法启动 (通常是工具未安装或不在 `PATH` 中).
    Launch {
        /// 工具名.
        tool: &'static str,
        /// 底层 I/O 错误.
        source: std::io::Error,
    },

    /// 等待进程时的底层错误.
    Wait {
        /// 工具名.
        tool: &'static str,
        /// 底层 I/O 错误.
        source: std::io::Error,
    },

    /// 进程以非零退出码结束.
    NonZeroExit {
        /// 工具名.
        tool: &'static str,
        /// 退出码. 进程被信号杀死时为 `None`.
        code: Option<i32>,
        /// 进程的标准错误输出.
        stderr: String,
    },

    /// 进程超过时限, 已被杀死.
    Timeout {
        /// 工具名.
        tool: &'static str,
        /// 时限.
        limit: Duration,
    },

    /// 读取 nifti header 失败.
    Header {
        /// 文件路径.
        path: PathBuf,
        /// 底层 nifti 错误.
        source: nifti::NiftiError,
    },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Launch { tool, source } => {
                write!(f, "无法启动 `{tool}`: {source}")
            }
            ToolError::Wait { tool, source } => {
                write!(f, "等待 `{tool}` 时出错: {source}")
            }
            ToolError::NonZeroExit { tool, code, stderr } => match code {
                Some(c) => write!(f, "`{tool}` 以退出码 {c} 结束: {stderr}"),
                None => write!(f, "`{tool}` 被信号终止: {stderr}"),
            },
            ToolError::Timeout { tool, limit } => {
                write!(f, "`{tool}` 超过时限 {limit:?}, 已被杀死")
            }
            ToolError::Header { path, source } => {
                write!(f, "读取 `{}` 的 header 失败: {source}", path.display())
            }
        }
    }
}

impl Error for ToolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ToolError::Launch { source, .. } | ToolError::Wait { source, .. } => Some(source),
            ToolError::Header { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// 卷级外部操作的统一入口.
///
/// 生产环境使用 [`FslTools`]; 测试注入替身即可在无 FSL
/// 的机器上验证转换逻辑.
pub trait VolumeTools {
    /// 将 4D 图像 `image` 按卷切分, 输出文件以 `out_base` 为前缀,
    /// 后接工具自定的 4 位序号与扩展名.
    fn split(&self, image: &Path, out_base: &Path) -> Result<(), ToolError>;

    /// 将 `inputs` 中的图像按时间维拼接为 `output`.
    fn merge(&self, output: &Path, inputs: &[PathBuf]) -> Result<(), ToolError>;

    /// 读取 `image` 的第 4 维卷数.
    fn volumes(&self, image: &Path) -> Result<u16, ToolError>;
}

/// 基于 FSL 命令行工具的 [`VolumeTools`] 实现.
#[derive(Debug, Clone)]
pub struct FslTools {
    timeout: Duration,
}

impl FslTools {
    /// 创建实例. `timeout` 为单次外部进程调用的时限.
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl VolumeTools for FslTools {
    fn split(&self, image: &Path, out_base: &Path) -> Result<(), ToolError> {
        run_tool(
            "fslsplit",
            &[image.as_os_str().to_owned(), out_base.as_os_str().to_owned()],
            self.timeout,
        )
    }

    fn merge(&self, output: &Path, inputs: &[PathBuf]) -> Result<(), ToolError> {
        let mut args = Vec::with_capacity(inputs.len() + 2);
        args.push(OsString::from("-t"));
        args.push(output.as_os_str().to_owned());
        args.extend(inputs.iter().map(|p| p.as_os_str().to_owned()));
        run_tool("fslmerge", &args, self.timeout)
    }

    fn volumes(&self, image: &Path) -> Result<u16, ToolError> {
        probe_volumes(image)
    }
}

/// 读取 nifti 文件的第 4 维卷数 (header `dim[4]`).
pub fn probe_volumes<P: AsRef<Path>>(image: P) -> Result<u16, ToolError> {
    let obj = ReaderOptions::new()
        .read_file(image.as_ref())
        .map_err(|e| ToolError::Header {
            path: image.as_ref().to_owned(),
            source: e,
        })?;

    // dim[0] 为维度个数, dim[4] 为第 4 维 (时间/卷) 大小.
    let [_, _, _, _, volumes, ..] = obj.header().dim;
    Ok(volumes)
}

/// 运行一个外部进程并等待其结束.
///
/// 进程的标准输出被丢弃, 标准错误在结束后收集进错误信息.
/// 超过 `timeout` 的进程会被杀死并返回 [`ToolError::Timeout`];
/// 非零退出码返回 [`ToolError::NonZeroExit`].
pub fn run_tool(tool: &'static str, args: &[OsString], timeout: Duration) -> Result<(), ToolError> {
    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::Launch { tool, source: e })?;

    // 标准错误必须在进程存活期间持续排空: 子进程写满管道缓冲区后
    // 会永久阻塞, 再也走不到退出.
    let mut stderr_reader = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = stderr_reader
                    .take()
                    .and_then(|h| h.join().ok())
                    .unwrap_or_default();
                if status.success() {
                    return Ok(());
                }
                return Err(ToolError::NonZeroExit {
                    tool,
                    code: status.code(),
                    stderr: stderr.trim().to_owned(),
                });
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Timeout {
                        tool,
                        limit: timeout,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Wait { tool, source: e });
            }
        }
    }
}
