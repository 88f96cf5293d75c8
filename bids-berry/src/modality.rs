//! 采集模态与其 BIDS 文件名后缀.

use std::error::Error;
use std::fmt;

/// 本系统支持的采集模态.
///
/// 每个模态对应一个固定的 BIDS 输出文件名后缀, 见 [`Modality::bids_suffix`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Modality {
    /// T1 加权结构像.
    T1,

    /// T2 加权结构像.
    T2,

    /// T2 FLAIR 结构像.
    Flair,

    /// 单相位差场图 (phase difference).
    SingleMapPh,

    /// 双相位场图 (两幅 phase 图).
    MultiMapPh,

    /// 场图幅值 (magnitude).
    Map,

    /// 静息态功能像.
    Fmri,

    /// 弥散加权成像.
    Dwi,
}

impl Modality {
    /// 获取该模态在 BIDS 标准下的文件名后缀.
    #[inline]
    pub const fn bids_suffix(self) -> &'static str {
        match self {
            Modality::T1 => "_T1w",
            Modality::T2 => "_T2w",
            Modality::Flair => "_FLAIR",
            Modality::SingleMapPh => "_phasediff",
            Modality::MultiMapPh => "_phase",
            Modality::Map => "_magnitude",
            Modality::Fmri => "_bold",
            Modality::Dwi => "_dwi",
        }
    }

    /// 获取该模态的惯用标签, 与 [`Modality::from_tag`] 互逆.
    #[inline]
    pub const fn tag(self) -> &'static str {
        match self {
            Modality::T1 => "T1",
            Modality::T2 => "T2",
            Modality::Flair => "Flair",
            Modality::SingleMapPh => "SingleMapPh",
            Modality::MultiMapPh => "MultiMapPh",
            Modality::Map => "Map",
            Modality::Fmri => "fMRI",
            Modality::Dwi => "dwi",
        }
    }

    /// 从惯用标签解析模态.
    ///
    /// 若 `tag` 不是已知标签, 则返回 [`UnknownModality`]. 该错误通常意味着
    /// 上层配置有误, 应当显式处理而非忽略.
    pub fn from_tag(tag: &str) -> Result<Self, UnknownModality> {
        match tag {
            "T1" => Ok(Modality::T1),
            "T2" => Ok(Modality::T2),
            "Flair" => Ok(Modality::Flair),
            "SingleMapPh" => Ok(Modality::SingleMapPh),
            "MultiMapPh" => Ok(Modality::MultiMapPh),
            "Map" => Ok(Modality::Map),
            "fMRI" => Ok(Modality::Fmri),
            "dwi" => Ok(Modality::Dwi),
            other => Err(UnknownModality(other.to_owned())),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 未知模态标签错误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModality(pub String);

impl fmt::Display for UnknownModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知的模态标签 `{}`", self.0)
    }
}

impl Error for UnknownModality {}
