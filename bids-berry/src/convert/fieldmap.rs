//! 场图 (fieldmap) 转换.
//!
//! 转换流程是一个小状态机: 发现候选 → 校验完整性 → 按第 4 维卷数
//! 分类布局 → 走单相位差或双相位路径. 布局分类完全由
//! `(相位卷数, 幅值卷数)` 决定:
//!
//! - `(1, >0)`: 相位差图直接落位, 幅值图切分后按 1 起始的序号重命名;
//! - `(2, 2)`: 相位与幅值都切分, `0000`/`0001` 重命名为 `1`/`2`;
//! - 其他组合: 不产出任何文件, 上报 [`SkipReason::UnsupportedLayout`].

use std::fs;
use std::path::{Path, PathBuf};

use super::{create_fresh_dir, io_err, Conversion, ConvertError, Converted, SkipReason};
use crate::consts::pattern;
use crate::discover::{file_name_string, match_pattern, remove_rescan};
use crate::modality::Modality;
use crate::tools::VolumeTools;

/// 场图两侧的固定覆盖文件夹. 为 `None` 的一侧走默认的 glob 搜索.
#[derive(Debug, Clone, Default)]
pub struct FixedFieldmap {
    /// 幅值 (magnitude) 侧覆盖.
    pub magnitude: Option<String>,

    /// 相位差 (phase) 侧覆盖.
    pub phase: Option<String>,
}

/// 提取并转换场图数据.
///
/// `denylist` 是已知坏文件名清单 (特定队列中无法读取的文件),
/// 由调用方注入; 命中清单的转换会以 [`SkipReason::KnownBadFile`]
/// 上报而非静默丢弃.
///
/// 输出目录必须不存在, 由本函数全新创建; 重复转换同一输出目录会得到
/// [`ConvertError::OutputAlreadyExists`]. 并行批次也借此把目录创建
/// 当作锁使用.
pub fn convert_fieldmap<T: VolumeTools>(
    folder_input: &Path,
    folder_output: &Path,
    name: &str,
    fixed: &FixedFieldmap,
    denylist: &[String],
    tools: &T,
) -> Result<Conversion, ConvertError> {
    // DISCOVER: 固定覆盖不做 rescan 过滤, 视为调用方的明确指定.
    let map = match &fixed.magnitude {
        Some(d) => match_pattern(folder_input.join(d), "*.nii.gz"),
        None => remove_rescan(match_pattern(folder_input, pattern::FIELDMAP_MAGNITUDE)),
    };
    let map_ph = match &fixed.phase {
        Some(d) => match_pattern(folder_input.join(d), "*.nii.gz"),
        None => remove_rescan(match_pattern(folder_input, pattern::FIELDMAP_PHASE)),
    };

    // VALIDATE_COMPLETENESS: 两侧全空与仅一侧空是两种不同的跳过原因.
    match (map.first(), map_ph.first()) {
        (None, None) => return Ok(Conversion::Skipped(SkipReason::ModalityMissing)),
        (None, Some(_)) | (Some(_), None) => {
            return Ok(Conversion::Skipped(SkipReason::ModalityIncomplete))
        }
        (Some(_), Some(_)) => {}
    }
    let map0 = &map[0];
    let ph0 = &map_ph[0];

    let map_name = file_name_string(map0);
    let ph_name = file_name_string(ph0);
    for bad in [&map_name, &ph_name] {
        if denylist.iter().any(|d| d == bad) {
            return Ok(Conversion::Skipped(SkipReason::KnownBadFile(bad.clone())));
        }
    }

    // CLASSIFY_LAYOUT: 读取两侧第 4 维卷数.
    let dim_map = tools.volumes(map0)?;
    let dim_ph = tools.volumes(ph0)?;

    match (dim_ph, dim_map) {
        (1, m) if m > 0 => {
            create_fresh_dir(folder_output)?;
            single_phase(folder_output, name, map0, ph0, tools)
        }
        (2, 2) => {
            create_fresh_dir(folder_output)?;
            dual_phase(folder_output, name, map0, ph0, tools)
        }
        (phase, magnitude) => Ok(Conversion::Skipped(SkipReason::UnsupportedLayout {
            phase,
            magnitude,
        })),
    }
}

/// 单相位差路径: 相位差图直接复制, 幅值图切分后按序重命名.
fn single_phase<T: VolumeTools>(
    folder_output: &Path,
    name: &str,
    map0: &Path,
    ph0: &Path,
    tools: &T,
) -> Result<Conversion, ConvertError> {
    let mut artifacts = Vec::new();

    let ph_dest = folder_output.join(format!(
        "{name}{}.nii.gz",
        Modality::SingleMapPh.bids_suffix()
    ));
    fs::copy(ph0, &ph_dest).map_err(|e| io_err("复制", ph0, e))?;
    artifacts.push(ph_dest);

    let mag_base = format!("{name}{}", Modality::Map.bids_suffix());
    tools.split(map0, &folder_output.join(&mag_base))?;

    // 切分产物形如 `<base>0000.nii.gz`; 去掉工具生成的序号尾部,
    // 换成 1 起始的序号.
    let mut pieces = match_pattern(folder_output, &format!("{mag_base}*"));
    pieces.sort();
    for (i, piece) in pieces.iter().enumerate() {
        artifacts.push(strip_and_renumber(folder_output, piece, i + 1)?);
    }

    Ok(Conversion::Done(Converted::from_artifacts(artifacts)))
}

/// 双相位路径: 相位与幅值各切分为恰好两卷并重命名.
fn dual_phase<T: VolumeTools>(
    folder_output: &Path,
    name: &str,
    map0: &Path,
    ph0: &Path,
    tools: &T,
) -> Result<Conversion, ConvertError> {
    let ph_base = format!("{name}{}", Modality::MultiMapPh.bids_suffix());
    let mag_base = format!("{name}{}", Modality::Map.bids_suffix());

    tools.split(ph0, &folder_output.join(&ph_base))?;
    tools.split(map0, &folder_output.join(&mag_base))?;

    let mut artifacts = Vec::with_capacity(4);
    for base in [&ph_base, &mag_base] {
        for (tool_index, ours) in [("0000", 1), ("0001", 2)] {
            let from = folder_output.join(format!("{base}{tool_index}.nii.gz"));
            let to = folder_output.join(format!("{base}{ours}.nii.gz"));
            fs::rename(&from, &to).map_err(|e| io_err("重命名", &from, e))?;
            artifacts.push(to);
        }
    }

    Ok(Conversion::Done(Converted::from_artifacts(artifacts)))
}

/// 去掉 `piece` 文件名中切分工具生成的序号与扩展名, 追加 `index`
/// 与 `.nii.gz` 后重命名.
fn strip_and_renumber(
    folder_output: &Path,
    piece: &Path,
    index: usize,
) -> Result<PathBuf, ConvertError> {
    let old = file_name_string(piece);
    // 切分工具的序号是纯 ASCII 数字, 逐字符剥离对含多字节字符的
    // 受试者名同样安全.
    let stem = old
        .strip_suffix(".nii.gz")
        .map_or(old.as_str(), |s| {
            s.trim_end_matches(|c: char| c.is_ascii_digit())
        });

    let dest = folder_output.join(format!("{stem}{index}.nii.gz"));
    fs::rename(piece, &dest).map_err(|e| io_err("重命名", piece, e))?;
    Ok(dest)
}
