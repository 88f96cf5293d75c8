//! 弥散加权成像 (DWI) 合并.
//!
//! 一个受试者可能有多个 DTI 采集文件夹. 只有同时具备图像、`.bval` 与
//! `.bvec` 的文件夹才参与合并; 不完整的文件夹被排除并上报, 即使合并
//! 本身成功.

use std::fs;
use std::path::{Path, PathBuf};

use either::Either;
use itertools::Itertools;

use super::{io_err, Conversion, ConvertError, Converted, SkipReason};
use crate::consts::pattern;
use crate::discover::{match_pattern, remove_rescan};
use crate::modality::Modality;
use crate::tools::VolumeTools;

/// 一个 DTI 采集文件夹里的完整三元组.
#[derive(Debug, Clone)]
struct DwiTriplet {
    image: PathBuf,
    bval: PathBuf,
    bvec: PathBuf,
}

impl DwiTriplet {
    /// 在 `folder` 中定位三元组. 任一成员缺失时返回 `None`.
    fn locate(folder: &Path) -> Option<Self> {
        let bval = match_pattern(folder, "*.bval").into_iter().next()?;
        let bvec = match_pattern(folder, "*.bvec").into_iter().next()?;
        let image = match_pattern(folder, "*.nii*").into_iter().next()?;
        Some(Self { image, bval, bvec })
    }
}

/// 合并一个受试者的所有 DWI 采集.
///
/// `fixed_dti_list` 给定时使用该文件夹名列表, 否则按 `*DTI*` 搜索并
/// 剔除 rescan. 合并内容:
///
/// - 图像卷经外部合并工具拼接为 `<name>_dwi.nii.gz`;
/// - 各 `.bval` / `.bvec` 按文件夹发现顺序整文件依次串接
///   (不做交错) 为 `<name>_dwi.bval` / `<name>_dwi.bvec`.
///
/// 返回值中 [`Converted::incomplete`] 列出被排除的不完整文件夹;
/// 调用方必须上报它们, 部分数据的情况不允许被静默吞掉.
pub fn merge_dwi<T: VolumeTools>(
    folder_input: &Path,
    folder_output: &Path,
    name: &str,
    fixed_dti_list: Option<&[String]>,
    tools: &T,
) -> Result<Conversion, ConvertError> {
    let dti_list: Vec<PathBuf> = match fixed_dti_list {
        Some(list) => list.iter().map(|d| folder_input.join(d)).collect(),
        None => remove_rescan(match_pattern(folder_input, pattern::DWI)),
    };

    if dti_list.is_empty() {
        return Ok(Conversion::Skipped(SkipReason::ModalityMissing));
    }

    let (triplets, incomplete): (Vec<DwiTriplet>, Vec<PathBuf>) =
        dti_list.into_iter().partition_map(|folder| {
            match DwiTriplet::locate(&folder) {
                Some(t) => Either::Left(t),
                None => Either::Right(folder),
            }
        });

    // 一个完整三元组都没有: 没有可合并的数据.
    if triplets.is_empty() {
        return Ok(Conversion::Skipped(SkipReason::ModalityIncomplete));
    }

    fs::create_dir_all(folder_output).map_err(|e| io_err("创建目录", folder_output, e))?;

    let base = format!("{name}{}", Modality::Dwi.bids_suffix());

    let merged_image = folder_output.join(format!("{base}.nii.gz"));
    let images: Vec<PathBuf> = triplets.iter().map(|t| t.image.clone()).collect();
    tools.merge(&merged_image, &images)?;

    let merged_bval = folder_output.join(format!("{base}.bval"));
    concat_sidecars(triplets.iter().map(|t| t.bval.as_path()), &merged_bval)?;

    let merged_bvec = folder_output.join(format!("{base}.bvec"));
    concat_sidecars(triplets.iter().map(|t| t.bvec.as_path()), &merged_bvec)?;

    Ok(Conversion::Done(Converted {
        artifacts: vec![merged_image, merged_bval, merged_bvec],
        incomplete,
    }))
}

/// 将多个 sidecar 文本文件按序整文件串接到 `dest`.
fn concat_sidecars<'a, I>(parts: I, dest: &Path) -> Result<(), ConvertError>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut body = String::new();
    for part in parts {
        body.push_str(&fs::read_to_string(part).map_err(|e| io_err("读取", part, e))?);
    }
    fs::write(dest, body).map_err(|e| io_err("写入", dest, e))
}
