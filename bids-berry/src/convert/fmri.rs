//! 静息态功能像转换.

use std::fs;
use std::path::Path;

use super::{io_err, Conversion, ConvertError, Converted, SkipReason};
use crate::consts::pattern;
use crate::discover::{match_pattern, remove_rescan};
use crate::modality::Modality;

/// 提取并转换 fMRI 数据为 `<name>_task-rest_bold.nii.gz`.
///
/// `fixed_fmri` 给定时按该 glob 模式匹配候选文件夹, 否则按 `*fMRI*`
/// 搜索并剔除 rescan. 无候选返回 [`SkipReason::ModalityMissing`];
/// 多候选时取枚举顺序的第一个. 候选文件夹内没有图像文件时返回
/// [`SkipReason::ModalityIncomplete`].
pub fn convert_fmri(
    folder_input: &Path,
    folder_output: &Path,
    name: &str,
    fixed_fmri: Option<&str>,
) -> Result<Conversion, ConvertError> {
    let fmri_lst = match fixed_fmri {
        Some(fixed) => match_pattern(folder_input, fixed),
        None => remove_rescan(match_pattern(folder_input, pattern::FMRI)),
    };

    let Some(folder) = fmri_lst.first() else {
        return Ok(Conversion::Skipped(SkipReason::ModalityMissing));
    };

    let inner = match_pattern(folder, "*.nii*");
    let Some(src) = inner.first() else {
        return Ok(Conversion::Skipped(SkipReason::ModalityIncomplete));
    };

    fs::create_dir_all(folder_output).map_err(|e| io_err("创建目录", folder_output, e))?;

    let dest = folder_output.join(format!(
        "{name}_task-rest{}.nii.gz",
        Modality::Fmri.bids_suffix()
    ));
    fs::copy(src, &dest).map_err(|e| io_err("复制", src, e))?;

    Ok(Conversion::Done(Converted::from_artifacts(vec![dest])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fmri_missing() {
        let tmp = TempDir::new().unwrap();
        let got = convert_fmri(tmp.path(), &tmp.path().join("func"), "n", None).unwrap();
        assert_eq!(got, Conversion::Skipped(SkipReason::ModalityMissing));
    }

    #[test]
    fn test_fmri_converted_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("S010_fMRI");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("bold.nii.gz"), b"bold").unwrap();

        let out = tmp.path().join("func");
        let got = convert_fmri(tmp.path(), &out, "sub-01_ses-M00", None).unwrap();

        let expected = out.join("sub-01_ses-M00_task-rest_bold.nii.gz");
        assert_eq!(
            got,
            Conversion::Done(Converted::from_artifacts(vec![expected.clone()]))
        );
        assert!(expected.is_file());
    }

    #[test]
    fn test_fmri_empty_folder_is_incomplete() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("S010_fMRI")).unwrap();

        let got = convert_fmri(tmp.path(), &tmp.path().join("func"), "n", None).unwrap();
        assert_eq!(got, Conversion::Skipped(SkipReason::ModalityIncomplete));
    }
}
