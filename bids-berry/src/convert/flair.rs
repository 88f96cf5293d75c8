//! T2 FLAIR 结构像转换.

use std::fs;
use std::path::Path;

use super::{io_err, Conversion, ConvertError, Converted, SkipReason};
use crate::consts::pattern;
use crate::discover::{match_pattern, remove_rescan};
use crate::modality::Modality;

/// 提取并转换 T2 FLAIR 数据.
///
/// 给定 `fixed_file` 覆盖时直接使用该文件夹的唯一内容; 否则在
/// `folder_input` 下按 `*T2FLAIR*` 搜索 (剔除 rescan):
///
/// - 无候选: 返回 [`SkipReason::ModalityMissing`], 由调用方聚合上报;
/// - 恰一个候选: 复制其中的 `.nii.gz` 为 `<name>_FLAIR.nii.gz`;
/// - 多个候选: 返回 [`ConvertError::Ambiguous`]. 对 FLAIR 而言源数据的
///   歧义是致命的, 会中止整个批次 (缺失软跳过、歧义硬停止的不对称是
///   有意保留的行为).
pub fn convert_flair(
    folder_input: &Path,
    folder_output: &Path,
    name: &str,
    fixed_file: Option<&str>,
) -> Result<Conversion, ConvertError> {
    if let Some(fixed) = fixed_file {
        let inner = match_pattern(folder_input.join(fixed), "*");
        let Some(src) = inner.first() else {
            return Ok(Conversion::Skipped(SkipReason::ModalityIncomplete));
        };
        return copy_flair(src, folder_output, name);
    }

    let flair_lst = remove_rescan(match_pattern(folder_input, pattern::FLAIR));
    match flair_lst.len() {
        0 => Ok(Conversion::Skipped(SkipReason::ModalityMissing)),
        1 => {
            let inner = match_pattern(&flair_lst[0], "*.nii.gz*");
            let Some(src) = inner.first() else {
                return Ok(Conversion::Skipped(SkipReason::ModalityIncomplete));
            };
            copy_flair(src, folder_output, name)
        }
        count => Err(ConvertError::Ambiguous {
            modality: Modality::Flair,
            count,
        }),
    }
}

fn copy_flair(src: &Path, folder_output: &Path, name: &str) -> Result<Conversion, ConvertError> {
    fs::create_dir_all(folder_output).map_err(|e| io_err("创建目录", folder_output, e))?;

    let dest = folder_output.join(format!("{name}{}.nii.gz", Modality::Flair.bids_suffix()));
    fs::copy(src, &dest).map_err(|e| io_err("复制", src, e))?;

    Ok(Conversion::Done(Converted::from_artifacts(vec![dest])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put_flair(root: &Path, folder: &str, file: &str) {
        let dir = root.join(folder);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(file), b"flair").unwrap();
    }

    #[test]
    fn test_flair_missing() {
        let tmp = TempDir::new().unwrap();
        let got = convert_flair(tmp.path(), &tmp.path().join("out"), "sub-01_ses-M00", None);
        assert_eq!(got.unwrap(), Conversion::Skipped(SkipReason::ModalityMissing));
    }

    #[test]
    fn test_flair_single_candidate() {
        let tmp = TempDir::new().unwrap();
        put_flair(tmp.path(), "S005_T2FLAIR", "scan.nii.gz");

        let out = tmp.path().join("out");
        let got = convert_flair(tmp.path(), &out, "sub-01_ses-M00", None).unwrap();

        let expected = out.join("sub-01_ses-M00_FLAIR.nii.gz");
        assert_eq!(
            got,
            Conversion::Done(Converted::from_artifacts(vec![expected.clone()]))
        );
        assert!(expected.is_file());
    }

    #[test]
    fn test_flair_rescan_excluded() {
        let tmp = TempDir::new().unwrap();
        put_flair(tmp.path(), "S005_T2FLAIR", "scan.nii.gz");
        put_flair(tmp.path(), "S006_T2FLAIR_rescan", "scan.nii.gz");

        // rescan 剔除后只剩一个候选, 正常转换而不是歧义.
        let got = convert_flair(tmp.path(), &tmp.path().join("out"), "n", None).unwrap();
        assert!(matches!(got, Conversion::Done(_)));
    }

    #[test]
    fn test_flair_ambiguous_is_fatal() {
        let tmp = TempDir::new().unwrap();
        put_flair(tmp.path(), "S005_T2FLAIR", "a.nii.gz");
        put_flair(tmp.path(), "S006_T2FLAIR", "b.nii.gz");

        let err = convert_flair(tmp.path(), &tmp.path().join("out"), "n", None).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Ambiguous {
                modality: Modality::Flair,
                count: 2
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_flair_fixed_override() {
        let tmp = TempDir::new().unwrap();
        put_flair(tmp.path(), "manual_pick", "chosen.nii.gz");
        // 歧义候选存在, 但 fixed 覆盖优先.
        put_flair(tmp.path(), "S005_T2FLAIR", "a.nii.gz");
        put_flair(tmp.path(), "S006_T2FLAIR", "b.nii.gz");

        let got =
            convert_flair(tmp.path(), &tmp.path().join("out"), "n", Some("manual_pick")).unwrap();
        assert!(matches!(got, Conversion::Done(_)));
    }
}
