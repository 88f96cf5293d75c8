//! T1 加权结构像转换.

use std::fs;
use std::path::Path;

use super::{io_err, Conversion, ConvertError, Converted};
use crate::modality::Modality;

/// 将指定的 T1 图像复制为 `<folder_output>/<name>_T1w.nii.gz`.
///
/// 与其他模态不同, T1 不做候选搜索: 上游流程 (通常经过
/// [`choose_correction`](crate::discover::choose_correction) 仲裁)
/// 已经确定了准确的输入文件. 输出目录不存在时自动创建.
pub fn convert_t1(
    t1_path: &Path,
    folder_output: &Path,
    name: &str,
) -> Result<Conversion, ConvertError> {
    fs::create_dir_all(folder_output).map_err(|e| io_err("创建目录", folder_output, e))?;

    let dest = folder_output.join(format!("{name}{}.nii.gz", Modality::T1.bids_suffix()));
    fs::copy(t1_path, &dest).map_err(|e| io_err("复制", t1_path, e))?;

    Ok(Conversion::Done(Converted::from_artifacts(vec![dest])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_t1_round_trip_name() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw_t1.nii.gz");
        fs::write(&src, b"t1-data").unwrap();

        let out = tmp.path().join("anat");
        let got = convert_t1(&src, &out, "sub-01_ses-M00").unwrap();

        let expected = out.join("sub-01_ses-M00_T1w.nii.gz");
        assert_eq!(
            got,
            Conversion::Done(Converted::from_artifacts(vec![expected.clone()]))
        );
        assert_eq!(fs::read(expected).unwrap(), b"t1-data");
    }

    #[test]
    fn test_t1_missing_source_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let got = convert_t1(
            &PathBuf::from("/no/such/file.nii.gz"),
            &tmp.path().join("anat"),
            "sub-01_ses-M00",
        );
        assert!(matches!(got, Err(ConvertError::Io { .. })));
    }
}
