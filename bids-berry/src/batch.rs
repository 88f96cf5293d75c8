//! 批量转换驱动.
//!
//! 每个受试者/会话的转换相互独立, 各自拥有独立的输出目录
//! (目录创建即加锁), 因此可以安全并行. 受试者内部的失败按
//! [`ConvertError::is_fatal`] 分流: 致命错误中止整个批次,
//! 其余聚合进 [`BatchReport`] 上报.

use std::env;
use std::path::{Path, PathBuf};

use crate::convert::{
    convert_flair, convert_fmri, convert_t1, merge_dwi, ConvertError, FixedFieldmap,
};
use crate::convert::{convert_fieldmap, create_fresh_dir, io_err};
use crate::modality::Modality;
use crate::report::{BatchReport, SubjectReport};
use crate::tools::VolumeTools;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 一个受试者/会话的转换任务描述.
#[derive(Debug, Clone)]
pub struct SubjectSpec {
    /// 受试者-会话名, 形如 `sub-01_ses-M00`. 同时是输出文件名前缀.
    pub name: String,

    /// 原始采集目录.
    pub raw_dir: PathBuf,

    /// 输出目录. 不允许两个任务共享同一输出目录.
    pub out_dir: PathBuf,

    /// T1 输入文件. 由上游仲裁逻辑显式给出; `None` 时跳过 T1.
    pub t1: Option<PathBuf>,

    /// FLAIR 固定覆盖文件夹.
    pub fixed_flair: Option<String>,

    /// fMRI 固定覆盖 glob 模式.
    pub fixed_fmri: Option<String>,

    /// 场图固定覆盖.
    pub fixed_fieldmap: FixedFieldmap,

    /// DWI 固定文件夹名列表.
    pub fixed_dwi: Option<Vec<String>>,
}

impl SubjectSpec {
    /// 以默认 (全自动搜索) 配置创建任务.
    pub fn new<S, P, Q>(name: S, raw_dir: P, out_dir: Q) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            name: name.into(),
            raw_dir: raw_dir.into(),
            out_dir: out_dir.into(),
            t1: None,
            fixed_flair: None,
            fixed_fmri: None,
            fixed_fieldmap: FixedFieldmap::default(),
            fixed_dwi: None,
        }
    }
}

/// 转换一个受试者的全部模态.
///
/// 输出目录由本函数全新创建 (已存在时返回
/// [`ConvertError::OutputAlreadyExists`], 该错误同时防止两个 worker
/// 写入同一路径). 各模态依次尝试; 可恢复的失败记录进报告后继续,
/// 致命错误立即向上传播.
pub fn convert_subject<T: VolumeTools>(
    spec: &SubjectSpec,
    denylist: &[String],
    tools: &T,
) -> Result<SubjectReport, ConvertError> {
    if let Some(parent) = spec.out_dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err("创建目录", parent, e))?;
    }
    create_fresh_dir(&spec.out_dir)?;

    let mut report = SubjectReport::new(&spec.name);
    let name = spec.name.as_str();
    let raw = spec.raw_dir.as_path();

    if let Some(t1) = &spec.t1 {
        record(
            &mut report,
            Modality::T1,
            convert_t1(t1, &spec.out_dir.join("anat"), name),
        )?;
    }

    record(
        &mut report,
        Modality::Flair,
        convert_flair(
            raw,
            &spec.out_dir.join("anat"),
            name,
            spec.fixed_flair.as_deref(),
        ),
    )?;

    record(
        &mut report,
        Modality::Fmri,
        convert_fmri(
            raw,
            &spec.out_dir.join("func"),
            name,
            spec.fixed_fmri.as_deref(),
        ),
    )?;

    record(
        &mut report,
        Modality::Map,
        convert_fieldmap(
            raw,
            &spec.out_dir.join("fmap"),
            name,
            &spec.fixed_fieldmap,
            denylist,
            tools,
        ),
    )?;

    record(
        &mut report,
        Modality::Dwi,
        merge_dwi(
            raw,
            &spec.out_dir.join("dwi"),
            name,
            spec.fixed_dwi.as_deref(),
            tools,
        ),
    )?;

    Ok(report)
}

/// 将单模态结果记入报告. 仅致命错误向上传播.
fn record(
    report: &mut SubjectReport,
    modality: Modality,
    result: Result<crate::convert::Conversion, ConvertError>,
) -> Result<(), ConvertError> {
    match result {
        Ok(conversion) => {
            report.record(modality, conversion.into());
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            report.record(modality, crate::report::ModalityOutcome::Failed(e));
            Ok(())
        }
    }
}

/// 批量转换多个受试者.
///
/// 开启 `rayon` feature 时受试者在 worker 池上并行, 否则顺序执行.
/// 受试者级的可恢复失败 (如输出目录已存在) 进入
/// [`BatchReport::failed`]; 致命错误中止批次并返回 `Err`.
pub fn run_batch<T>(
    specs: &[SubjectSpec],
    denylist: &[String],
    tools: &T,
) -> Result<BatchReport, ConvertError>
where
    T: VolumeTools + Sync,
{
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let results: Vec<_> = specs
                .par_iter()
                .map(|s| (s.name.clone(), convert_subject(s, denylist, tools)))
                .collect();
        } else {
            let results: Vec<_> = specs
                .iter()
                .map(|s| (s.name.clone(), convert_subject(s, denylist, tools)))
                .collect();
        }
    }

    let mut subjects = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (name, result) in results {
        match result {
            Ok(report) => subjects.push(report),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => failed.push((name, e)),
        }
    }

    Ok(BatchReport { subjects, failed })
}

/// 获取 `{用户主目录}/dataset/raw` 目录, 即原始采集数据的默认存放处.
pub fn home_raw_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.push("raw");
    Some(ans)
}

/// 获取原始采集数据基本路径.
///
/// 1. 若环境变量 `$BIDS_RAW_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `{用户主目录}/dataset/raw`.
pub fn raw_dir_from_env_or_home() -> Option<PathBuf> {
    if let Ok(d) = env::var("BIDS_RAW_DIR") {
        Some(PathBuf::from(d))
    } else {
        home_raw_dataset_dir()
    }
}

/// 按惯例为受试者会话生成任务名 `sub-{id}_ses-{visit}`.
#[inline]
pub fn bids_name(subject_id: &str, session_id: &str) -> String {
    format!("sub-{subject_id}_ses-{session_id}")
}

/// 在输出根目录下为受试者会话生成独立输出目录.
#[inline]
pub fn bids_out_dir<P: AsRef<Path>>(output_root: P, name: &str) -> PathBuf {
    output_root.as_ref().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::testkit::FakeTools;
    use crate::report::ModalityOutcome;
    use std::fs;
    use tempfile::TempDir;

    fn put_file(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    /// 构造一个含 fMRI 与完整 DWI 的受试者原始目录.
    fn make_raw(root: &Path, id: &str) -> PathBuf {
        let raw = root.join(format!("raw_{id}"));
        fs::create_dir(&raw).unwrap();

        let fmri = raw.join("S010_fMRI");
        fs::create_dir(&fmri).unwrap();
        put_file(&fmri, "bold.nii.gz", "bold");

        let dti = raw.join("S011_DTI");
        fs::create_dir(&dti).unwrap();
        put_file(&dti, "scan.nii.gz", "nii");
        put_file(&dti, "scan.bval", "0 1000\n");
        put_file(&dti, "scan.bvec", "v\n");

        raw
    }

    #[test]
    fn test_convert_subject_aggregates_outcomes() {
        let tmp = TempDir::new().unwrap();
        let raw = make_raw(tmp.path(), "a");
        let spec = SubjectSpec::new("sub-01_ses-M00", &raw, tmp.path().join("out/sub-01_ses-M00"));
        let tools = FakeTools::default();

        let report = convert_subject(&spec, &[], &tools).unwrap();

        // 无 T1 输入: FLAIR 缺失、fMRI 完成、场图缺失、DWI 完成.
        assert_eq!(report.entries.len(), 4);
        assert!(matches!(
            report.entries[1].1,
            ModalityOutcome::Converted(_)
        ));
        assert!(spec
            .out_dir
            .join("func/sub-01_ses-M00_task-rest_bold.nii.gz")
            .is_file());
        assert!(spec.out_dir.join("dwi/sub-01_ses-M00_dwi.bval").is_file());
    }

    #[test]
    fn test_run_batch_collects_subject_level_failures() {
        let tmp = TempDir::new().unwrap();
        let raw = make_raw(tmp.path(), "a");
        let out = tmp.path().join("out/sub-01_ses-M00");
        let tools = FakeTools::default();

        let first = SubjectSpec::new("sub-01_ses-M00", &raw, &out);
        run_batch(&[first.clone()], &[], &tools).unwrap();

        // 第二次转换同一输出目录: 受试者级失败, 批次不中止.
        let batch = run_batch(&[first], &[], &tools).unwrap();
        assert!(batch.subjects.is_empty());
        assert_eq!(batch.failed.len(), 1);
        assert!(matches!(
            batch.failed[0].1,
            ConvertError::OutputAlreadyExists(_)
        ));
        assert!(!batch.is_clean());
    }

    #[test]
    fn test_run_batch_flair_ambiguity_aborts() {
        let tmp = TempDir::new().unwrap();
        let raw = make_raw(tmp.path(), "a");
        for folder in ["S005_T2FLAIR", "S006_T2FLAIR"] {
            let dir = raw.join(folder);
            fs::create_dir(&dir).unwrap();
            put_file(&dir, "scan.nii.gz", "flair");
        }
        let tools = FakeTools::default();

        let spec = SubjectSpec::new("sub-01_ses-M00", &raw, tmp.path().join("out/s"));
        let err = run_batch(&[spec], &[], &tools).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bids_name() {
        assert_eq!(bids_name("01", "M00"), "sub-01_ses-M00");
    }
}
