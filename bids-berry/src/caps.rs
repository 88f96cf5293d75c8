//! CAPS 目录的输入清单与路径模板.
//!
//! CAPS (ClinicA Processed Structure) 是转换/预处理产物的目录规范.
//! 本模块解析受试者清单 TSV, 并按规范拼出各类特征文件的路径:
//! 体素级概率图、图谱区域统计 TSV、皮层顶点投影. 数值加载本身
//! 不在本 crate 范围内, 由下游协作方完成.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// CAPS 输入层错误.
#[derive(Debug)]
pub enum CapsError {
    /// 清单 TSV 格式不正确.
    Manifest {
        /// 清单文件路径.
        path: PathBuf,
        /// 具体问题描述.
        detail: String,
    },

    /// 名称不在合法取值范围内 (影像类型/图谱).
    BadName {
        /// 名称类别.
        kind: &'static str,
        /// 给定的非法名称.
        name: String,
    },

    /// 期望存在的特征文件缺失. 一次性收集全部缺失项.
    MissingFiles(Vec<PathBuf>),

    /// 文件系统操作失败.
    Io {
        /// 相关路径.
        path: PathBuf,
        /// 底层 I/O 错误.
        source: std::io::Error,
    },
}

impl fmt::Display for CapsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsError::Manifest { path, detail } => {
                write!(f, "清单 `{}` 格式不正确: {detail}", path.display())
            }
            CapsError::BadName { kind, name } => {
                write!(f, "非法{kind}名称 `{name}`")
            }
            CapsError::MissingFiles(files) => {
                writeln!(f, "缺失 {} 个文件:", files.len())?;
                for file in files {
                    writeln!(f, "    {}", file.display())?;
                }
                Ok(())
            }
            CapsError::Io { path, source } => {
                write!(f, "读取 `{}` 失败: {source}", path.display())
            }
        }
    }
}

impl Error for CapsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CapsError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn read_tsv(path: &Path) -> Result<Vec<Vec<String>>, CapsError> {
    let body = fs::read_to_string(path).map_err(|e| CapsError::Io {
        path: path.to_owned(),
        source: e,
    })?;
    Ok(body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split('\t').map(|cell| cell.trim().to_owned()).collect())
        .collect())
}

/// 受试者-会话清单, 来自两列 TSV.
#[derive(Debug, Clone)]
pub struct SubjectsVisits {
    /// 受试者 id 列 (`sub-*`).
    pub subjects: Vec<String>,

    /// 会话 id 列 (`ses-*`), 与 `subjects` 逐行对应.
    pub sessions: Vec<String>,
}

impl SubjectsVisits {
    /// 从 TSV 文件读取清单.
    ///
    /// 表头必须恰好是 `participant_id`、`session_id` 两列,
    /// 列序不可交换. 其余任何形式都是格式错误.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self, CapsError> {
        let path = path.as_ref();
        let rows = read_tsv(path)?;
        let bad = |detail: String| CapsError::Manifest {
            path: path.to_owned(),
            detail,
        };

        let Some(header) = rows.first() else {
            return Err(bad("文件为空".into()));
        };
        if header != &["participant_id", "session_id"] {
            return Err(bad(format!("表头应为 participant_id/session_id, 实为 {header:?}")));
        }

        let mut subjects = Vec::with_capacity(rows.len() - 1);
        let mut sessions = Vec::with_capacity(rows.len() - 1);
        for (lineno, row) in rows.iter().enumerate().skip(1) {
            let [subject, session] = row.as_slice() else {
                return Err(bad(format!("第 {} 行不是两列", lineno + 1)));
            };
            subjects.push(subject.clone());
            sessions.push(session.clone());
        }
        Ok(Self { subjects, sessions })
    }

    /// 清单条目数.
    #[inline]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// 清单是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// 逐行迭代 (受试者, 会话) 对.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.subjects
            .iter()
            .map(String::as_str)
            .zip(self.sessions.iter().map(String::as_str))
    }
}

/// 诊断标签清单, 来自含 `diagnosis` 列的 TSV.
#[derive(Debug, Clone)]
pub struct Diagnoses {
    /// 逐受试者的诊断标签, 与受试者清单同序.
    pub labels: Vec<String>,
}

impl Diagnoses {
    /// 从 TSV 文件读取诊断列. 表头必须含 `diagnosis` 列, 位置不限.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self, CapsError> {
        let path = path.as_ref();
        let rows = read_tsv(path)?;
        let bad = |detail: String| CapsError::Manifest {
            path: path.to_owned(),
            detail,
        };

        let Some(header) = rows.first() else {
            return Err(bad("文件为空".into()));
        };
        let Some(col) = header.iter().position(|h| h == "diagnosis") else {
            return Err(bad("缺少 diagnosis 列".into()));
        };

        let mut labels = Vec::with_capacity(rows.len() - 1);
        for (lineno, row) in rows.iter().enumerate().skip(1) {
            let Some(label) = row.get(col) else {
                return Err(bad(format!("第 {} 行缺少 diagnosis 值", lineno + 1)));
            };
            labels.push(label.clone());
        }
        Ok(Self { labels })
    }

    /// 将标签映射为类别下标.
    ///
    /// 类别按标签字典序去重排序后编号, 与标签字符串本身无关:
    /// 例如 `AD/CN/AD` 映射为 `0/1/0`.
    pub fn class_indices(&self) -> Vec<usize> {
        let mut unique: Vec<&str> = self.labels.iter().map(String::as_str).collect();
        unique.sort_unstable();
        unique.dedup();
        self.labels
            .iter()
            .map(|label| {
                // 标签一定来自 unique 自身, 查找不会失败.
                unique
                    .binary_search(&label.as_str())
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// 特征影像类型.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// T1 加权结构像 (SPM/DARTEL 灰质概率图).
    T1,
    /// FDG PET.
    Fdg,
    /// AV45 PET.
    Av45,
    /// PiB PET.
    Pib,
    /// Flutemetamol PET.
    Flute,
    /// 弥散加权成像.
    Dwi,
}

impl ImageType {
    /// 路径模板中的类型名.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            ImageType::T1 => "T1",
            ImageType::Fdg => "fdg",
            ImageType::Av45 => "av45",
            ImageType::Pib => "pib",
            ImageType::Flute => "flute",
            ImageType::Dwi => "dwi",
        }
    }

    /// 从类型名解析. 非法名称报错.
    pub fn from_name(name: &str) -> Result<Self, CapsError> {
        Ok(match name {
            "T1" => ImageType::T1,
            "fdg" => ImageType::Fdg,
            "av45" => ImageType::Av45,
            "pib" => ImageType::Pib,
            "flute" => ImageType::Flute,
            "dwi" => ImageType::Dwi,
            other => {
                return Err(CapsError::BadName {
                    kind: "影像类型",
                    name: other.to_owned(),
                })
            }
        })
    }

    /// PET SUVR 归一化参考区. FDG 用 pons, 其余示踪剂用 cerebellumPons.
    #[inline]
    pub const fn suvr_reference(self) -> &'static str {
        match self {
            ImageType::Fdg => "pons",
            _ => "cerebellumPons",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 图谱, 用于区域级统计.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atlas {
    /// AAL2.
    Aal2,
    /// Neuromorphometrics.
    Neuromorphometrics,
    /// AICHA.
    Aicha,
    /// LPBA40.
    Lpba40,
    /// Hammers.
    Hammers,
}

impl Atlas {
    /// 路径模板中的图谱名.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Atlas::Aal2 => "AAL2",
            Atlas::Neuromorphometrics => "Neuromorphometrics",
            Atlas::Aicha => "AICHA",
            Atlas::Lpba40 => "LPBA40",
            Atlas::Hammers => "Hammers",
        }
    }

    /// 从图谱名解析. 非法名称报错.
    pub fn from_name(name: &str) -> Result<Self, CapsError> {
        Ok(match name {
            "AAL2" => Atlas::Aal2,
            "Neuromorphometrics" => Atlas::Neuromorphometrics,
            "AICHA" => Atlas::Aicha,
            "LPBA40" => Atlas::Lpba40,
            "Hammers" => Atlas::Hammers,
            other => {
                return Err(CapsError::BadName {
                    kind: "图谱",
                    name: other.to_owned(),
                })
            }
        })
    }
}

impl fmt::Display for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 体素级路径模板的修饰参数.
#[derive(Debug, Clone, Default)]
pub struct VoxelParams {
    /// 灰质概率图是否经过调制 (仅 T1 有意义).
    pub modulated: bool,

    /// 平滑核宽度 (mm). 0 表示未平滑, 不进入文件名.
    pub fwhm: u32,

    /// 部分容积校正方法名 (仅 PET 有意义), 如 `rbv`.
    pub pvc: Option<String>,
}

/// CAPS 目录查询器: 按规范拼出特征文件路径.
#[derive(Debug, Clone)]
pub struct CapsQuery {
    /// CAPS 根目录.
    pub caps_dir: PathBuf,

    /// 分组 id, 进入 `group-{id}` 目录段.
    pub group_id: String,

    /// 特征影像类型.
    pub image_type: ImageType,
}

impl CapsQuery {
    /// 创建查询器.
    pub fn new<P: Into<PathBuf>, S: Into<String>>(
        caps_dir: P,
        group_id: S,
        image_type: ImageType,
    ) -> Self {
        Self {
            caps_dir: caps_dir.into(),
            group_id: group_id.into(),
            image_type,
        }
    }

    fn subject_dir(&self, subject: &str, session: &str) -> PathBuf {
        self.caps_dir.join("subjects").join(subject).join(session)
    }

    /// 一个受试者会话的体素级概率图路径.
    ///
    /// T1 走 SPM/DARTEL 灰质分割:
    /// `t1/spm/dartel/group-{g}/{sub}_{ses}_T1w_segm-graymatter_space-Ixi549Space_modulated-{on|off}[_fwhm-{n}mm]_probability.nii.gz`;
    /// PET 走预处理产物:
    /// `pet/preprocessing/group-{g}/{sub}_{ses}_task-rest_acq-{type}_pet_space-Ixi549Space[_pvc-{m}]_suvr-{ref}_mask-brain[_fwhm-{n}mm]_pet.nii.gz`.
    pub fn voxel_image(&self, subject: &str, session: &str, params: &VoxelParams) -> PathBuf {
        let fwhm = if params.fwhm == 0 {
            String::new()
        } else {
            format!("_fwhm-{}mm", params.fwhm)
        };

        let dir = self.subject_dir(subject, session);
        if self.image_type == ImageType::T1 {
            let modulated = if params.modulated { "on" } else { "off" };
            dir.join("t1/spm/dartel")
                .join(format!("group-{}", self.group_id))
                .join(format!(
                    "{subject}_{session}_T1w_segm-graymatter_space-Ixi549Space_modulated-{modulated}{fwhm}_probability.nii.gz"
                ))
        } else {
            let pvc = match &params.pvc {
                Some(m) => format!("_pvc-{m}"),
                None => String::new(),
            };
            dir.join("pet/preprocessing")
                .join(format!("group-{}", self.group_id))
                .join(format!(
                    "{subject}_{session}_task-rest_acq-{}_pet_space-Ixi549Space{pvc}_suvr-{}_mask-brain{fwhm}_pet.nii.gz",
                    self.image_type,
                    self.image_type.suvr_reference()
                ))
        }
    }

    /// 一个受试者会话的图谱区域统计 TSV 路径.
    pub fn region_statistics(
        &self,
        subject: &str,
        session: &str,
        atlas: Atlas,
        pvc: Option<&str>,
    ) -> PathBuf {
        let dir = self.subject_dir(subject, session);
        if self.image_type == ImageType::T1 {
            dir.join("t1/spm/dartel")
                .join(format!("group-{}", self.group_id))
                .join("atlas_statistics")
                .join(format!(
                    "{subject}_{session}_T1w_space-{atlas}_map-graymatter_statistics.tsv"
                ))
        } else {
            let pvc = match pvc {
                Some(m) => format!("_pvc-{m}"),
                None => String::new(),
            };
            dir.join("pet/preprocessing")
                .join(format!("group-{}", self.group_id))
                .join("atlas_statistics")
                .join(format!(
                    "{subject}_{session}_task-rest_acq-{}_pet_space-{atlas}{pvc}_suvr-{}_statistics.tsv",
                    self.image_type,
                    self.image_type.suvr_reference()
                ))
        }
    }

    /// 一个受试者会话的左/右半球皮层顶点投影路径 (`.mgh` 对).
    pub fn vertex_projections(&self, subject: &str, session: &str, fwhm: u32) -> [PathBuf; 2] {
        let dir = self.subject_dir(subject, session).join("pet/surface");
        ["lh", "rh"].map(|hemi| {
            dir.join(format!(
                "{subject}_{session}_task-rest_acq-{}_pet_space-fsaverage_suvr-pons_pvc-iy_hemi-{hemi}_fwhm-{fwhm}_projection.mgh",
                self.image_type
            ))
        })
    }

    /// 为整个清单生成体素级概率图路径并检查存在性.
    ///
    /// 缺失的文件不在首个处中断, 而是全部收集进
    /// [`CapsError::MissingFiles`] 一次性报告.
    pub fn voxel_images(
        &self,
        manifest: &SubjectsVisits,
        params: &VoxelParams,
    ) -> Result<Vec<PathBuf>, CapsError> {
        let images: Vec<PathBuf> = manifest
            .iter()
            .map(|(subject, session)| self.voxel_image(subject, session, params))
            .collect();

        let missing: Vec<PathBuf> = images.iter().filter(|p| !p.exists()).cloned().collect();
        if missing.is_empty() {
            Ok(images)
        } else {
            Err(CapsError::MissingFiles(missing))
        }
    }

    /// 为整个清单生成左/右半球顶点投影路径对并检查存在性.
    ///
    /// 两个半球都要检查; 缺失的文件不在首个处中断, 而是全部收集进
    /// [`CapsError::MissingFiles`] 一次性报告.
    pub fn vertex_projection_images(
        &self,
        manifest: &SubjectsVisits,
        fwhm: u32,
    ) -> Result<Vec<[PathBuf; 2]>, CapsError> {
        let images: Vec<[PathBuf; 2]> = manifest
            .iter()
            .map(|(subject, session)| self.vertex_projections(subject, session, fwhm))
            .collect();

        let missing: Vec<PathBuf> = images
            .iter()
            .flatten()
            .filter(|p| !p.exists())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(images)
        } else {
            Err(CapsError::MissingFiles(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_tsv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_subjects_visits_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = write_tsv(
            tmp.path(),
            "subjects.tsv",
            "participant_id\tsession_id\nsub-01\tses-M00\nsub-02\tses-M00\n",
        );

        let sv = SubjectsVisits::from_tsv(&path).unwrap();
        assert_eq!(sv.len(), 2);
        let pairs: Vec<_> = sv.iter().collect();
        assert_eq!(pairs, vec![("sub-01", "ses-M00"), ("sub-02", "ses-M00")]);
    }

    #[test]
    fn test_subjects_visits_rejects_wrong_header() {
        let tmp = TempDir::new().unwrap();
        let path = write_tsv(
            tmp.path(),
            "subjects.tsv",
            "session_id\tparticipant_id\nses-M00\tsub-01\n",
        );
        assert!(matches!(
            SubjectsVisits::from_tsv(&path),
            Err(CapsError::Manifest { .. })
        ));
    }

    #[test]
    fn test_diagnoses_class_indices() {
        let tmp = TempDir::new().unwrap();
        let path = write_tsv(
            tmp.path(),
            "diagnoses.tsv",
            "participant_id\tdiagnosis\nsub-01\tAD\nsub-02\tCN\nsub-03\tAD\n",
        );

        let diagnoses = Diagnoses::from_tsv(&path).unwrap();
        assert_eq!(diagnoses.labels, ["AD", "CN", "AD"]);
        assert_eq!(diagnoses.class_indices(), [0, 1, 0]);
    }

    #[test]
    fn test_image_type_names() {
        assert_eq!(ImageType::from_name("fdg").unwrap(), ImageType::Fdg);
        assert_eq!(ImageType::Fdg.suvr_reference(), "pons");
        assert_eq!(ImageType::Av45.suvr_reference(), "cerebellumPons");
        assert!(matches!(
            ImageType::from_name("t2"),
            Err(CapsError::BadName { .. })
        ));
    }

    #[test]
    fn test_voxel_image_t1_template() {
        let query = CapsQuery::new("/caps", "AD", ImageType::T1);
        let params = VoxelParams {
            modulated: true,
            fwhm: 8,
            pvc: None,
        };
        let got = query.voxel_image("sub-01", "ses-M00", &params);
        assert_eq!(
            got,
            PathBuf::from(
                "/caps/subjects/sub-01/ses-M00/t1/spm/dartel/group-AD/\
                 sub-01_ses-M00_T1w_segm-graymatter_space-Ixi549Space_modulated-on_fwhm-8mm_probability.nii.gz"
            )
        );
    }

    #[test]
    fn test_voxel_image_pet_template() {
        let query = CapsQuery::new("/caps", "AD", ImageType::Fdg);
        let params = VoxelParams {
            modulated: false,
            fwhm: 0,
            pvc: Some("rbv".to_owned()),
        };
        let got = query.voxel_image("sub-01", "ses-M00", &params);
        assert_eq!(
            got,
            PathBuf::from(
                "/caps/subjects/sub-01/ses-M00/pet/preprocessing/group-AD/\
                 sub-01_ses-M00_task-rest_acq-fdg_pet_space-Ixi549Space_pvc-rbv_suvr-pons_mask-brain_pet.nii.gz"
            )
        );
    }

    #[test]
    fn test_region_statistics_template() {
        let query = CapsQuery::new("/caps", "AD", ImageType::T1);
        let got = query.region_statistics("sub-01", "ses-M00", Atlas::Aal2, None);
        assert_eq!(
            got,
            PathBuf::from(
                "/caps/subjects/sub-01/ses-M00/t1/spm/dartel/group-AD/atlas_statistics/\
                 sub-01_ses-M00_T1w_space-AAL2_map-graymatter_statistics.tsv"
            )
        );
    }

    #[test]
    fn test_vertex_projections_pair() {
        let query = CapsQuery::new("/caps", "AD", ImageType::Fdg);
        let [lh, rh] = query.vertex_projections("sub-01", "ses-M00", 10);
        assert!(lh.to_str().unwrap().contains("hemi-lh_fwhm-10"));
        assert!(rh.to_str().unwrap().contains("hemi-rh_fwhm-10"));
    }

    #[test]
    fn test_voxel_images_collects_all_missing() {
        let tmp = TempDir::new().unwrap();
        let query = CapsQuery::new(tmp.path(), "AD", ImageType::T1);
        let manifest = SubjectsVisits {
            subjects: vec!["sub-01".into(), "sub-02".into()],
            sessions: vec!["ses-M00".into(), "ses-M00".into()],
        };
        let params = VoxelParams::default();

        // 只预置第一个文件, 第二个缺失.
        let first = query.voxel_image("sub-01", "ses-M00", &params);
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::write(&first, b"img").unwrap();

        let err = query.voxel_images(&manifest, &params).unwrap_err();
        let CapsError::MissingFiles(missing) = err else {
            panic!("期望收集缺失文件");
        };
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0], query.voxel_image("sub-02", "ses-M00", &params));
    }

    #[test]
    fn test_vertex_projection_images_collects_all_missing() {
        let tmp = TempDir::new().unwrap();
        let query = CapsQuery::new(tmp.path(), "AD", ImageType::Fdg);
        let manifest = SubjectsVisits {
            subjects: vec!["sub-01".into(), "sub-02".into()],
            sessions: vec!["ses-M00".into(), "ses-M00".into()],
        };

        // 第一个受试者只预置左半球, 右半球与第二个受试者的两侧都缺失.
        let [lh, rh] = query.vertex_projections("sub-01", "ses-M00", 10);
        fs::create_dir_all(lh.parent().unwrap()).unwrap();
        fs::write(&lh, b"mgh").unwrap();

        let err = query.vertex_projection_images(&manifest, 10).unwrap_err();
        let CapsError::MissingFiles(missing) = err else {
            panic!("期望收集缺失文件");
        };
        assert_eq!(missing.len(), 3);
        assert_eq!(missing[0], rh);

        // 补齐后整体检查通过.
        for path in &missing {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"mgh").unwrap();
        }
        let pairs = query.vertex_projection_images(&manifest, 10).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0][0], lh);
    }
}
