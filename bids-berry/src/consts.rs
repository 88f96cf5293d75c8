//! 通用常量.

/// 重复采集 (rescan) 文件夹/文件名中的标记子串. 区分大小写.
pub const RESCAN_MARK: &str = "rescan";

/// 各模态在原始采集目录下的命名约定 (glob 模式).
pub mod pattern {
    /// 场图幅值 (magnitude) 序列内的 nii 文件.
    pub const FIELDMAP_MAGNITUDE: &str = "*MAP_*/*.nii.gz";

    /// 场图相位差 (phase difference) 序列内的 nii 文件.
    pub const FIELDMAP_PHASE: &str = "*MAPph_*/*.nii.gz";

    /// T2 FLAIR 采集文件夹.
    pub const FLAIR: &str = "*T2FLAIR*";

    /// 功能像 (fMRI) 采集文件夹.
    pub const FMRI: &str = "*fMRI*";

    /// 弥散加权 (DTI/DWI) 采集文件夹.
    pub const DWI: &str = "*DTI*";
}
