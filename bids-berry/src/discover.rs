//! 原始采集目录的文件发现.
//!
//! 提供三个基础操作: 按模态命名约定做 glob 匹配、过滤 rescan 重复采集、
//! 以及按优先级列表选择校正版本. 所有 "缺失"/"无可用校正" 情形都以
//! [`CorrectionChoice`] 的变体表达, 不抛出错误.

use std::path::{Path, PathBuf};

use crate::consts::RESCAN_MARK;

/// 从路径列表中剔除所有包含 `rescan` 子串的条目.
///
/// 每剔除一条会输出一次 `warn` 日志. 幸存条目保持原有相对顺序.
pub fn remove_rescan(list: Vec<PathBuf>) -> Vec<PathBuf> {
    let (kept, dropped): (Vec<_>, Vec<_>) = list
        .into_iter()
        .partition(|p| !p.to_string_lossy().contains(RESCAN_MARK));

    for r in &dropped {
        log::warn!("发现 rescan 采集 `{}`, 已忽略.", r.display());
    }

    kept
}

/// 在 `dir` 下按 glob 模式 `pat` 匹配文件/文件夹.
///
/// 返回匹配路径的列表, 顺序与底层枚举顺序一致 (调用方不应依赖特定排序).
/// 模式可以含子目录分量, 如 `*MAP_*/*.nii.gz`.
///
/// # 注意
///
/// 非法模式或不可读的路径不会报错, 只会得到空列表;
/// 本模块的调用方把 "无匹配" 与 "不可匹配" 视为同一种缺失情形.
pub fn match_pattern<P: AsRef<Path>>(dir: P, pat: &str) -> Vec<PathBuf> {
    let full = dir.as_ref().join(pat);
    let Some(full) = full.to_str() else {
        return Vec::new();
    };

    match glob::glob(full) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(_) => Vec::new(),
    }
}

/// 在 `dir` 下匹配某个模态标签的所有候选 (模式 `*{tag}*`), 并过滤 rescan.
#[inline]
pub fn match_modality<P: AsRef<Path>>(dir: P, tag: &str) -> Vec<PathBuf> {
    remove_rescan(match_pattern(dir, &format!("*{tag}*")))
}

/// [`choose_correction`] 的选择结果.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionChoice {
    /// 目录下没有该模态的任何候选.
    ModalityMissing,

    /// 恰有一个候选. 携带其文件名, 不经过优先级逻辑.
    Single(String),

    /// 多个候选中按优先级命中的校正记号.
    Preferred(String),

    /// 有多个候选, 但没有任何优先级记号命中.
    NoPreferredCorrection,
}

/// 按优先级列表为某模态选择最合适的校正版本.
///
/// `priority` 中靠前的记号优先级更高. 选择规则:
///
/// 1. 无候选时返回 [`CorrectionChoice::ModalityMissing`];
/// 2. 恰有一个候选时直接返回其文件名 ([`CorrectionChoice::Single`]),
///   完全绕过优先级逻辑;
/// 3. 否则按序扫描 `priority`, 返回第一个作为子串出现在 **任一**
///   候选文件名中的记号;
/// 4. 都未命中时返回 [`CorrectionChoice::NoPreferredCorrection`].
///
/// rescan 候选在进入选择前已被剔除.
pub fn choose_correction<P, S>(dir: P, priority: &[S], tag: &str) -> CorrectionChoice
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let candidates = match_modality(dir, tag);

    if candidates.is_empty() {
        return CorrectionChoice::ModalityMissing;
    }
    if candidates.len() == 1 {
        return CorrectionChoice::Single(file_name_string(&candidates[0]));
    }

    let names: Vec<String> = candidates.iter().map(|c| file_name_string(c)).collect();
    for token in priority {
        let token = token.as_ref();
        if names.iter().any(|n| n.contains(token)) {
            return CorrectionChoice::Preferred(token.to_owned());
        }
    }

    CorrectionChoice::NoPreferredCorrection
}

/// 获取路径的最后一个分量 (文件/文件夹名).
pub(crate) fn file_name_string(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch_dir(root: &Path, name: &str) {
        fs::create_dir(root.join(name)).unwrap();
    }

    #[test]
    fn test_remove_rescan_keeps_order() {
        let _ = simple_logger::SimpleLogger::new().init();

        let list = vec![
            PathBuf::from("a/T1_S001"),
            PathBuf::from("a/T1_rescan_S002"),
            PathBuf::from("a/T1_S003"),
            PathBuf::from("a/rescan"),
        ];
        let kept = remove_rescan(list);
        assert_eq!(
            kept,
            vec![PathBuf::from("a/T1_S001"), PathBuf::from("a/T1_S003")]
        );
    }

    #[test]
    fn test_remove_rescan_noop_without_marker() {
        let list = vec![PathBuf::from("x"), PathBuf::from("y")];
        assert_eq!(remove_rescan(list.clone()), list);
    }

    #[test]
    fn test_remove_rescan_is_case_sensitive() {
        let list = vec![PathBuf::from("T1_Rescan_S001")];
        assert_eq!(remove_rescan(list.clone()), list);
    }

    #[test]
    fn test_choose_correction_missing() {
        let tmp = TempDir::new().unwrap();
        let got = choose_correction(tmp.path(), &["N3"], "T1");
        assert_eq!(got, CorrectionChoice::ModalityMissing);
    }

    #[test]
    fn test_choose_correction_single_bypasses_priority() {
        let tmp = TempDir::new().unwrap();
        touch_dir(tmp.path(), "S001_T1_GradWarp");

        // 优先级列表与候选完全无关, 也必须返回唯一候选.
        let got = choose_correction(tmp.path(), &["DoesNotAppear"], "T1");
        assert_eq!(got, CorrectionChoice::Single("S001_T1_GradWarp".to_owned()));
    }

    #[test]
    fn test_choose_correction_earlier_token_wins() {
        let tmp = TempDir::new().unwrap();
        // 候选的枚举顺序里 `N3` 在前, 但优先级列表里 `GradWarp` 在前.
        touch_dir(tmp.path(), "S001_T1_A_N3");
        touch_dir(tmp.path(), "S002_T1_B_GradWarp");

        let got = choose_correction(tmp.path(), &["GradWarp", "N3"], "T1");
        assert_eq!(got, CorrectionChoice::Preferred("GradWarp".to_owned()));
    }

    #[test]
    fn test_choose_correction_none_available() {
        let tmp = TempDir::new().unwrap();
        touch_dir(tmp.path(), "S001_T1_A");
        touch_dir(tmp.path(), "S002_T1_B");

        let got = choose_correction(tmp.path(), &["GradWarp", "N3"], "T1");
        assert_eq!(got, CorrectionChoice::NoPreferredCorrection);
    }

    #[test]
    fn test_choose_correction_skips_rescan() {
        let tmp = TempDir::new().unwrap();
        touch_dir(tmp.path(), "S001_T1_A");
        touch_dir(tmp.path(), "S002_T1_rescan_B");

        // rescan 被剔除后只剩一个候选, 走 Single 分支.
        let got = choose_correction(tmp.path(), &["B"], "T1");
        assert_eq!(got, CorrectionChoice::Single("S001_T1_A".to_owned()));
    }
}
