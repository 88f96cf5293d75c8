//! 结构化转换报告.
//!
//! 转换逻辑本身不写日志; 每个受试者的逐模态结果收敛进
//! [`SubjectReport`], 批次级结果收敛进 [`BatchReport`],
//! 由调用方决定如何呈现.

use std::io::{self, Write};

use crate::convert::{Conversion, ConvertError, Converted, SkipReason};
use crate::modality::Modality;

/// 单个模态的转换结果.
#[derive(Debug)]
pub enum ModalityOutcome {
    /// 转换完成, 携带产出文件清单.
    Converted(Converted),

    /// 被跳过.
    Skipped(SkipReason),

    /// 转换失败 (可恢复, 不中止批次).
    Failed(ConvertError),
}

impl From<Conversion> for ModalityOutcome {
    #[inline]
    fn from(c: Conversion) -> Self {
        match c {
            Conversion::Done(done) => ModalityOutcome::Converted(done),
            Conversion::Skipped(reason) => ModalityOutcome::Skipped(reason),
        }
    }
}

/// 一个受试者/会话的转换报告.
#[derive(Debug)]
pub struct SubjectReport {
    /// 受试者-会话名, 形如 `sub-01_ses-M00`.
    pub name: String,

    /// 逐模态结果, 按转换执行顺序排列.
    pub entries: Vec<(Modality, ModalityOutcome)>,
}

impl SubjectReport {
    /// 创建空报告.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// 记录一个模态的结果.
    #[inline]
    pub fn record(&mut self, modality: Modality, outcome: ModalityOutcome) {
        self.entries.push((modality, outcome));
    }

    /// 是否所有模态都转换完成且没有不完整数据.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|(_, o)| match o {
            ModalityOutcome::Converted(c) => c.incomplete.is_empty(),
            _ => false,
        })
    }

    /// 迭代失败的模态.
    pub fn failures(&self) -> impl Iterator<Item = (Modality, &ConvertError)> {
        self.entries.iter().filter_map(|(m, o)| match o {
            ModalityOutcome::Failed(e) => Some((*m, e)),
            _ => None,
        })
    }

    /// 将报告以人类可读形式写进 `w`.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        writeln!(w, "受试者 `{}`:", self.name)?;
        for (modality, outcome) in &self.entries {
            match outcome {
                ModalityOutcome::Converted(c) => {
                    writeln!(w, "{S4}{modality}: 完成, 产出 {} 个文件", c.artifacts.len())?;
                    for folder in &c.incomplete {
                        writeln!(w, "{S4}{S4}不完整文件夹: {}", folder.display())?;
                    }
                }
                ModalityOutcome::Skipped(reason) => {
                    writeln!(w, "{S4}{modality}: 跳过 ({reason})")?;
                }
                ModalityOutcome::Failed(e) => {
                    writeln!(w, "{S4}{modality}: 失败 ({e})")?;
                }
            }
        }
        Ok(())
    }
}

/// 一个批次 (多受试者) 的转换报告.
#[derive(Debug)]
pub struct BatchReport {
    /// 完成转换流程的受试者报告 (其中可能含被跳过/失败的模态).
    pub subjects: Vec<SubjectReport>,

    /// 整个受试者级别失败的条目: (受试者名, 失败原因).
    pub failed: Vec<(String, ConvertError)>,
}

impl BatchReport {
    /// 批次是否完全干净: 没有受试者级失败, 且逐模态全部完成.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.subjects.iter().all(SubjectReport::is_clean)
    }

    /// 将报告以人类可读形式写进 `w`.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for subject in &self.subjects {
            subject.describe_into(w)?;
        }
        for (name, e) in &self.failed {
            writeln!(w, "受试者 `{name}`: 受试者级失败 ({e})")?;
        }
        Ok(())
    }
}
