//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::batch::{
    bids_name, bids_out_dir, convert_subject, raw_dir_from_env_or_home, run_batch, SubjectSpec,
};
pub use crate::convert::{
    convert_fieldmap, convert_flair, convert_fmri, convert_t1, merge_dwi, Conversion, ConvertError,
    Converted, FixedFieldmap, SkipReason,
};
pub use crate::discover::{choose_correction, match_modality, remove_rescan, CorrectionChoice};
pub use crate::modality::{Modality, UnknownModality};
pub use crate::report::{BatchReport, ModalityOutcome, SubjectReport};
pub use crate::tools::{FslTools, ToolError, VolumeTools};

pub use crate::caps::{Atlas, CapsError, CapsQuery, Diagnoses, ImageType, SubjectsVisits};

pub use crate::consts::RESCAN_MARK;
