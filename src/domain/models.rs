use crate::domain::constants::TRANSFO_DIR_NAME;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct JsonErr {
    pub ok: bool,
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// The three images preprocessed together for one subject.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    /// 7Li image acquired with the lithium coil.
    pub li: PathBuf,
    /// Anatomical image acquired with the lithium coil.
    pub lianat: PathBuf,
    /// Anatomical image acquired with the standard (1H) coil.
    pub anat: PathBuf,
}

impl Subject {
    pub fn transfo_dir(&self) -> PathBuf {
        self.li
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(TRANSFO_DIR_NAME)
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ran,
    Skipped,
}

#[derive(Debug, Serialize, Clone)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub subject: String,
    pub transfo_dir: PathBuf,
    pub threshold: f64,
    pub steps: Vec<StepReport>,
    pub figures: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct JobReport {
    pub subject: String,
    pub script: PathBuf,
    pub submitted: bool,
}

#[derive(Debug, Serialize)]
pub struct PlotReport {
    pub figure: PathBuf,
    pub threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct NormReport {
    pub method: String,
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct ThresholdReport {
    pub threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct DenoiseReport {
    pub output: PathBuf,
    pub sigma: f64,
}

#[derive(Debug, Serialize)]
pub struct CoregReport {
    pub mat: PathBuf,
    pub inverse_mat: PathBuf,
    pub inverse_txt: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct ScaleReport {
    pub output: PathBuf,
    pub matrix: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct DicomReport {
    pub outdir: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Serialize)]
pub struct CheckItem {
    pub name: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct DoctorReport {
    pub overall: String,
    pub checks: Vec<CheckItem>,
}
