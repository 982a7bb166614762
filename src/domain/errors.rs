use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum LimriError {
    #[error("no file matches pattern: {0}")]
    NoMatch(String),
    #[error("file lists differ in length: Li={li} Lianat={lianat} anat={anat}")]
    ListLengthMismatch {
        li: usize,
        lianat: usize,
        anat: usize,
    },
    #[error("file lists are not in the same subject order (line {line}: {li} / {lianat} / {anat})")]
    ListOrderMismatch {
        line: usize,
        li: String,
        lianat: String,
        anat: String,
    },
    #[error("--{given} requires --Li_file_txt, --Lianat_file_txt and --anat_file_txt together")]
    IncompleteFileLists { given: String },
    #[error("normalization method '{0}' needs a reference image")]
    MissingReference(String),
    #[error("normalization method 'mean' needs a reference value")]
    MissingRefValue,
    #[error("invalid reference value: {0}")]
    InvalidRefValue(f64),
    #[error("mask selects no voxel")]
    EmptyMask,
    #[error("mean of the non-zero voxels is {0}, cannot rescale")]
    DegenerateMean(f64),
    #[error("shape mismatch for {path}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("{program} exited with {status}")]
    ToolFailed { program: String, status: String },
    #[error("{program} did not produce {output}")]
    MissingOutput { program: String, output: PathBuf },
    #[error("unknown placeholder in template: {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("unbalanced brace in template at byte {0}")]
    UnbalancedBrace(usize),
    #[error("invalid transform matrix in {path}: {reason}")]
    InvalidMatrix { path: PathBuf, reason: String },
    #[error("unsupported volume in {path}: {reason}")]
    UnsupportedVolume { path: PathBuf, reason: String },
}

impl LimriError {
    /// Stable identifier used in `--json` error output.
    pub fn code(&self) -> &'static str {
        match self {
            LimriError::NoMatch(_) => "NO_MATCH",
            LimriError::ListLengthMismatch { .. } | LimriError::ListOrderMismatch { .. } => {
                "LIST_MISMATCH"
            }
            LimriError::IncompleteFileLists { .. } => "INCOMPLETE_FILE_LISTS",
            LimriError::MissingReference(_) => "MISSING_REFERENCE",
            LimriError::MissingRefValue | LimriError::InvalidRefValue(_) => "MISSING_REF_VALUE",
            LimriError::EmptyMask => "EMPTY_MASK",
            LimriError::DegenerateMean(_) => "DEGENERATE_MEAN",
            LimriError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            LimriError::ToolFailed { .. } | LimriError::MissingOutput { .. } => "TOOL_FAILED",
            LimriError::UnknownPlaceholder(_) | LimriError::UnbalancedBrace(_) => "BAD_TEMPLATE",
            LimriError::InvalidMatrix { .. } => "BAD_MATRIX",
            LimriError::UnsupportedVolume { .. } => "BAD_VOLUME",
        }
    }
}
