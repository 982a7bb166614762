use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "limri", version, about = "Launch 7Li MRI preprocessing")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        help = "Configuration file (default: $HOME/.config/limri/config.toml)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Coregister, normalize to MNI, denoise and plot each subject.
    Preproc(PreprocArgs),
    /// Intensity normalization of an MNI-space Li image.
    Normalize {
        #[arg(long = "li", help = "Li image in MNI space")]
        li: PathBuf,
        #[arg(long, help = "Brain mask in MNI space")]
        mask: PathBuf,
        #[arg(long)]
        outdir: PathBuf,
        #[arg(long, help = "Reference Li image (hist, minmax)")]
        reference: Option<PathBuf>,
        #[arg(long, help = "Reference phantom intensity (mean)")]
        ref_value: Option<f64>,
        #[arg(long, value_enum, default_value_t = NormMethod::Hist)]
        norm: NormMethod,
    },
    /// Noise threshold: max intensity of the Li image outside the brain mask.
    Threshold {
        #[arg(long)]
        mask: PathBuf,
        #[arg(long = "li")]
        li: PathBuf,
    },
    /// In-process non-local means denoising.
    Denoise {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 4)]
        patch_radius: usize,
        #[arg(long, default_value_t = 5)]
        search_radius: usize,
        #[arg(long, default_value_t = 1.15)]
        h_factor: f64,
    },
    /// Run a single SPM registration step.
    Register {
        #[command(flatten)]
        tools: ToolArgs,
        #[command(subcommand)]
        command: RegisterCommands,
    },
    /// Render the CAT12 VBM batch for anatomical images.
    Batch {
        #[arg(long, required = true, num_args = 1..)]
        anat: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        tools: ToolArgs,
    },
    /// Convert DICOM files to NIfTI with SPM.
    Dicom {
        #[arg(long, required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = crate::domain::constants::DICOM_OUTDIR)]
        outdir: PathBuf,
        #[command(flatten)]
        tools: ToolArgs,
    },
    /// Check configured tools and templates.
    Doctor {
        #[command(flatten)]
        tools: ToolArgs,
    },
}

#[derive(Args, Debug)]
pub struct PreprocArgs {
    #[arg(
        long,
        value_enum,
        help = "regex: inputs from glob patterns or exact filenames; \
                file_txt: inputs from text files, one line per subject; \
                plot: plot an existing preprocessing"
    )]
    pub method: Method,
    #[arg(
        long = "Li",
        alias = "li",
        help = "regex: pattern of the Li images; file_txt: text file listing them"
    )]
    pub li: String,
    #[arg(
        long = "Lianat",
        alias = "lianat",
        help = "regex: pattern of the anat images acquired with the Li coil; file_txt: text file listing them"
    )]
    pub lianat: String,
    #[arg(
        long = "anat",
        help = "regex: pattern of the anat images acquired with the H coil; file_txt: text file listing them"
    )]
    pub anat: String,
    #[arg(long, value_enum, help = "cluster: submit PBS jobs; local: run here")]
    pub launch: Launch,
    #[arg(long = "Li_file_txt", alias = "li-file-txt")]
    pub li_file_txt: Option<PathBuf>,
    #[arg(long = "Lianat_file_txt", alias = "lianat-file-txt")]
    pub lianat_file_txt: Option<PathBuf>,
    #[arg(long = "anat_file_txt", alias = "anat-file-txt")]
    pub anat_file_txt: Option<PathBuf>,
    #[arg(long, help = "Overlay threshold (default: 25% of the max intensity)")]
    pub threshold: Option<f64>,
    #[arg(long = "jobs_dir", alias = "jobs-dir", help = "Directory receiving PBS job folders")]
    pub jobs_dir: Option<PathBuf>,
    #[command(flatten)]
    pub tools: ToolArgs,
}

/// Per-invocation overrides of the configured tool locations.
#[derive(Args, Debug, Clone, Default)]
pub struct ToolArgs {
    #[arg(long = "executable_cat12", alias = "executable-cat12", help = "CAT12 standalone launcher (cat_standalone.sh)")]
    pub executable_cat12: Option<PathBuf>,
    #[arg(long = "standalone_cat12", alias = "standalone-cat12", help = "CAT12 standalone folder")]
    pub standalone_cat12: Option<PathBuf>,
    #[arg(long = "mcr_matlab", alias = "mcr-matlab", help = "MATLAB runtime used by CAT12")]
    pub mcr_matlab: Option<PathBuf>,
    #[arg(long = "tpm_file", alias = "tpm-file", help = "SPM tissue probability map")]
    pub tpm_file: Option<PathBuf>,
    #[arg(long = "darteltpm_file", alias = "darteltpm-file", help = "CAT12 DARTEL template")]
    pub darteltpm_file: Option<PathBuf>,
    #[arg(long, help = "CAT12 VBM batch template (default: built-in)")]
    pub matlabbatch: Option<PathBuf>,
    #[arg(long = "spm_executable", alias = "spm-executable", help = "SPM12 standalone launcher (run_spm12.sh)")]
    pub spm_executable: Option<PathBuf>,
    #[arg(long = "spm_mcr", alias = "spm-mcr", help = "MATLAB runtime used by SPM12")]
    pub spm_mcr: Option<PathBuf>,
    #[arg(long, help = "FSL flirt executable")]
    pub flirt: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum RegisterCommands {
    /// Estimate the affine aligning `moving` to `target`.
    Coreg {
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        moving: PathBuf,
        #[arg(long)]
        mat: PathBuf,
    },
    /// Left-multiply the image affine by the matrix stored in `mat`.
    Apply {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        mat: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Apply a deformation field (writes `w<input>` to MNI space).
    Warp {
        #[arg(long)]
        deformation: PathBuf,
        #[arg(long)]
        input: PathBuf,
    },
    /// Reslice `input` on the grid of `target`.
    Reslice {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        interp: u8,
    },
    /// Isotropic resampling with FSL flirt; also writes `<output stem>.txt`.
    Scale {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, help = "Voxel size in mm in every direction")]
        scale: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Method {
    Regex,
    #[value(name = "file_txt", alias = "file-txt")]
    FileTxt,
    Plot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Launch {
    Cluster,
    Local,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NormMethod {
    Hist,
    Minmax,
    Mean,
}

impl NormMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormMethod::Hist => "hist",
            NormMethod::Minmax => "minmax",
            NormMethod::Mean => "mean",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Denoiser {
    #[default]
    Cat12,
    Nlm,
}
