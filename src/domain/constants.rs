/// Per-subject working directory, created next to the lithium image.
pub const TRANSFO_DIR_NAME: &str = "transfo";

pub const LI_TO_LIANAT_MAT: &str = "Li_to_Lianat.mat";
pub const ANATLI_TO_ANAT_MAT: &str = "anatLi_to_anat.mat";
pub const INVERSE_PREFIX: &str = "inverse_";

pub const MATLABBATCH_NAME: &str = "matlabbatch.m";
pub const LI_MODIFIED_AFFINE: &str = "li_modified_affine.nii";
pub const WARP_PREFIX: &str = "w";
pub const RESLICE_PREFIX: &str = "r";
pub const DEFORMATION_PREFIX: &str = "y_";
pub const CAT12_MRI_DIR: &str = "mri";
pub const SANLM_PREFIX: &str = "sanlm_";

pub const FIGURE_LI: &str = "figure_li_anat_MNI.png";
pub const FIGURE_DENOISED_LI: &str = "figure_denoised_li_anat_MNI.png";
pub const FIGURE_SNAPSHOT: &str = "snap_Li_preproc_results.png";
pub const NORM_OUTPUT_NAME: &str = "li2mninorm.nii.gz";

/// Grid produced by `normalise.write` with the bounding box and voxel size below.
pub const MNI_SHAPE: [usize; 3] = [121, 145, 121];
pub const MNI_BOUNDING_BOX: [[f64; 3]; 2] = [[-90.0, -126.0, -72.0], [90.0, 90.0, 108.0]];
pub const MNI_VOXEL_SIZE: [f64; 3] = [1.5, 1.5, 1.5];
/// 4th degree B-spline.
pub const WRITE_INTERP: u8 = 4;

/// MNI coordinates (mm) of the snapshot cuts.
pub const CUT_COORDS: [f64; 3] = [-35.0, 54.0, -44.0];
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.25;

pub const DEFAULT_CAT12_EXECUTABLE: &str =
    "/i2bm/local/cat12-standalone/standalone/cat_standalone.sh";
pub const DEFAULT_CAT12_STANDALONE: &str = "/i2bm/local/cat12-standalone";
pub const DEFAULT_CAT12_MCR: &str = "/i2bm/local/cat12-standalone/mcr/v93";
pub const DEFAULT_TPM_FILE: &str =
    "/i2bm/local/cat12-standalone/spm12_mcr/home/gaser/gaser/spm/spm12/tpm/TPM.nii";
pub const DEFAULT_DARTELTPM_FILE: &str = "/i2bm/local/cat12-standalone/spm12_mcr/home/gaser/gaser/spm/spm12/toolbox/cat12/templates_volumes/Template_1_IXI555_MNI152.nii";
pub const DEFAULT_SPM_EXECUTABLE: &str = "/i2bm/local/spm12-standalone/run_spm12.sh";
pub const DEFAULT_SPM_MCR: &str = "/i2bm/local/spm12-standalone/mcr/v713";
pub const DEFAULT_FLIRT: &str = "flirt";
pub const DICOM_OUTDIR: &str = "converted_dicom";

pub const DEFAULT_PBS_QUEUE: &str = "Nspin_long";
pub const DEFAULT_PBS_WALLTIME: &str = "80:00:00";
pub const DEFAULT_JOB_PREFIX: &str = "limri";
pub const DEFAULT_SUBMIT_COMMAND: &str = "qsub";

/// Built-in CAT12 VBM batch, used when no template path is configured.
pub const CAT12_VBM_TEMPLATE: &str = include_str!("../../resources/cat12vbm_matlabbatch.m");
