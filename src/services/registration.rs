//! SPM12 / CAT12 registration wrappers.
//!
//! Each wrapper writes a MATLAB script (or CAT12 batch) and hands one
//! `Invocation` to the runner. SPM scripts run as
//! `<spm_exec> <mcr> script <file.m>`; CAT12 batches as
//! `<cat12_exec> -s <standalone> -m <mcr> -b <batch.m>`. Isotropic
//! rescaling calls FSL `flirt` directly.

use crate::domain::constants::*;
use crate::domain::errors::LimriError;
use crate::domain::models::{CoregReport, DicomReport, ScaleReport};
use crate::services::batch::matlab_quote;
use crate::services::config::{Cat12Config, FslConfig, SpmConfig};
use crate::services::runner::{Invocation, ToolRunner};
use crate::services::volume::Volume;
use nalgebra::Matrix4;
use std::path::{Path, PathBuf};

const SCRIPT_HEADER: &str = "spm('defaults','fmri');\nspm_jobman('initcfg');\n";

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    let name = file_name(path);
    name.trim_end_matches(".gz")
        .trim_end_matches(".nii")
        .trim_end_matches(".mat")
        .to_string()
}

/// `<dir>/<prefix><name>` for a file produced next to its input.
pub fn prefixed(path: &Path, prefix: &str) -> PathBuf {
    path.with_file_name(format!("{}{}", prefix, file_name(path)))
}

fn write_script(path: &Path, body: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format!("{}{}", SCRIPT_HEADER, body))
        .map_err(|e| anyhow::anyhow!("cannot write script {}: {}", path.display(), e))
}

fn spm_invocation(spm: &SpmConfig, script: &Path) -> Invocation {
    Invocation::new(&spm.executable)
        .arg(&spm.mcr)
        .arg("script")
        .arg(script)
}

/// Paths of the inverse matrix and its ASCII copy written by [`coreg`].
pub fn inverse_paths(mat: &Path) -> (PathBuf, PathBuf) {
    let inverse_mat = prefixed(mat, INVERSE_PREFIX);
    let inverse_txt = inverse_mat.with_extension("txt");
    (inverse_mat, inverse_txt)
}

/// Estimates the rigid transform aligning `moving` onto `target`.
pub fn coreg(
    spm: &SpmConfig,
    target: &Path,
    moving: &Path,
    mat: &Path,
    runner: &dyn ToolRunner,
) -> anyhow::Result<CoregReport> {
    let (inverse_mat, inverse_txt) = inverse_paths(mat);
    let script = mat.with_file_name(format!("coreg_{}.m", file_stem(mat)));
    let body = format!(
        "VG = spm_vol({target});\n\
         VF = spm_vol({moving});\n\
         x = spm_coreg(VG, VF);\n\
         M = spm_matrix(x);\n\
         save({mat}, 'M');\n\
         M = inv(M);\n\
         save({inverse_mat}, 'M');\n\
         save({inverse_txt}, 'M', '-ascii', '-double');\n",
        target = matlab_quote(&target.display().to_string()),
        moving = matlab_quote(&moving.display().to_string()),
        mat = matlab_quote(&mat.display().to_string()),
        inverse_mat = matlab_quote(&inverse_mat.display().to_string()),
        inverse_txt = matlab_quote(&inverse_txt.display().to_string()),
    );
    write_script(&script, &body)?;
    runner.run(
        &spm_invocation(spm, &script)
            .output(mat)
            .output(&inverse_mat)
            .output(&inverse_txt),
    )?;
    Ok(CoregReport {
        mat: mat.to_path_buf(),
        inverse_mat,
        inverse_txt,
    })
}

/// Reads a 4x4 matrix saved with `save(..., '-ascii', '-double')`.
pub fn parse_matrix(path: &Path) -> anyhow::Result<Matrix4<f64>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read matrix {}: {}", path.display(), e))?;
    let values = raw
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| LimriError::InvalidMatrix {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if values.len() != 16 {
        return Err(LimriError::InvalidMatrix {
            path: path.to_path_buf(),
            reason: format!("expected 16 values, found {}", values.len()),
        }
        .into());
    }
    Ok(Matrix4::from_row_slice(&values))
}

/// Left-multiplies the image affine by `m`; voxel data is untouched.
pub fn apply_affine(input: &Path, m: &Matrix4<f64>, output: &Path) -> anyhow::Result<()> {
    let vol = Volume::load(input)?;
    let moved = vol.with_affine(m * vol.affine);
    moved.save(output)
}

fn normalise_write_body(deformation: &Path, input: &Path) -> String {
    let field = "matlabbatch{1}.spm.spatial.normalise.write";
    let [lo, hi] = MNI_BOUNDING_BOX;
    let [vx, vy, vz] = MNI_VOXEL_SIZE;
    format!(
        "{f}.subj.def = {{{def}}};\n\
         {f}.subj.resample = {{{res}}};\n\
         {f}.woptions.bb = [{} {} {}; {} {} {}];\n\
         {f}.woptions.vox = [{} {} {}];\n\
         {f}.woptions.interp = {interp};\n\
         {f}.woptions.prefix = '{prefix}';\n\
         spm_jobman('run', matlabbatch);\n",
        lo[0],
        lo[1],
        lo[2],
        hi[0],
        hi[1],
        hi[2],
        vx,
        vy,
        vz,
        f = field,
        def = matlab_quote(&deformation.display().to_string()),
        res = matlab_quote(&format!("{},1", input.display())),
        interp = WRITE_INTERP,
        prefix = WARP_PREFIX,
    )
}

/// Resamples `input` to MNI space through a CAT12 deformation field.
/// SPM writes `w<input>` next to the input.
pub fn normalise_write(
    spm: &SpmConfig,
    deformation: &Path,
    input: &Path,
    script_dir: &Path,
    runner: &dyn ToolRunner,
) -> anyhow::Result<PathBuf> {
    let script = script_dir.join(format!("normalise_{}.m", file_stem(input)));
    write_script(&script, &normalise_write_body(deformation, input))?;
    let output = prefixed(input, WARP_PREFIX);
    runner.run(&spm_invocation(spm, &script).output(&output))?;
    Ok(output)
}

/// Reslices `input` onto the grid of `target`. SPM writes `r<input>`; it is
/// moved to `output` when one is given.
pub fn reslice(
    spm: &SpmConfig,
    input: &Path,
    target: &Path,
    output: Option<&Path>,
    interp: u8,
    script_dir: &Path,
    runner: &dyn ToolRunner,
) -> anyhow::Result<PathBuf> {
    let script = script_dir.join(format!("reslice_{}.m", file_stem(input)));
    let body = format!(
        "flags = struct('which', 1, 'mean', 0, 'interp', {interp}, 'prefix', '{prefix}');\n\
         spm_reslice({{{target}, {input}}}, flags);\n",
        interp = interp,
        prefix = RESLICE_PREFIX,
        target = matlab_quote(&target.display().to_string()),
        input = matlab_quote(&input.display().to_string()),
    );
    write_script(&script, &body)?;
    let resliced = prefixed(input, RESLICE_PREFIX);
    runner.run(&spm_invocation(spm, &script).output(&resliced))?;
    match output {
        Some(dest) if dest != resliced => {
            move_file(&resliced, dest)?;
            Ok(dest.to_path_buf())
        }
        _ => Ok(resliced),
    }
}

/// Resamples `input` onto an isotropic `scale` mm grid with flirt. The
/// applied matrix goes to `<output stem>.txt` beside the image.
pub fn scale(
    fsl: &FslConfig,
    input: &Path,
    output: &Path,
    scale: f64,
    runner: &dyn ToolRunner,
) -> anyhow::Result<ScaleReport> {
    if !scale.is_finite() || scale <= 0.0 {
        anyhow::bail!("scale must be a positive voxel size, got {}", scale);
    }
    let matrix = output.with_file_name(format!("{}.txt", file_stem(output)));
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    runner.run(
        &Invocation::new(&fsl.flirt)
            .arg("-in")
            .arg(input)
            .arg("-ref")
            .arg(input)
            .arg("-out")
            .arg(output)
            .arg("-applyisoxfm")
            .arg(scale.to_string())
            .arg("-omat")
            .arg(&matrix)
            .output(output)
            .output(&matrix),
    )?;
    Ok(ScaleReport {
        output: output.to_path_buf(),
        matrix,
    })
}

fn dicom_import_body(files: &[&Path], outdir: &Path) -> String {
    let field = "matlabbatch{1}.spm.util.import.dicom";
    let data: Vec<String> = files
        .iter()
        .map(|f| matlab_quote(&f.display().to_string()))
        .collect();
    format!(
        "{f}.data = {{{data}}};\n\
         {f}.root = 'flat';\n\
         {f}.outdir = {{{outdir}}};\n\
         {f}.protfilter = '.*';\n\
         {f}.convopts.format = 'nii';\n\
         {f}.convopts.icedims = 0;\n\
         spm_jobman('run', matlabbatch);\n",
        f = field,
        data = data.join("; "),
        outdir = matlab_quote(&outdir.display().to_string()),
    )
}

fn nifti_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "nii") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Converts DICOM files into `outdir` (flat layout). Output names come from
/// the DICOM headers, so the report lists the NIfTI files that appeared.
pub fn dicom_import(
    spm: &SpmConfig,
    files: &[&Path],
    outdir: &Path,
    runner: &dyn ToolRunner,
) -> anyhow::Result<DicomReport> {
    std::fs::create_dir_all(outdir)?;
    let before = nifti_files(outdir)?;
    let script = outdir.join("dicom_import.m");
    write_script(&script, &dicom_import_body(files, outdir))?;
    runner.run(&spm_invocation(spm, &script))?;
    let created: Vec<PathBuf> = nifti_files(outdir)?
        .into_iter()
        .filter(|p| !before.contains(p))
        .collect();
    if created.is_empty() {
        return Err(LimriError::MissingOutput {
            program: spm.executable.display().to_string(),
            output: outdir.to_path_buf(),
        }
        .into());
    }
    tracing::info!(outdir = %outdir.display(), count = created.len(), "DICOM converted");
    Ok(DicomReport {
        outdir: outdir.to_path_buf(),
        files: created,
    })
}

/// `<dir(anat)>/mri/y_<anat>`, the forward deformation written by CAT12.
pub fn deformation_field(anat: &Path) -> PathBuf {
    anat.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(CAT12_MRI_DIR)
        .join(format!("{}{}", DEFORMATION_PREFIX, file_name(anat)))
}

/// Runs the CAT12 VBM segmentation described by `batch`.
pub fn cat12_vbm(
    cat12: &Cat12Config,
    batch: &Path,
    anat: &Path,
    runner: &dyn ToolRunner,
) -> anyhow::Result<PathBuf> {
    let deformation = deformation_field(anat);
    runner.run(
        &Invocation::new(&cat12.executable)
            .arg("-s")
            .arg(&cat12.standalone)
            .arg("-m")
            .arg(&cat12.mcr)
            .arg("-b")
            .arg(batch)
            .output(&deformation),
    )?;
    Ok(deformation)
}

/// Rename, falling back to copy + remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to).map_err(|e| {
            anyhow::anyhow!("cannot move {} to {}: {}", from.display(), to.display(), e)
        })?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}
