//! Per-subject preprocessing sequence.
//!
//! Every step is keyed on its output file: when the file already exists the
//! step is skipped, so an interrupted subject resumes where it stopped.

use crate::cli::Denoiser;
use crate::domain::constants::*;
use crate::domain::models::{PipelineReport, StepReport, StepStatus, Subject};
use crate::services::batch::write_matlabbatch;
use crate::services::config::Config;
use crate::services::denoise::{cat12_sanlm, denoise_file, NlmParams};
use crate::services::intensity::default_threshold;
use crate::services::plotting::save_overlay;
use crate::services::registration::{
    apply_affine, cat12_vbm, coreg, deformation_field, inverse_paths, move_file,
    normalise_write, parse_matrix, prefixed,
};
use crate::services::runner::ToolRunner;
use crate::services::volume::Volume;
use std::path::{Path, PathBuf};

struct Steps<'a> {
    subject: &'a str,
    reports: Vec<StepReport>,
}

impl<'a> Steps<'a> {
    fn run(
        &mut self,
        step: &str,
        output: &Path,
        action: impl FnOnce() -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let status = if output.exists() {
            tracing::info!(subject = self.subject, step, "output exists, skipping");
            StepStatus::Skipped
        } else {
            tracing::info!(subject = self.subject, step, "running");
            action()?;
            StepStatus::Ran
        };
        self.reports.push(StepReport {
            step: step.to_string(),
            status,
            output: output.to_path_buf(),
        });
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Warped anatomical image inside the working directory.
pub fn warped_anat_path(subject: &Subject) -> PathBuf {
    subject
        .transfo_dir()
        .join(format!("{}{}", WARP_PREFIX, file_name(&subject.anat)))
}

/// Header transform bringing the Li image into the standard-coil
/// anatomical space.
fn li_to_anat_matrix(
    anat_coreg: &Path,
    li_coreg: &Path,
    compose: bool,
) -> anyhow::Result<nalgebra::Matrix4<f64>> {
    let (_, anat_txt) = inverse_paths(anat_coreg);
    let mut m = parse_matrix(&anat_txt)?;
    if compose {
        let (_, li_txt) = inverse_paths(li_coreg);
        m *= parse_matrix(&li_txt)?;
    }
    Ok(m)
}

pub fn run_pipeline(
    subject: &Subject,
    cfg: &Config,
    threshold: Option<f64>,
    runner: &dyn ToolRunner,
) -> anyhow::Result<PipelineReport> {
    let transfo = subject.transfo_dir();
    std::fs::create_dir_all(&transfo)?;
    let mut steps = Steps {
        subject: &subject.id,
        reports: Vec::new(),
    };

    let li_coreg = transfo.join(LI_TO_LIANAT_MAT);
    steps.run("coreg_li_to_lianat", &li_coreg, || {
        coreg(&cfg.spm, &subject.lianat, &subject.li, &li_coreg, runner).map(drop)
    })?;

    let anat_coreg = transfo.join(ANATLI_TO_ANAT_MAT);
    steps.run("coreg_anatli_to_anat", &anat_coreg, || {
        coreg(&cfg.spm, &subject.anat, &subject.lianat, &anat_coreg, runner).map(drop)
    })?;

    let deformation = deformation_field(&subject.anat);
    steps.run("cat12_vbm", &deformation, || {
        let batch = transfo.join(MATLABBATCH_NAME);
        write_matlabbatch(
            cfg.cat12.matlabbatch.as_deref(),
            &[subject.anat.as_path()],
            &cfg.cat12.tpm_file,
            &cfg.cat12.darteltpm_file,
            &batch,
        )?;
        cat12_vbm(&cfg.cat12, &batch, &subject.anat, runner).map(drop)
    })?;

    let li_affine = transfo.join(LI_MODIFIED_AFFINE);
    steps.run("li_affine", &li_affine, || {
        let m = li_to_anat_matrix(&anat_coreg, &li_coreg, cfg.pipeline.compose_li_coreg)?;
        apply_affine(&subject.li, &m, &li_affine)
    })?;

    let li_mni = prefixed(&li_affine, WARP_PREFIX);
    steps.run("warp_li", &li_mni, || {
        normalise_write(&cfg.spm, &deformation, &li_affine, &transfo, runner).map(drop)
    })?;

    let anat_mni = warped_anat_path(subject);
    steps.run("warp_anat", &anat_mni, || {
        let written = normalise_write(&cfg.spm, &deformation, &subject.anat, &transfo, runner)?;
        move_file(&written, &anat_mni)
    })?;

    let denoised = prefixed(&li_mni, SANLM_PREFIX);
    steps.run("denoise", &denoised, || match cfg.pipeline.denoiser {
        Denoiser::Cat12 => cat12_sanlm(&cfg.cat12, &li_mni, &transfo, runner).map(drop),
        Denoiser::Nlm => denoise_file(&li_mni, &denoised, &NlmParams::default()).map(drop),
    })?;

    let li_img = Volume::load(&denoised)?;
    li_img.require_shape(&denoised, cfg.pipeline.mni_shape)?;
    let anat_img = Volume::load(&anat_mni)?;
    anat_img.require_shape(&anat_mni, cfg.pipeline.mni_shape)?;

    let threshold = threshold
        .unwrap_or_else(|| default_threshold(&li_img.data, cfg.pipeline.threshold_ratio));
    let denoised_figure = save_overlay(
        &li_img,
        &anat_img,
        threshold,
        &transfo.join(FIGURE_DENOISED_LI),
    )?;
    let raw_figure = save_overlay(
        &Volume::load(&li_mni)?,
        &anat_img,
        threshold,
        &transfo.join(FIGURE_LI),
    )?;
    tracing::info!(subject = %subject.id, threshold, "pipeline finished");

    Ok(PipelineReport {
        subject: subject.id.clone(),
        transfo_dir: transfo,
        threshold,
        steps: steps.reports,
        figures: vec![denoised_figure.figure, raw_figure.figure],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::runner::testing::RecordingRunner;
    use crate::services::runner::Invocation;
    use nalgebra::Matrix4;
    use ndarray::Array3;

    const SHAPE: [usize; 3] = [4, 5, 6];

    fn translation(x: f64, y: f64, z: f64) -> String {
        format!("1 0 0 {x}\n0 1 0 {y}\n0 0 1 {z}\n0 0 0 1\n")
    }

    /// Stands in for SPM/CAT12: matrices as text, images as small volumes.
    fn fabricate(inv: &Invocation) {
        for out in &inv.outputs {
            std::fs::create_dir_all(out.parent().expect("parent")).expect("mkdir");
            let name = out.file_name().expect("name").to_string_lossy().to_string();
            if name == "inverse_anatLi_to_anat.txt" {
                std::fs::write(out, translation(10.0, 0.0, 0.0)).expect("write txt");
            } else if name == "inverse_Li_to_Lianat.txt" {
                std::fs::write(out, translation(0.0, 5.0, 0.0)).expect("write txt");
            } else if name.ends_with(".nii") && !name.starts_with("y_") {
                let data = Array3::from_shape_fn((4, 5, 6), |(i, j, k)| (i + j + k) as f64);
                Volume::new(data, Matrix4::identity())
                    .save(out)
                    .expect("write nifti");
            } else {
                std::fs::write(out, "").expect("write placeholder");
            }
        }
    }

    fn subject(root: &Path) -> Subject {
        let sub = root.join("sub-01/ses-1");
        let subject = Subject {
            id: "sub-01".to_string(),
            li: sub.join("lithium/sub-01_ses-1_limri.nii"),
            lianat: sub.join("anat/sub-01_ses-1_acq-7T_T1w.nii"),
            anat: sub.join("anat/sub-01_ses-1_acq-3T_T1w.nii"),
        };
        for path in [&subject.li, &subject.lianat, &subject.anat] {
            Volume::new(Array3::from_elem((3, 3, 3), 1.0), Matrix4::identity())
                .save(path)
                .expect("fixture");
        }
        subject
    }

    fn small_grid(denoiser: Denoiser) -> Config {
        let mut cfg = Config::default();
        cfg.pipeline.mni_shape = SHAPE;
        cfg.pipeline.denoiser = denoiser;
        cfg
    }

    #[test]
    fn full_run_then_rerun_skips_every_step() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let subject = subject(tmp.path());
        let cfg = small_grid(Denoiser::Cat12);
        let runner = RecordingRunner::new(fabricate);

        let report = run_pipeline(&subject, &cfg, None, &runner).expect("pipeline");
        let names: Vec<_> = report.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(
            names,
            [
                "coreg_li_to_lianat",
                "coreg_anatli_to_anat",
                "cat12_vbm",
                "li_affine",
                "warp_li",
                "warp_anat",
                "denoise"
            ]
        );
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Ran));
        // 2 coreg, vbm, 2 warps, sanlm
        assert_eq!(runner.calls.borrow().len(), 6);
        assert_eq!(runner.programs()[2], DEFAULT_CAT12_EXECUTABLE);
        assert_eq!(report.threshold, 12.0 * 0.25);
        for figure in &report.figures {
            assert!(figure.exists(), "{}", figure.display());
        }
        let transfo = subject.transfo_dir();
        assert!(transfo.join("matlabbatch.m").exists());
        assert!(transfo.join("wsub-01_ses-1_acq-3T_T1w.nii").exists());
        assert!(!subject
            .anat
            .with_file_name("wsub-01_ses-1_acq-3T_T1w.nii")
            .exists());

        let again = run_pipeline(&subject, &cfg, Some(2.0), &runner).expect("rerun");
        assert!(again.steps.iter().all(|s| s.status == StepStatus::Skipped));
        assert_eq!(runner.calls.borrow().len(), 6);
        assert_eq!(again.threshold, 2.0);
    }

    #[test]
    fn li_header_uses_anat_coreg_inverse_unless_composed() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let subject = subject(tmp.path());
        let runner = RecordingRunner::new(fabricate);
        run_pipeline(&subject, &small_grid(Denoiser::Cat12), None, &runner).expect("pipeline");
        let moved = Volume::load(&subject.transfo_dir().join(LI_MODIFIED_AFFINE)).expect("load");
        assert!((moved.affine[(0, 3)] - 10.0).abs() < 1e-5);
        assert!(moved.affine[(1, 3)].abs() < 1e-5);

        let li_affine_m = li_to_anat_matrix(
            &subject.transfo_dir().join(ANATLI_TO_ANAT_MAT),
            &subject.transfo_dir().join(LI_TO_LIANAT_MAT),
            true,
        )
        .expect("composed");
        assert_eq!(li_affine_m[(0, 3)], 10.0);
        assert_eq!(li_affine_m[(1, 3)], 5.0);
    }

    #[test]
    fn nlm_denoiser_runs_in_process() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let subject = subject(tmp.path());
        let runner = RecordingRunner::new(fabricate);
        let report =
            run_pipeline(&subject, &small_grid(Denoiser::Nlm), None, &runner).expect("pipeline");
        assert_eq!(runner.calls.borrow().len(), 5);
        assert!(report.steps.last().expect("denoise step").output.exists());
    }

    #[test]
    fn wrong_mni_grid_is_a_shape_error() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let subject = subject(tmp.path());
        let runner = RecordingRunner::new(fabricate);
        let err = run_pipeline(&subject, &Config::default(), None, &runner).unwrap_err();
        let typed = err
            .downcast_ref::<crate::domain::errors::LimriError>()
            .expect("typed error");
        assert_eq!(typed.code(), "SHAPE_MISMATCH");
    }
}
