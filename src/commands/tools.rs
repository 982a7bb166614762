use crate::*;
use crate::services::batch::write_matlabbatch;
use crate::services::config::Config;
use crate::services::denoise::{denoise_file, NlmParams};
use crate::services::doctor::doctor;
use crate::services::intensity::{normalize_file, threshold_file};
use crate::services::registration::{
    apply_affine, coreg, dicom_import, normalise_write, parse_matrix, reslice, scale,
};
use crate::services::runner::ProcessRunner;
use std::path::Path;

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

pub fn handle_image_commands(cli: &Cli) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Normalize {
            li,
            mask,
            outdir,
            reference,
            ref_value,
            norm,
        } => {
            let report =
                normalize_file(*norm, li, mask, reference.as_deref(), *ref_value, outdir)?;
            print_one(cli.json, report, |r| {
                format!("{}\t{}", r.method, r.output.display())
            })?;
        }
        Commands::Threshold { mask, li } => {
            let report = threshold_file(li, mask)?;
            print_one(cli.json, report, |r| format!("{}", r.threshold))?;
        }
        Commands::Denoise {
            input,
            output,
            patch_radius,
            search_radius,
            h_factor,
        } => {
            let params = NlmParams {
                patch_radius: *patch_radius,
                search_radius: *search_radius,
                h_factor: *h_factor,
            };
            let sigma = denoise_file(input, output, &params)?;
            let report = DenoiseReport {
                output: output.clone(),
                sigma,
            };
            print_one(cli.json, report, |r| {
                format!("{}\tsigma={}", r.output.display(), r.sigma)
            })?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn handle_register_commands(cli: &Cli, cfg: &Config) -> anyhow::Result<bool> {
    let Commands::Register { command, .. } = &cli.command else {
        return Ok(false);
    };

    match command {
        RegisterCommands::Coreg {
            target,
            moving,
            mat,
        } => {
            let report = coreg(&cfg.spm, target, moving, mat, &ProcessRunner)?;
            print_one(cli.json, report, |r| {
                format!(
                    "{}\t{}\t{}",
                    r.mat.display(),
                    r.inverse_mat.display(),
                    r.inverse_txt.display()
                )
            })?;
        }
        RegisterCommands::Apply { input, mat, output } => {
            let m = parse_matrix(mat)?;
            apply_affine(input, &m, output)?;
            print_one(cli.json, output.clone(), |p| p.display().to_string())?;
        }
        RegisterCommands::Warp { deformation, input } => {
            let out = normalise_write(
                &cfg.spm,
                deformation,
                input,
                parent_dir(input),
                &ProcessRunner,
            )?;
            print_one(cli.json, out, |p| p.display().to_string())?;
        }
        RegisterCommands::Reslice {
            input,
            target,
            output,
            interp,
        } => {
            let out = reslice(
                &cfg.spm,
                input,
                target,
                output.as_deref(),
                *interp,
                parent_dir(input),
                &ProcessRunner,
            )?;
            print_one(cli.json, out, |p| p.display().to_string())?;
        }
        RegisterCommands::Scale {
            input,
            output,
            scale: voxel,
        } => {
            let report = scale(&cfg.fsl, input, output, *voxel, &ProcessRunner)?;
            print_one(cli.json, report, |r| {
                format!("{}\t{}", r.output.display(), r.matrix.display())
            })?;
        }
    }
    Ok(true)
}

pub fn handle_batch_command(cli: &Cli, cfg: &Config) -> anyhow::Result<bool> {
    let Commands::Batch { anat, output, .. } = &cli.command else {
        return Ok(false);
    };
    let anat_files: Vec<&Path> = anat.iter().map(|p| p.as_path()).collect();
    write_matlabbatch(
        cfg.cat12.matlabbatch.as_deref(),
        &anat_files,
        &cfg.cat12.tpm_file,
        &cfg.cat12.darteltpm_file,
        output,
    )?;
    print_one(cli.json, output.clone(), |p| format!("wrote {}", p.display()))?;
    Ok(true)
}

pub fn handle_dicom_command(cli: &Cli, cfg: &Config) -> anyhow::Result<bool> {
    let Commands::Dicom { files, outdir, .. } = &cli.command else {
        return Ok(false);
    };
    let files: Vec<&Path> = files.iter().map(|p| p.as_path()).collect();
    let report = dicom_import(&cfg.spm, &files, outdir, &ProcessRunner)?;
    print_one(cli.json, report, |r| {
        r.files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(true)
}

pub fn handle_doctor_command(cli: &Cli, cfg: &Config) -> anyhow::Result<bool> {
    let Commands::Doctor { .. } = &cli.command else {
        return Ok(false);
    };
    let report = doctor(cfg);
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut {
                ok: report.overall == "ok",
                data: report
            })?
        );
    } else {
        println!("limri doctor: {}", report.overall);
        for c in report.checks {
            println!("{}\t{}", c.name, c.status);
        }
    }
    Ok(true)
}
