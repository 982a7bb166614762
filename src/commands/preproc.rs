use crate::*;
use crate::domain::constants::{FIGURE_SNAPSHOT, LI_MODIFIED_AFFINE, SANLM_PREFIX, WARP_PREFIX};
use crate::services::cluster::{run_cluster, run_local, JobOptions};
use crate::services::config::Config;
use crate::services::discovery::{discover_from_globs, discover_from_lists, select_list_files};
use crate::services::intensity::default_threshold;
use crate::services::plotting::plot_anat_li;
use crate::services::registration::prefixed;
use crate::services::runner::ProcessRunner;
use crate::services::volume::Volume;
use std::path::Path;

pub fn handle_preproc_command(cli: &Cli, cfg: &Config) -> anyhow::Result<bool> {
    let Commands::Preproc(args) = &cli.command else {
        return Ok(false);
    };

    let subjects = match args.method {
        Method::Plot => {
            plot_existing(cli, args, cfg)?;
            return Ok(true);
        }
        Method::Regex => discover_from_globs(&args.li, &args.lianat, &args.anat)?,
        Method::FileTxt => {
            let [li, lianat, anat] = select_list_files(
                args.li_file_txt.as_deref(),
                args.lianat_file_txt.as_deref(),
                args.anat_file_txt.as_deref(),
                [
                    Path::new(&args.li),
                    Path::new(&args.lianat),
                    Path::new(&args.anat),
                ],
            )?;
            discover_from_lists(li, lianat, anat)?
        }
    };

    match args.launch {
        Launch::Local => {
            let reports = run_local(&subjects, cfg, args.threshold, &ProcessRunner)?;
            print_out(cli.json, &reports, |r| {
                format!(
                    "{}\t{}\tthreshold={}",
                    r.subject,
                    r.transfo_dir.display(),
                    r.threshold
                )
            })?;
        }
        Launch::Cluster => {
            let jobs_dir = match &args.jobs_dir {
                Some(dir) => dir.clone(),
                None => cfg.cluster.resolved_jobs_dir()?,
            };
            // jobs run from another working directory
            let config_path = match &cli.config {
                Some(p) => Some(std::fs::canonicalize(p)?),
                None => None,
            };
            let opts = JobOptions {
                exe: std::env::current_exe()?,
                config_path: config_path.as_deref(),
                threshold: args.threshold,
            };
            let reports = run_cluster(&subjects, cfg, &jobs_dir, &opts, &ProcessRunner)?;
            print_out(cli.json, &reports, |r| {
                format!("{}\t{}", r.subject, r.script.display())
            })?;
        }
    }
    Ok(true)
}

/// Snapshot of an already preprocessed subject, next to its Li image.
fn plot_existing(cli: &Cli, args: &PreprocArgs, cfg: &Config) -> anyhow::Result<()> {
    let li_dir = Path::new(&args.li)
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let li_mni = li_dir.join(format!(
        "{}{}{}",
        SANLM_PREFIX, WARP_PREFIX, LI_MODIFIED_AFFINE
    ));
    let anat_mni = prefixed(Path::new(&args.anat), WARP_PREFIX);
    let threshold = match args.threshold {
        Some(t) => t,
        None => default_threshold(
            &Volume::load(&li_mni)?.data,
            cfg.pipeline.threshold_ratio,
        ),
    };
    let report = plot_anat_li(&li_mni, &anat_mni, threshold, &li_dir.join(FIGURE_SNAPSHOT))?;
    print_one(cli.json, report, |r| {
        format!("figure\t{}\tthreshold={}", r.figure.display(), r.threshold)
    })
}
