//! Local or PBS dispatch of the per-subject pipeline.

use crate::domain::models::{JobReport, PipelineReport, Subject};
use crate::services::config::{ClusterConfig, Config};
use crate::services::pipeline::run_pipeline;
use crate::services::runner::{Invocation, ToolRunner};
use glob::Pattern;
use std::path::{Path, PathBuf};

/// What a job needs to re-invoke `limri` on a compute node.
pub struct JobOptions<'a> {
    pub exe: PathBuf,
    pub config_path: Option<&'a Path>,
    pub threshold: Option<f64>,
}

/// Runs subjects one after another; the first failure stops the batch.
pub fn run_local(
    subjects: &[Subject],
    cfg: &Config,
    threshold: Option<f64>,
    runner: &dyn ToolRunner,
) -> anyhow::Result<Vec<PipelineReport>> {
    let mut reports = Vec::with_capacity(subjects.len());
    for (c, subject) in subjects.iter().enumerate() {
        tracing::info!(subject = %subject.id, index = c, total = subjects.len(), "preprocessing");
        reports.push(run_pipeline(subject, cfg, threshold, runner)?);
    }
    Ok(reports)
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

fn quote_path(p: &Path) -> String {
    shell_quote(&p.display().to_string())
}

/// Subject paths go back through `preproc --method regex`, so glob
/// metacharacters in them must match literally.
fn quote_pattern(p: &Path) -> String {
    shell_quote(&Pattern::escape(&p.display().to_string()))
}

/// Same subject with absolute paths; jobs start in the scheduler's working
/// directory, not the submitter's.
fn absolute_subject(subject: &Subject) -> anyhow::Result<Subject> {
    Ok(Subject {
        id: subject.id.clone(),
        li: std::path::absolute(&subject.li)?,
        lianat: std::path::absolute(&subject.lianat)?,
        anat: std::path::absolute(&subject.anat)?,
    })
}

pub fn job_command(subject: &Subject, cfg: &Config, opts: &JobOptions<'_>) -> String {
    let mut parts = vec![quote_path(&opts.exe)];
    if let Some(path) = opts.config_path {
        parts.push("--config".to_string());
        parts.push(quote_path(path));
    }
    parts.extend(["preproc", "--method", "regex", "--Li"].map(String::from));
    parts.push(quote_pattern(&subject.li));
    parts.push("--Lianat".to_string());
    parts.push(quote_pattern(&subject.lianat));
    parts.push("--anat".to_string());
    parts.push(quote_pattern(&subject.anat));
    parts.push("--launch".to_string());
    parts.push("local".to_string());
    if let Some(t) = opts.threshold {
        parts.push("--threshold".to_string());
        parts.push(t.to_string());
    }
    for (flag, value) in cfg.tool_flags() {
        parts.push(flag.to_string());
        parts.push(quote_path(&value));
    }
    parts.join(" ")
}

pub fn job_script(
    subject: &Subject,
    index: usize,
    job_dir: &Path,
    cfg: &Config,
    opts: &JobOptions<'_>,
) -> String {
    let cluster = &cfg.cluster;
    [
        "#!/bin/sh".to_string(),
        format!("#PBS -q {}", cluster.queue),
        format!("#PBS -l walltime={}", cluster.walltime),
        format!("#PBS -N {}{}", cluster.job_prefix, index),
        format!("#PBS -o {}/stdout.txt", job_dir.display()),
        format!("#PBS -e {}/stderr.txt", job_dir.display()),
        job_command(subject, cfg, opts),
    ]
    .join("\n")
        + "\n"
}

/// Writes `<jobs_dir>/job_<id>/PBSimg<index>.sh`.
pub fn write_job_script(
    subject: &Subject,
    index: usize,
    jobs_dir: &Path,
    cfg: &Config,
    opts: &JobOptions<'_>,
) -> anyhow::Result<PathBuf> {
    let job_dir = jobs_dir.join(format!("job_{}", subject.id));
    std::fs::create_dir_all(&job_dir)?;
    let script = job_dir.join(format!("PBSimg{}.sh", index));
    std::fs::write(&script, job_script(subject, index, &job_dir, cfg, opts))?;
    Ok(script)
}

pub fn submit(cluster: &ClusterConfig, script: &Path, runner: &dyn ToolRunner) -> anyhow::Result<()> {
    let mut words = cluster.submit_command.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| anyhow::anyhow!("cluster.submit_command is empty"))?;
    let mut invocation = Invocation::new(program);
    for w in words {
        invocation = invocation.arg(w);
    }
    runner.run(&invocation.arg(script))
}

pub fn run_cluster(
    subjects: &[Subject],
    cfg: &Config,
    jobs_dir: &Path,
    opts: &JobOptions<'_>,
    runner: &dyn ToolRunner,
) -> anyhow::Result<Vec<JobReport>> {
    let jobs_dir = std::path::absolute(jobs_dir)?;
    let mut reports = Vec::with_capacity(subjects.len());
    for (c, subject) in subjects.iter().enumerate() {
        let script = write_job_script(&absolute_subject(subject)?, c, &jobs_dir, cfg, opts)?;
        submit(&cfg.cluster, &script, runner)?;
        tracing::info!(subject = %subject.id, script = %script.display(), "job submitted");
        reports.push(JobReport {
            subject: subject.id.clone(),
            script,
            submitted: true,
        });
    }
    Ok(reports)
}
