use crate::cli::{Denoiser, ToolArgs};
use crate::domain::constants::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub cat12: Cat12Config,
    pub spm: SpmConfig,
    pub fsl: FslConfig,
    pub cluster: ClusterConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Cat12Config {
    pub executable: PathBuf,
    pub standalone: PathBuf,
    pub mcr: PathBuf,
    pub tpm_file: PathBuf,
    pub darteltpm_file: PathBuf,
    /// VBM batch template; the built-in one is used when unset.
    pub matlabbatch: Option<PathBuf>,
}

impl Default for Cat12Config {
    fn default() -> Self {
        Self {
            executable: DEFAULT_CAT12_EXECUTABLE.into(),
            standalone: DEFAULT_CAT12_STANDALONE.into(),
            mcr: DEFAULT_CAT12_MCR.into(),
            tpm_file: DEFAULT_TPM_FILE.into(),
            darteltpm_file: DEFAULT_DARTELTPM_FILE.into(),
            matlabbatch: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpmConfig {
    pub executable: PathBuf,
    pub mcr: PathBuf,
}

impl Default for SpmConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_SPM_EXECUTABLE.into(),
            mcr: DEFAULT_SPM_MCR.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FslConfig {
    /// Bare names are resolved on `PATH`.
    pub flirt: PathBuf,
}

impl Default for FslConfig {
    fn default() -> Self {
        Self {
            flirt: DEFAULT_FLIRT.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub queue: String,
    pub walltime: String,
    /// Defaults to `$HOME/limri_jobs` when unset.
    pub jobs_dir: Option<PathBuf>,
    pub job_prefix: String,
    pub submit_command: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_PBS_QUEUE.to_string(),
            walltime: DEFAULT_PBS_WALLTIME.to_string(),
            jobs_dir: None,
            job_prefix: DEFAULT_JOB_PREFIX.to_string(),
            submit_command: DEFAULT_SUBMIT_COMMAND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub denoiser: Denoiser,
    /// Also apply the inverse Li -> Lianat transform to the Li header.
    pub compose_li_coreg: bool,
    pub mni_shape: [usize; 3],
    pub threshold_ratio: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            denoiser: Denoiser::default(),
            compose_li_coreg: false,
            mni_shape: MNI_SHAPE,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
        }
    }
}

impl ClusterConfig {
    pub fn resolved_jobs_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.jobs_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let home = std::env::var("HOME")?;
                Ok(PathBuf::from(home).join("limri_jobs"))
            }
        }
    }
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")?;
    Ok(PathBuf::from(home).join(".config/limri/config.toml"))
}

/// Reads the explicit path, or the per-user file when it exists.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = default_config_path()?;
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
    Ok(toml::from_str(&raw)?)
}

impl Config {
    pub fn with_overrides(mut self, tools: &ToolArgs) -> Self {
        let set = |slot: &mut PathBuf, value: &Option<PathBuf>| {
            if let Some(v) = value {
                *slot = v.clone();
            }
        };
        set(&mut self.cat12.executable, &tools.executable_cat12);
        set(&mut self.cat12.standalone, &tools.standalone_cat12);
        set(&mut self.cat12.mcr, &tools.mcr_matlab);
        set(&mut self.cat12.tpm_file, &tools.tpm_file);
        set(&mut self.cat12.darteltpm_file, &tools.darteltpm_file);
        set(&mut self.spm.executable, &tools.spm_executable);
        set(&mut self.spm.mcr, &tools.spm_mcr);
        set(&mut self.fsl.flirt, &tools.flirt);
        if tools.matlabbatch.is_some() {
            self.cat12.matlabbatch = tools.matlabbatch.clone();
        }
        self
    }

    /// Tool flags reproducing this configuration on another host.
    pub fn tool_flags(&self) -> Vec<(&'static str, PathBuf)> {
        let mut flags = vec![
            ("--executable_cat12", self.cat12.executable.clone()),
            ("--standalone_cat12", self.cat12.standalone.clone()),
            ("--mcr_matlab", self.cat12.mcr.clone()),
            ("--tpm_file", self.cat12.tpm_file.clone()),
            ("--darteltpm_file", self.cat12.darteltpm_file.clone()),
            ("--spm_executable", self.spm.executable.clone()),
            ("--spm_mcr", self.spm.mcr.clone()),
            ("--flirt", self.fsl.flirt.clone()),
        ];
        if let Some(batch) = &self.cat12.matlabbatch {
            flags.push(("--matlabbatch", batch.clone()));
        }
        flags
    }
}
