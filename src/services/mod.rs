//! Service layer containing business logic and side-effect helpers.
//!
//! ## Service map
//! - `volume.rs`: NIfTI load/save with the voxel-to-world affine.
//! - `intensity.rs`: hist/minmax/mean normalization + threshold helpers.
//! - `registration.rs`: SPM12 coreg/normalise-write/reslice and CAT12 VBM wrappers.
//! - `denoise.rs`: CAT12 SANLM wrapper + in-process non-local means.
//! - `batch.rs`: MATLAB batch templating.
//! - `pipeline.rs`: per-subject step sequence with output-based skipping.
//! - `discovery.rs`: subjects from glob patterns or text lists.
//! - `cluster.rs`: local loop or PBS job scripts + submission.
//! - `plotting.rs`: PNG overlay snapshots.
//! - `runner.rs`: external process seam (`ToolRunner`).
//! - `config.rs`: TOML configuration + CLI overrides.
//! - `doctor.rs`: tool/template availability report.
//! - `output.rs`: JSON/text output helpers.
//!
//! ## Conventions
//! - Prefer pure helpers where possible.
//! - Side effects should be explicit and localized.
//! - External tools only run through a `ToolRunner`.
//! - Keep command handlers thin; delegate to services.

pub mod batch;
pub mod cluster;
pub mod config;
pub mod denoise;
pub mod discovery;
pub mod doctor;
pub mod intensity;
pub mod output;
pub mod pipeline;
pub mod plotting;
pub mod registration;
pub mod runner;
pub mod volume;
