//! Shared data model layer (structs/constants only).
//!
//! ## Purpose
//! - Keep report/DTO structs in one place.
//! - Keep the on-disk naming contract of the pipeline (`transfo/*` files) explicit.
//! - Make JSON output schema changes explicit and reviewable.
//!
//! ## Files
//! - `models.rs`: subjects, step/pipeline/job reports, output envelopes.
//! - `constants.rs`: file names, MNI grid, default tool locations.
//! - `errors.rs`: typed failures with stable machine codes.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem/process side effects.
//!
//! ## Compatibility note
//! Changes in these structs affect `--json` outputs and the job scripts
//! that re-invoke `limri` on the cluster.

pub mod constants;
pub mod errors;
pub mod models;
