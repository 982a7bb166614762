//! Command handler layer.
//!
//! This module owns CLI-oriented orchestration and output wiring.
//!
//! ## Files
//! - `preproc.rs`: subject discovery + local/cluster launch + plot mode.
//! - `tools.rs`: normalize/threshold/denoise, register, batch, dicom, doctor.
//!
//! ## Principles
//! - Parse/match CLI inputs here.
//! - Delegate business logic to `services/*`.
//! - Keep behavior and output schema stable.

pub mod preproc;
pub mod tools;

pub use preproc::handle_preproc_command;
pub use tools::{
    handle_batch_command, handle_dicom_command, handle_doctor_command, handle_image_commands,
    handle_register_commands,
};
