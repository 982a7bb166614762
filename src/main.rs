use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod domain;
mod services;

pub use cli::*;
pub use domain::models::*;
pub use services::output::*;

use services::config::load_config;

fn tool_args(command: &Commands) -> Option<&ToolArgs> {
    match command {
        Commands::Preproc(args) => Some(&args.tools),
        Commands::Register { tools, .. }
        | Commands::Batch { tools, .. }
        | Commands::Dicom { tools, .. }
        | Commands::Doctor { tools } => Some(tools),
        _ => None,
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut cfg = load_config(cli.config.as_deref())?;
    if let Some(tools) = tool_args(&cli.command) {
        cfg = cfg.with_overrides(tools);
    }

    if commands::handle_preproc_command(cli, &cfg)? {
        return Ok(());
    }
    if commands::handle_image_commands(cli)? {
        return Ok(());
    }
    if commands::handle_register_commands(cli, &cfg)? {
        return Ok(());
    }
    if commands::handle_batch_command(cli, &cfg)? {
        return Ok(());
    }
    if commands::handle_dicom_command(cli, &cfg)? {
        return Ok(());
    }
    commands::handle_doctor_command(cli, &cfg)?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // stdout carries command output only
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("limri=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(&cli) {
        print_error(cli.json, &err);
        std::process::exit(1);
    }
}
