use crate::domain::models::{CheckItem, DoctorReport};
use crate::services::config::Config;
use std::path::Path;

fn path_check(name: &str, path: &Path) -> CheckItem {
    CheckItem {
        name: name.to_string(),
        status: if path.exists() { "ok" } else { "missing" }.to_string(),
    }
}

/// Like `path_check`, but a bare program name is looked up on `PATH`.
fn program_check(name: &str, program: &Path) -> CheckItem {
    let bare = program.components().count() == 1 && !program.is_absolute();
    let found = if bare {
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    } else {
        program.exists()
    };
    CheckItem {
        name: name.to_string(),
        status: if found { "ok" } else { "missing" }.to_string(),
    }
}

pub fn doctor(cfg: &Config) -> DoctorReport {
    let mut checks = vec![
        path_check("cat12_executable", &cfg.cat12.executable),
        path_check("cat12_standalone", &cfg.cat12.standalone),
        path_check("cat12_mcr", &cfg.cat12.mcr),
        path_check("tpm_file", &cfg.cat12.tpm_file),
        path_check("darteltpm_file", &cfg.cat12.darteltpm_file),
        path_check("spm_executable", &cfg.spm.executable),
        path_check("spm_mcr", &cfg.spm.mcr),
        program_check("flirt", &cfg.fsl.flirt),
    ];
    checks.push(match &cfg.cat12.matlabbatch {
        Some(p) => path_check("matlabbatch", p),
        None => CheckItem {
            name: "matlabbatch".to_string(),
            status: "builtin".to_string(),
        },
    });
    // spawn check only; the exit status is ignored
    let submit = cfg.cluster.submit_command.split_whitespace().next();
    checks.push(CheckItem {
        name: "submit_command".to_string(),
        status: match submit {
            Some(program)
                if std::process::Command::new(program)
                    .arg("--version")
                    .output()
                    .is_ok() =>
            {
                "ok"
            }
            _ => "missing",
        }
        .to_string(),
    });

    let overall = if checks
        .iter()
        .all(|c| c.status == "ok" || c.status == "builtin")
    {
        "ok"
    } else {
        "needs_attention"
    }
    .to_string();

    DoctorReport { overall, checks }
}
