use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn run_help(home: &TempDir, args: &[&str]) {
    let mut cmd = cargo_bin_cmd!("limri");
    cmd.env("HOME", home.path())
        .args(args)
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn every_cli_command_has_help_path() {
    let home = TempDir::new().expect("temp home");

    // top-level
    run_help(&home, &[]);

    run_help(&home, &["preproc"]);
    run_help(&home, &["normalize"]);
    run_help(&home, &["threshold"]);
    run_help(&home, &["denoise"]);
    run_help(&home, &["batch"]);
    run_help(&home, &["dicom"]);
    run_help(&home, &["doctor"]);

    // grouped subcommands
    run_help(&home, &["register"]);
    run_help(&home, &["register", "coreg"]);
    run_help(&home, &["register", "apply"]);
    run_help(&home, &["register", "warp"]);
    run_help(&home, &["register", "reslice"]);
    run_help(&home, &["register", "scale"]);
}

#[test]
fn preproc_help_lists_original_flag_spellings() {
    let home = TempDir::new().expect("temp home");
    let mut cmd = cargo_bin_cmd!("limri");
    cmd.env("HOME", home.path())
        .args(["preproc", "--help"])
        .assert()
        .success()
        .stdout(contains("--Li <LI>"))
        .stdout(contains("--Lianat_file_txt"))
        .stdout(contains("--executable_cat12"))
        .stdout(contains("file_txt"));
}

#[test]
fn unknown_method_is_rejected_by_parser() {
    let home = TempDir::new().expect("temp home");
    let mut cmd = cargo_bin_cmd!("limri");
    cmd.env("HOME", home.path())
        .args([
            "preproc", "--method", "bids", "--Li", "a", "--Lianat", "b", "--anat", "c",
            "--launch", "local",
        ])
        .assert()
        .failure()
        .stderr(contains("invalid value 'bids'"));
}
