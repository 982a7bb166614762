#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use nalgebra::Matrix4;
use ndarray::Array3;
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnv {
    _tmp: TempDir,
    pub home: PathBuf,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let home = tmp.path().join("home");
        fs::create_dir_all(&home).expect("create isolated home");
        let root = tmp.path().join("data");
        fs::create_dir_all(&root).expect("create data root");
        Self {
            _tmp: tmp,
            home,
            root,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("limri");
        cmd.env("HOME", &self.home).env_remove("RUST_LOG");
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    /// Runs a command expected to fail and returns its JSON error envelope.
    pub fn run_json_err(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .failure()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json error output")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Writes `$HOME/.config/limri/config.toml`.
    pub fn write_config(&self, body: &str) -> PathBuf {
        let path = self.home.join(".config/limri/config.toml");
        fs::create_dir_all(path.parent().expect("config dir")).expect("create config dir");
        fs::write(&path, body).expect("write config");
        path
    }

    /// Executable `/bin/sh` script under the data root.
    pub fn stub_script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = self.root.join("bin").join(name);
        fs::create_dir_all(path.parent().expect("bin dir")).expect("create bin dir");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write stub");
        let mut perms = fs::metadata(&path).expect("stub metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod stub");
        path
    }
}

pub fn touch(path: &Path) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent");
    fs::write(path, "").expect("touch file");
}

pub fn write_volume(path: &Path, data: &Array3<f32>, affine: &Matrix4<f64>) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent");
    let mut header = NiftiHeader::default();
    header.set_affine(affine);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)
        .expect("write nifti fixture");
}

pub fn write_filled(path: &Path, shape: (usize, usize, usize), value: f32) {
    write_volume(path, &Array3::from_elem(shape, value), &Matrix4::identity());
}

pub fn write_ramp(path: &Path, shape: (usize, usize, usize)) {
    let data = Array3::from_shape_fn(shape, |(i, j, k)| (i + j + k) as f32);
    write_volume(path, &data, &Matrix4::identity());
}

/// BIDS-like subject: Li under `lithium/`, both anatomies under `anat/`.
pub struct SubjectFiles {
    pub li: PathBuf,
    pub lianat: PathBuf,
    pub anat: PathBuf,
}

pub fn bids_subject(root: &Path, sub: &str) -> SubjectFiles {
    let base = root.join(format!("{sub}/ses-1"));
    let files = SubjectFiles {
        li: base.join(format!("lithium/{sub}_ses-1_acq-trufi_limri.nii")),
        lianat: base.join(format!("anat/{sub}_ses-1_acq-7T_T1w.nii")),
        anat: base.join(format!("anat/{sub}_ses-1_acq-3T_T1w.nii")),
    };
    for p in [&files.li, &files.lianat, &files.anat] {
        write_filled(p, (3, 3, 3), 1.0);
    }
    files
}

pub fn s(p: &Path) -> &str {
    p.to_str().expect("utf8 path")
}
