//! Denoising: CAT12 SANLM through the standalone, or an in-process
//! non-local means filter.

use crate::domain::constants::SANLM_PREFIX;
use crate::services::batch::matlab_quote;
use crate::services::config::Cat12Config;
use crate::services::runner::{Invocation, ToolRunner};
use crate::services::volume::Volume;
use ndarray::Array3;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct NlmParams {
    pub patch_radius: usize,
    pub search_radius: usize,
    /// Filtering strength relative to the estimated noise level.
    pub h_factor: f64,
}

impl Default for NlmParams {
    fn default() -> Self {
        Self {
            patch_radius: 4,
            search_radius: 5,
            h_factor: 1.15,
        }
    }
}

/// Gaussian noise level from the finest diagonal Haar detail coefficients
/// (median absolute deviation).
pub fn estimate_sigma(arr: &Array3<f64>) -> f64 {
    let (nx, ny, nz) = arr.dim();
    if nx < 2 || ny < 2 || nz < 2 {
        return 0.0;
    }
    let norm = 2.0 * std::f64::consts::SQRT_2;
    let mut details = Vec::with_capacity((nx / 2) * (ny / 2) * (nz / 2));
    for i in (0..nx - 1).step_by(2) {
        for j in (0..ny - 1).step_by(2) {
            for k in (0..nz - 1).step_by(2) {
                let mut d = 0.0;
                for (a, b, c) in (0..8).map(|n| (n & 1, (n >> 1) & 1, (n >> 2) & 1)) {
                    let sign = if (a + b + c) % 2 == 0 { 1.0 } else { -1.0 };
                    d += sign * arr[[i + a, j + b, k + c]];
                }
                details.push((d / norm).abs());
            }
        }
    }
    details.sort_by(|a, b| a.total_cmp(b));
    let mid = details.len() / 2;
    let median = if details.len() % 2 == 0 {
        (details[mid - 1] + details[mid]) / 2.0
    } else {
        details[mid]
    };
    median / 0.6745
}

#[inline]
fn clamped(arr: &Array3<f64>, i: isize, j: isize, k: isize) -> f64 {
    let (nx, ny, nz) = arr.dim();
    let ci = i.clamp(0, nx as isize - 1) as usize;
    let cj = j.clamp(0, ny as isize - 1) as usize;
    let ck = k.clamp(0, nz as isize - 1) as usize;
    arr[[ci, cj, ck]]
}

/// Summed-area table of `(a(x) - a(x + offset))²` over the grid padded by
/// `radius` on every side, edges clamped. `table[[a, b, c]]` holds the sum
/// over padded indices below `(a, b, c)`.
fn squared_difference_table(
    arr: &Array3<f64>,
    offset: [isize; 3],
    radius: isize,
    table: &mut Array3<f64>,
) {
    let (px, py, pz) = table.dim();
    for a in 1..px {
        for b in 1..py {
            for c in 1..pz {
                let x = a as isize - 1 - radius;
                let y = b as isize - 1 - radius;
                let z = c as isize - 1 - radius;
                let d = clamped(arr, x, y, z)
                    - clamped(arr, x + offset[0], y + offset[1], z + offset[2]);
                table[[a, b, c]] = d * d
                    + table[[a - 1, b, c]]
                    + table[[a, b - 1, c]]
                    + table[[a, b, c - 1]]
                    - table[[a - 1, b - 1, c]]
                    - table[[a - 1, b, c - 1]]
                    - table[[a, b - 1, c - 1]]
                    + table[[a - 1, b - 1, c - 1]];
            }
        }
    }
}

/// Sum of the table's cells over the cube `[lo, lo + side)` on each axis.
#[inline]
fn box_sum(table: &Array3<f64>, lo: [usize; 3], side: usize) -> f64 {
    let [i0, j0, k0] = lo;
    let (i1, j1, k1) = (i0 + side, j0 + side, k0 + side);
    table[[i1, j1, k1]]
        - table[[i0, j1, k1]]
        - table[[i1, j0, k1]]
        - table[[i1, j1, k0]]
        + table[[i0, j0, k1]]
        + table[[i0, j1, k0]]
        + table[[i1, j0, k0]]
        - table[[i0, j0, k0]]
}

/// Non-local means with weights `exp(-d / h²)`, `h = h_factor · σ`, `d` the
/// mean squared difference between patches. Patch distances for one search
/// offset come from a summed-area table, so the patch size only costs the
/// table build.
pub fn nlm_denoise(
    arr: &Array3<f64>,
    sigma: f64,
    params: &NlmParams,
) -> anyhow::Result<Array3<f64>> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return Ok(arr.clone());
    }
    let (nx, ny, nz) = arr.dim();
    let h2 = (params.h_factor * sigma).powi(2);
    let pr = params.patch_radius as isize;
    let sr = params.search_radius as isize;
    let side = 2 * params.patch_radius + 1;
    let patch_volume = (side * side * side) as f64;
    let padded = (
        nx + 2 * params.patch_radius + 1,
        ny + 2 * params.patch_radius + 1,
        nz + 2 * params.patch_radius + 1,
    );

    let mut offsets = Vec::new();
    for di in -sr..=sr {
        for dj in -sr..=sr {
            for dk in -sr..=sr {
                offsets.push([di, dj, dk]);
            }
        }
    }

    let empty = || {
        (
            Array3::<f64>::zeros((nx, ny, nz)),
            Array3::<f64>::zeros((nx, ny, nz)),
            Array3::<f64>::zeros(padded),
        )
    };
    let (weights, acc, _) = offsets
        .par_iter()
        .fold(empty, |(mut weights, mut acc, mut table), offset| {
            squared_difference_table(arr, *offset, pr, &mut table);
            for i in 0..nx {
                let ni = i as isize + offset[0];
                if ni < 0 || ni >= nx as isize {
                    continue;
                }
                for j in 0..ny {
                    let nj = j as isize + offset[1];
                    if nj < 0 || nj >= ny as isize {
                        continue;
                    }
                    for k in 0..nz {
                        let nk = k as isize + offset[2];
                        if nk < 0 || nk >= nz as isize {
                            continue;
                        }
                        let d = box_sum(&table, [i, j, k], side).max(0.0) / patch_volume;
                        let w = (-d / h2).exp();
                        weights[[i, j, k]] += w;
                        acc[[i, j, k]] += w * arr[[ni as usize, nj as usize, nk as usize]];
                    }
                }
            }
            (weights, acc, table)
        })
        .reduce(empty, |(w1, a1, t), (w2, a2, _)| (w1 + w2, a1 + a2, t));

    Ok(acc / weights)
}

/// Denoises `input` into `output` with a noise level estimated from the
/// image itself; returns that estimate.
pub fn denoise_file(input: &Path, output: &Path, params: &NlmParams) -> anyhow::Result<f64> {
    let vol = Volume::load(input)?;
    let sigma = estimate_sigma(&vol.data);
    tracing::info!(input = %input.display(), sigma, "non-local means");
    let data = nlm_denoise(&vol.data, sigma, params)?;
    vol.with_data(data).save(output)?;
    Ok(sigma)
}

/// `<dir>/sanlm_<name>`, where CAT12 writes the filtered image.
pub fn sanlm_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}", SANLM_PREFIX, name))
}

pub fn sanlm_batch(input: &Path) -> String {
    let field = "matlabbatch{1}.spm.tools.cat.tools.sanlm";
    [
        format!("{}.data = {{{}}};", field, matlab_quote(&format!("{},1", input.display()))),
        format!("{}.spm_type = 16;", field),
        format!("{}.prefix = '{}';", field, SANLM_PREFIX),
        format!("{}.suffix = '';", field),
        format!("{}.intlim = 100;", field),
        format!("{}.addnoise = 0;", field),
        format!("{}.rician = 0;", field),
        format!("{}.replaceNANandINF = 1;", field),
        format!("{}.nlmfilter.optimized.NCstr = -Inf;", field),
    ]
    .join("\n")
        + "\n"
}

/// Runs CAT12 SANLM on `input`; the batch file goes to `script_dir`.
pub fn cat12_sanlm(
    cfg: &Cat12Config,
    input: &Path,
    script_dir: &Path,
    runner: &dyn ToolRunner,
) -> anyhow::Result<PathBuf> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    std::fs::create_dir_all(script_dir)?;
    let batch = script_dir.join(format!("sanlm_{}_batch.m", stem));
    std::fs::write(&batch, sanlm_batch(input))?;
    let output = sanlm_output(input);
    runner.run(
        &Invocation::new(&cfg.executable)
            .arg("-s")
            .arg(&cfg.standalone)
            .arg("-m")
            .arg(&cfg.mcr)
            .arg("-b")
            .arg(&batch)
            .output(&output),
    )?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::runner::testing::RecordingRunner;

    /// Deterministic uniform noise in [-1, 1].
    fn noise(n: usize) -> Vec<f64> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    fn step_volume(n: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, n, n), |(i, _, _)| if i < n / 2 { 0.0 } else { 10.0 })
    }

    fn mse(a: &Array3<f64>, b: &Array3<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64
    }

    #[test]
    fn constant_volume_has_no_noise() {
        let arr = Array3::from_elem((6, 6, 6), 3.0);
        assert_eq!(estimate_sigma(&arr), 0.0);
        let out = nlm_denoise(&arr, estimate_sigma(&arr), &NlmParams::default()).expect("nlm");
        assert_eq!(out, arr);
    }

    #[test]
    fn sigma_estimate_tracks_noise_level() {
        let clean = step_volume(12);
        let noisy = clean.clone() + Array3::from_shape_vec((12, 12, 12), noise(1728)).expect("shape");
        let sigma = estimate_sigma(&noisy);
        // uniform noise on [-1, 1] has a standard deviation of about 0.577
        assert!(sigma > 0.35 && sigma < 0.85, "sigma = {}", sigma);
    }

    #[test]
    fn nlm_reduces_error_against_clean_volume() {
        let clean = step_volume(10);
        let noisy = clean.clone() + Array3::from_shape_vec((10, 10, 10), noise(1000)).expect("shape");
        let params = NlmParams {
            patch_radius: 1,
            search_radius: 2,
            h_factor: 1.15,
        };
        let out = nlm_denoise(&noisy, estimate_sigma(&noisy), &params).expect("nlm");
        assert!(mse(&out, &clean) < 0.5 * mse(&noisy, &clean));
    }

    /// Direct patch-by-patch evaluation of the same weights.
    fn direct_nlm(arr: &Array3<f64>, sigma: f64, params: &NlmParams) -> Array3<f64> {
        let (nx, ny, nz) = arr.dim();
        let h2 = (params.h_factor * sigma).powi(2);
        let (pr, sr) = (params.patch_radius as isize, params.search_radius as isize);
        let side = (2 * pr + 1) as f64;
        Array3::from_shape_fn((nx, ny, nz), |(i, j, k)| {
            let (i, j, k) = (i as isize, j as isize, k as isize);
            let (mut weights, mut acc) = (0.0, 0.0);
            for di in -sr..=sr {
                for dj in -sr..=sr {
                    for dk in -sr..=sr {
                        let (ni, nj, nk) = (i + di, j + dj, k + dk);
                        if ni < 0 || nj < 0 || nk < 0 {
                            continue;
                        }
                        if ni >= nx as isize || nj >= ny as isize || nk >= nz as isize {
                            continue;
                        }
                        let mut d = 0.0;
                        for pi in -pr..=pr {
                            for pj in -pr..=pr {
                                for pk in -pr..=pr {
                                    let a = clamped(arr, i + pi, j + pj, k + pk);
                                    let b = clamped(arr, ni + pi, nj + pj, nk + pk);
                                    d += (a - b) * (a - b);
                                }
                            }
                        }
                        let w = (-(d / (side * side * side)) / h2).exp();
                        weights += w;
                        acc += w * arr[[ni as usize, nj as usize, nk as usize]];
                    }
                }
            }
            acc / weights
        })
    }

    #[test]
    fn summed_area_filter_matches_direct_patch_sums() {
        let arr = step_volume(7) + Array3::from_shape_vec((7, 7, 7), noise(343)).expect("shape");
        let params = NlmParams {
            patch_radius: 1,
            search_radius: 2,
            h_factor: 1.15,
        };
        let fast = nlm_denoise(&arr, 0.6, &params).expect("nlm");
        let direct = direct_nlm(&arr, 0.6, &params);
        for (a, b) in fast.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn edge_a_few_sigma_high_survives_filtering() {
        // 0 -> 4 step along i with sigma = 1; a box mean would give 1.6 and 2.4
        let arr = Array3::from_shape_fn((8, 8, 8), |(i, _, _)| if i < 4 { 0.0 } else { 4.0 });
        let params = NlmParams {
            patch_radius: 1,
            search_radius: 2,
            h_factor: 1.15,
        };
        let out = nlm_denoise(&arr, 1.0, &params).expect("nlm");
        assert!(out[[3, 4, 4]] < 0.5, "dark side: {}", out[[3, 4, 4]]);
        assert!(out[[4, 4, 4]] > 3.5, "bright side: {}", out[[4, 4, 4]]);
    }

    #[test]
    fn denoise_file_writes_output_and_reports_sigma() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let input = tmp.path().join("li.nii");
        let output = tmp.path().join("li_nlm.nii.gz");
        let noisy = step_volume(6) + Array3::from_shape_vec((6, 6, 6), noise(216)).expect("shape");
        Volume::new(noisy, nalgebra::Matrix4::identity())
            .save(&input)
            .expect("save");
        let params = NlmParams {
            patch_radius: 1,
            search_radius: 1,
            h_factor: 1.15,
        };
        let sigma = denoise_file(&input, &output, &params).expect("denoise");
        assert!(sigma > 0.0);
        assert_eq!(Volume::load(&output).expect("load").shape(), [6, 6, 6]);
    }

    #[test]
    fn sanlm_runs_cat12_batch_and_declares_prefixed_output() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let input = tmp.path().join("wli_modified_affine.nii");
        let runner = RecordingRunner::new(|_| {});
        let out = cat12_sanlm(&Cat12Config::default(), &input, tmp.path(), &runner).expect("sanlm");
        assert_eq!(out, tmp.path().join("sanlm_wli_modified_affine.nii"));

        let calls = runner.calls.borrow();
        assert_eq!(calls[0].args[0], "-s");
        assert_eq!(calls[0].args[4], "-b");
        assert_eq!(calls[0].outputs, vec![out.clone()]);
        let batch = std::fs::read_to_string(&calls[0].args[5]).expect("batch written");
        assert!(batch.contains("spm.tools.cat.tools.sanlm.prefix = 'sanlm_';"));
        assert!(batch.contains("wli_modified_affine.nii,1"));
    }
}
