//! Intensity normalization of MNI-space Li images, and threshold helpers.
//!
//! The array functions are pure transforms; masks select voxels where the
//! mask value is non-zero. `normalize_file` and `threshold_file` wrap them
//! with NIfTI I/O.

use crate::cli::NormMethod;
use crate::domain::constants::NORM_OUTPUT_NAME;
use crate::domain::errors::LimriError;
use crate::domain::models::{NormReport, ThresholdReport};
use crate::services::volume::Volume;
use ndarray::{Array3, Zip};
use std::path::Path;

/// Auxiliary data required by the normalization methods.
pub struct NormInputs<'a> {
    pub reference: Option<&'a Array3<f64>>,
    pub mask: &'a Array3<f64>,
    pub ref_value: Option<f64>,
}

pub fn normalize(
    method: NormMethod,
    moving: &Array3<f64>,
    inputs: &NormInputs<'_>,
) -> Result<Array3<f64>, LimriError> {
    match method {
        NormMethod::Hist => {
            let reference = inputs
                .reference
                .ok_or_else(|| LimriError::MissingReference(method.as_str().to_string()))?;
            hist_matching(moving, reference, inputs.mask)
        }
        NormMethod::Minmax => {
            let reference = inputs
                .reference
                .ok_or_else(|| LimriError::MissingReference(method.as_str().to_string()))?;
            minmax_matching(moving, reference, inputs.mask)
        }
        NormMethod::Mean => {
            let ref_value = inputs.ref_value.ok_or(LimriError::MissingRefValue)?;
            from_mean_matching(moving, ref_value)
        }
    }
}

fn check_shape(a: &Array3<f64>, b: &Array3<f64>, what: &str) -> Result<(), LimriError> {
    if a.shape() != b.shape() {
        return Err(LimriError::ShapeMismatch {
            path: what.into(),
            expected: a.shape().to_vec(),
            found: b.shape().to_vec(),
        });
    }
    Ok(())
}

fn masked_values(arr: &Array3<f64>, mask: &Array3<f64>) -> Vec<f64> {
    Zip::from(arr)
        .and(mask)
        .fold(Vec::new(), |mut acc, &v, &m| {
            if m != 0.0 && v.is_finite() {
                acc.push(v);
            }
            acc
        })
}

/// Sorted distinct values with their cumulative quantiles in (0, 1].
fn quantiles(mut values: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
    values.sort_by(|a, b| a.total_cmp(b));
    let total = values.len() as f64;
    let mut distinct: Vec<f64> = Vec::new();
    let mut cumulative: Vec<f64> = Vec::new();
    for (i, v) in values.iter().enumerate() {
        let q = (i + 1) as f64 / total;
        if distinct.last() == Some(v) {
            if let Some(c) = cumulative.last_mut() {
                *c = q;
            }
        } else {
            distinct.push(*v);
            cumulative.push(q);
        }
    }
    (distinct, cumulative)
}

/// Piecewise-linear interpolation clamped to the end points.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if x <= xp[0] {
        return fp[0];
    }
    let last = xp.len() - 1;
    if x >= xp[last] {
        return fp[last];
    }
    let hi = xp.partition_point(|p| *p < x);
    let lo = hi - 1;
    let t = (x - xp[lo]) / (xp[hi] - xp[lo]);
    fp[lo] + t * (fp[hi] - fp[lo])
}

/// Maps the moving image's masked histogram onto the reference's.
/// Voxels outside the mask are left untouched.
pub fn hist_matching(
    moving: &Array3<f64>,
    reference: &Array3<f64>,
    mask: &Array3<f64>,
) -> Result<Array3<f64>, LimriError> {
    check_shape(moving, mask, "mask")?;
    check_shape(moving, reference, "reference")?;
    let src = masked_values(moving, mask);
    let reference_values = masked_values(reference, mask);
    if src.is_empty() || reference_values.is_empty() {
        return Err(LimriError::EmptyMask);
    }
    let (src_values, src_q) = quantiles(src);
    let (ref_values, ref_q) = quantiles(reference_values);
    let mapped: Vec<f64> = src_q.iter().map(|q| interp(*q, &ref_q, &ref_values)).collect();

    let mut out = moving.clone();
    Zip::from(&mut out).and(mask).for_each(|v, &m| {
        if m != 0.0 && v.is_finite() {
            let idx = src_values.partition_point(|s| *s < *v);
            *v = mapped[idx];
        }
    });
    Ok(out)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Linear map of the moving masked range onto the reference masked range.
pub fn minmax_matching(
    moving: &Array3<f64>,
    reference: &Array3<f64>,
    mask: &Array3<f64>,
) -> Result<Array3<f64>, LimriError> {
    check_shape(moving, mask, "mask")?;
    check_shape(moving, reference, "reference")?;
    let src = masked_values(moving, mask);
    let reference_values = masked_values(reference, mask);
    if src.is_empty() || reference_values.is_empty() {
        return Err(LimriError::EmptyMask);
    }
    let (src_min, src_max) = min_max(&src);
    let (ref_min, ref_max) = min_max(&reference_values);
    let span = src_max - src_min;
    if span == 0.0 {
        return Ok(moving.mapv(|_| ref_min));
    }
    let scale = (ref_max - ref_min) / span;
    Ok(moving.mapv(|v| ref_min + (v - src_min) * scale))
}

/// Rescales so that the mean of the non-zero voxels equals `ref_value`.
pub fn from_mean_matching(moving: &Array3<f64>, ref_value: f64) -> Result<Array3<f64>, LimriError> {
    if !ref_value.is_finite() || ref_value <= 0.0 {
        return Err(LimriError::InvalidRefValue(ref_value));
    }
    let (sum, count) = moving
        .iter()
        .filter(|v| **v != 0.0 && v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        return Err(LimriError::EmptyMask);
    }
    let mean = sum / count as f64;
    if mean == 0.0 || !mean.is_finite() {
        return Err(LimriError::DegenerateMean(mean));
    }
    Ok(moving.mapv(|v| v * ref_value / mean))
}

/// Default overlay threshold: a fraction of the maximum intensity.
pub fn default_threshold(arr: &Array3<f64>, ratio: f64) -> f64 {
    let max = arr
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() {
        max * ratio
    } else {
        0.0
    }
}

/// Highest intensity outside the brain mask, i.e. the background noise ceiling.
pub fn find_threshold(li: &Array3<f64>, mask: &Array3<f64>) -> Result<f64, LimriError> {
    check_shape(li, mask, "mask")?;
    let max = Zip::from(li)
        .and(mask)
        .fold(f64::NEG_INFINITY, |acc, &v, &m| {
            let v = if m != 0.0 { 0.0 } else { v };
            if v.is_finite() {
                acc.max(v)
            } else {
                acc
            }
        });
    Ok(if max.is_finite() { max } else { 0.0 })
}

/// Normalizes an MNI-space Li image into `<outdir>/li2mninorm.nii.gz`.
pub fn normalize_file(
    method: NormMethod,
    li: &Path,
    mask: &Path,
    reference: Option<&Path>,
    ref_value: Option<f64>,
    outdir: &Path,
) -> anyhow::Result<NormReport> {
    let moving = Volume::load(li)?;
    let mask_img = Volume::load(mask)?;
    let reference_img = match reference {
        Some(path) => Some(Volume::load(path)?),
        None => None,
    };
    let inputs = NormInputs {
        reference: reference_img.as_ref().map(|v| &v.data),
        mask: &mask_img.data,
        ref_value,
    };
    let data = normalize(method, &moving.data, &inputs)?;
    let output = outdir.join(NORM_OUTPUT_NAME);
    moving.with_data(data).save(&output)?;
    tracing::info!(method = method.as_str(), output = %output.display(), "normalized");
    Ok(NormReport {
        method: method.as_str().to_string(),
        output,
    })
}

pub fn threshold_file(li: &Path, mask: &Path) -> anyhow::Result<ThresholdReport> {
    let li_img = Volume::load(li)?;
    let mask_img = Volume::load(mask)?;
    Ok(ThresholdReport {
        threshold: find_threshold(&li_img.data, &mask_img.data)?,
    })
}
