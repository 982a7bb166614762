//! Static overlay snapshots: the lithium map over the anatomical image,
//! three orthogonal panels through fixed MNI coordinates.

use crate::domain::constants::CUT_COORDS;
use crate::domain::errors::LimriError;
use crate::domain::models::PlotReport;
use crate::services::volume::Volume;
use image::{Rgb, RgbImage};
use nalgebra::{Matrix4, Vector4};
use std::path::Path;

/// Overlay colours start here on the colormap so that the weakest
/// suprathreshold voxels stay visible against the background.
const OVERLAY_FLOOR: f64 = 0.25;

/// black -> blue -> cyan -> white.
pub fn black_blue(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64, s: f64| (a + (b - a) * s).round() as u8;
    if t < 0.5 {
        let s = t / 0.5;
        Rgb([0, 0, lerp(0.0, 255.0, s)])
    } else if t < 0.75 {
        let s = (t - 0.5) / 0.25;
        Rgb([0, lerp(0.0, 255.0, s), 255])
    } else {
        let s = (t - 0.75) / 0.25;
        Rgb([lerp(0.0, 255.0, s), 255, 255])
    }
}

fn panel_size(panel: usize, shape: [usize; 3]) -> (usize, usize) {
    match panel {
        0 => (shape[1], shape[2]),
        1 => (shape[0], shape[2]),
        _ => (shape[0], shape[1]),
    }
}

fn panel_voxel(panel: usize, cut: [usize; 3], u: usize, v: usize) -> [usize; 3] {
    match panel {
        0 => [cut[0], u, v],
        1 => [u, cut[1], v],
        _ => [u, v, cut[2]],
    }
}

fn sample(li: &Volume, anat_to_li: &Matrix4<f64>, voxel: [usize; 3]) -> Option<f64> {
    let p = anat_to_li * Vector4::new(voxel[0] as f64, voxel[1] as f64, voxel[2] as f64, 1.0);
    let shape = li.shape();
    let mut idx = [0usize; 3];
    for axis in 0..3 {
        let r = p[axis].round();
        if r < 0.0 || r >= shape[axis] as f64 {
            return None;
        }
        idx[axis] = r as usize;
    }
    Some(li.data[idx])
}

/// Sagittal, coronal and axial panels side by side, superior side up.
/// Lithium voxels at or above `threshold` are drawn over the greyscale
/// anatomy; the Li image is sampled through both affines so the two grids
/// need not match.
pub fn render_overlay(
    li: &Volume,
    anat: &Volume,
    threshold: f64,
    cut_coords: [f64; 3],
) -> Result<RgbImage, LimriError> {
    let shape = anat.shape();
    let li_inverse = li
        .affine
        .try_inverse()
        .ok_or_else(|| LimriError::UnsupportedVolume {
            path: "Li image".into(),
            reason: "singular affine".to_string(),
        })?;
    let anat_to_li = li_inverse * anat.affine;
    let cut = anat
        .world_to_voxel(cut_coords)
        .unwrap_or([shape[0] / 2, shape[1] / 2, shape[2] / 2]);

    let anat_max = anat.max();
    let li_max = li.max();
    let sizes: Vec<(usize, usize)> = (0..3).map(|p| panel_size(p, shape)).collect();
    let width: usize = sizes.iter().map(|(w, _)| w).sum();
    let height = sizes.iter().map(|(_, h)| *h).max().unwrap_or(0);
    let mut img = RgbImage::new(width as u32, height as u32);

    let mut x0 = 0;
    for (panel, (w, h)) in sizes.iter().enumerate() {
        for u in 0..*w {
            for v in 0..*h {
                let voxel = panel_voxel(panel, cut, u, v);
                let grey = if anat_max > 0.0 {
                    (anat.data[voxel] / anat_max).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let g = (grey * 255.0).round() as u8;
                let mut colour = Rgb([g, g, g]);
                if let Some(value) = sample(li, &anat_to_li, voxel) {
                    if value > 0.0 && value >= threshold && li_max > 0.0 {
                        let t = OVERLAY_FLOOR + (1.0 - OVERLAY_FLOOR) * (value / li_max);
                        colour = black_blue(t);
                    }
                }
                img.put_pixel((x0 + u) as u32, (height - 1 - v) as u32, colour);
            }
        }
        x0 += w;
    }
    Ok(img)
}

pub fn plot_anat_li(
    li_path: &Path,
    anat_path: &Path,
    threshold: f64,
    figure: &Path,
) -> anyhow::Result<PlotReport> {
    let li = Volume::load(li_path)?;
    let anat = Volume::load(anat_path)?;
    save_overlay(&li, &anat, threshold, figure)
}

pub fn save_overlay(
    li: &Volume,
    anat: &Volume,
    threshold: f64,
    figure: &Path,
) -> anyhow::Result<PlotReport> {
    let img = render_overlay(li, anat, threshold, CUT_COORDS)?;
    if let Some(parent) = figure.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    img.save(figure)
        .map_err(|e| anyhow::anyhow!("cannot write figure {}: {}", figure.display(), e))?;
    tracing::info!(figure = %figure.display(), threshold, "figure written");
    Ok(PlotReport {
        figure: figure.to_path_buf(),
        threshold,
    })
}
