//! NIfTI volume I/O.
//!
//! Volumes are kept as `Array3<f64>` indexed `[i, j, k]` in NIfTI voxel
//! order, together with the voxel-to-world affine. Inputs may be `.nii` or
//! `.nii.gz`; a 4-D input keeps its first frame. Outputs are written as
//! float32, gzip-compressed when the path ends with `.gz`.

use crate::domain::errors::LimriError;
use nalgebra::{Matrix4, Vector4};
use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Volume {
    pub data: Array3<f64>,
    pub affine: Matrix4<f64>,
    header: NiftiHeader,
}

impl Volume {
    pub fn new(data: Array3<f64>, affine: Matrix4<f64>) -> Self {
        let mut header = NiftiHeader::default();
        header.set_affine(&affine);
        Self {
            data,
            affine,
            header,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let header = obj.header().clone();
        let affine = header.affine::<f64>();
        let array = obj
            .into_volume()
            .into_ndarray::<f64>()
            .map_err(|e| anyhow::anyhow!("cannot decode {}: {}", path.display(), e))?;
        let data = match array.ndim() {
            3 => array.into_dimensionality::<Ix3>()?,
            4 => array.index_axis_move(Axis(3), 0).into_dimensionality::<Ix3>()?,
            n => {
                return Err(LimriError::UnsupportedVolume {
                    path: path.to_path_buf(),
                    reason: format!("expected a 3D or 4D image, got {}D", n),
                }
                .into())
            }
        };
        Ok(Self {
            data,
            affine,
            header,
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut header = self.header.clone();
        header.set_affine(&self.affine);
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        let data = self.data.mapv(|v| v as f32);
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&data)
            .map_err(|e| anyhow::anyhow!("cannot write {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Same header and affine, new voxel values.
    pub fn with_data(&self, data: Array3<f64>) -> Self {
        Self {
            data,
            affine: self.affine,
            header: self.header.clone(),
        }
    }

    /// Same voxel values, new affine.
    pub fn with_affine(&self, affine: Matrix4<f64>) -> Self {
        Self {
            data: self.data.clone(),
            affine,
            header: self.header.clone(),
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    pub fn max(&self) -> f64 {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn require_shape(&self, path: &Path, expected: [usize; 3]) -> anyhow::Result<()> {
        let found = self.shape();
        if found != expected {
            return Err(LimriError::ShapeMismatch {
                path: path.to_path_buf(),
                expected: expected.to_vec(),
                found: found.to_vec(),
            }
            .into());
        }
        Ok(())
    }

    /// Nearest voxel to a world coordinate (mm), if it falls inside the grid.
    pub fn world_to_voxel(&self, world: [f64; 3]) -> Option<[usize; 3]> {
        let inverse = self.affine.try_inverse()?;
        let v = inverse * Vector4::new(world[0], world[1], world[2], 1.0);
        let shape = self.shape();
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let idx = v[axis].round();
            if idx < 0.0 || idx >= shape[axis] as f64 {
                return None;
            }
            out[axis] = idx as usize;
        }
        Some(out)
    }
}
