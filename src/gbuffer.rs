//! Deferred G-buffer set and scene bounds
//!
//! The host renders world position, surface normal, and albedo into three
//! RGBA-float images of identical dimensions. Importing them drops alpha and
//! produces SIMD matrices; the position matrix also yields the scene's view
//! bounding box, which the scheduler uses to boost new in-view lights.
//!
//! Author: Moroya Sakamoto

use crate::matrix::VectorMatrix;
use crate::simd::Vec3x4;
use glam::Vec3;
use thiserror::Error;

/// G-buffer validation errors
#[derive(Error, Debug)]
pub enum GBufferError {
    /// The three planes disagree on dimensions
    #[error("g-buffer dimension mismatch: positions {positions:?}, normals {normals:?}, albedo {albedo:?}")]
    DimensionMismatch {
        /// Position plane (width, height)
        positions: (usize, usize),
        /// Normal plane (width, height)
        normals: (usize, usize),
        /// Albedo plane (width, height)
        albedo: (usize, usize),
    },
    /// A plane's pixel data is shorter than width * height * 4 floats
    #[error("g-buffer pixel data too short: {got} floats for {width}x{height}")]
    TruncatedPixelData {
        /// Floats supplied
        got: usize,
        /// Expected width
        width: usize,
        /// Expected height
        height: usize,
    },
}

/// One RGBA float image as posted by the host
#[derive(Debug, Clone)]
pub struct RgbaFloatImage {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// `width * height * 4` floats, row-major RGBA
    pub data: Vec<f32>,
}

impl RgbaFloatImage {
    /// Wrap raw pixel data
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        RgbaFloatImage {
            width,
            height,
            data,
        }
    }

    fn check(&self) -> Result<(), GBufferError> {
        if self.data.len() < self.width * self.height * 4 {
            return Err(GBufferError::TruncatedPixelData {
                got: self.data.len(),
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// The three deferred planes at matching dimensions
#[derive(Debug, Default)]
pub struct GBufferSet {
    /// World-space position per pixel
    pub positions: VectorMatrix,
    /// Surface normal per pixel
    pub normals: VectorMatrix,
    /// Surface albedo per pixel
    pub albedo: VectorMatrix,
}

impl GBufferSet {
    /// An empty set (zero-sized planes)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Import the three host images, validating dimensions first
    pub fn from_images(
        positions: &RgbaFloatImage,
        normals: &RgbaFloatImage,
        albedo: &RgbaFloatImage,
    ) -> Result<Self, GBufferError> {
        if (positions.width, positions.height) != (normals.width, normals.height)
            || (positions.width, positions.height) != (albedo.width, albedo.height)
        {
            return Err(GBufferError::DimensionMismatch {
                positions: (positions.width, positions.height),
                normals: (normals.width, normals.height),
                albedo: (albedo.width, albedo.height),
            });
        }
        positions.check()?;
        normals.check()?;
        albedo.check()?;
        Ok(GBufferSet {
            positions: VectorMatrix::from_rgba_f32(positions.width, positions.height, &positions.data),
            normals: VectorMatrix::from_rgba_f32(normals.width, normals.height, &normals.data),
            albedo: VectorMatrix::from_rgba_f32(albedo.width, albedo.height, &albedo.data),
        })
    }

    /// Width in real pixels
    pub fn width(&self) -> usize {
        self.albedo.width()
    }

    /// Height in pixels
    pub fn height(&self) -> usize {
        self.albedo.height()
    }

    /// True when no pixels are present
    pub fn is_empty(&self) -> bool {
        self.albedo.is_empty()
    }

    /// Component-wise min/max over every rendered position, seeded with the
    /// eye point.
    ///
    /// The fold runs over the padded width; import replicates each row's
    /// last real pixel into the padding lanes, so the reduction stays exact.
    pub fn scene_bounds(&self, eye: Vec3) -> (Vec3, Vec3) {
        let mut min4 = Vec3x4::splat(eye);
        let mut max4 = Vec3x4::splat(eye);
        for y in 0..self.positions.height() {
            for qx in 0..self.positions.quads_per_row() {
                let p = self.positions.quad(qx, y);
                min4.x = min4.x.min(p.x);
                min4.y = min4.y.min(p.y);
                min4.z = min4.z.min(p.z);
                max4.x = max4.x.max(p.x);
                max4.y = max4.y.max(p.y);
                max4.z = max4.z.max(p.z);
            }
        }
        let mut min = min4.lane(0);
        let mut max = max4.lane(0);
        for lane in 1..4 {
            min = min.min(min4.lane(lane));
            max = max.max(max4.lane(lane));
        }
        (min, max)
    }
}
