//! SIMD-friendly RGB image matrix
//!
//! A dense `width x height` grid of three-channel floats laid out so that 4
//! horizontally-adjacent pixels form one SIMD group. Each row stores three
//! channel planes (x, y, z) of `padded_width` floats, with the width padded
//! up to a multiple of 4. Padding lanes replicate the last real pixel of the
//! row so reductions over the padded width stay exact.
//!
//! Author: Moroya Sakamoto

use crate::simd::Vec3x4;
use glam::Vec3;
use wide::f32x4;

/// Dense RGB matrix with 4-pixel SIMD groups
///
/// A zero-sized matrix (`width == 0 || height == 0`) marks "empty" and holds
/// no storage. Assignment is explicit (`Clone`); nothing copies implicitly.
#[derive(Debug, Clone, Default)]
pub struct VectorMatrix {
    width: usize,
    height: usize,
    padded_width: usize,
    data: Vec<f32>,
}

impl VectorMatrix {
    /// Create a zeroed matrix
    pub fn new(width: usize, height: usize) -> Self {
        let padded_width = if width == 0 { 0 } else { (width + 3) & !3 };
        VectorMatrix {
            width,
            height,
            padded_width,
            data: vec![0.0; padded_width * 3 * height],
        }
    }

    /// Create an empty (zero-sized) matrix
    pub fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Resize the matrix, zeroing contents. `set_size(0, 0)` frees the
    /// storage and marks the matrix empty. Resizing to the current
    /// dimensions keeps the contents.
    pub fn set_size(&mut self, width: usize, height: usize) {
        if self.width == width && self.height == height {
            return;
        }
        *self = Self::new(width, height);
    }

    /// Import from RGBA float pixel data, dropping alpha.
    ///
    /// `data` holds `width * height` pixels of 4 floats each, row-major.
    /// Padding lanes replicate the last real pixel of their row.
    pub fn from_rgba_f32(width: usize, height: usize, data: &[f32]) -> Self {
        debug_assert!(data.len() >= width * height * 4);
        let mut m = Self::new(width, height);
        if m.is_empty() {
            return m;
        }
        for y in 0..height {
            let row_base = y * m.padded_width * 3;
            for x in 0..m.padded_width {
                let src_x = x.min(width - 1);
                let src = (y * width + src_x) * 4;
                m.data[row_base + x] = data[src];
                m.data[row_base + m.padded_width + x] = data[src + 1];
                m.data[row_base + 2 * m.padded_width + x] = data[src + 2];
            }
        }
        m
    }

    /// Width in real (unpadded) pixels
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width padded up to a multiple of 4
    #[inline]
    pub fn padded_width(&self) -> usize {
        self.padded_width
    }

    /// Number of 4-pixel SIMD groups per row
    #[inline]
    pub fn quads_per_row(&self) -> usize {
        self.padded_width / 4
    }

    /// True if the matrix holds no pixels
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Floats per row (three channel planes of `padded_width`)
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.padded_width * 3
    }

    /// Scalar accessor for one pixel
    #[inline]
    pub fn element(&self, x: usize, y: usize) -> Vec3 {
        let base = y * self.row_stride();
        Vec3::new(
            self.data[base + x],
            self.data[base + self.padded_width + x],
            self.data[base + 2 * self.padded_width + x],
        )
    }

    /// Load the 4-pixel group starting at pixel `qx * 4` of row `y`
    #[inline]
    pub fn quad(&self, qx: usize, y: usize) -> Vec3x4 {
        quad_in_row(self.row(y), self.padded_width, qx)
    }

    /// Store a 4-pixel group
    #[inline]
    pub fn set_quad(&mut self, qx: usize, y: usize, v: Vec3x4) {
        let pw = self.padded_width;
        store_quad_in_row(self.row_mut(y), pw, qx, v);
    }

    /// One row as a flat `[x-plane, y-plane, z-plane]` slice
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        let stride = self.row_stride();
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Mutable row access
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let stride = self.row_stride();
        &mut self.data[y * stride..(y + 1) * stride]
    }

    /// Iterate all rows as independent mutable slices (for parallel dispatch)
    pub fn rows_mut(&mut self) -> std::slice::ChunksMut<'_, f32> {
        let stride = self.row_stride().max(1);
        self.data.chunks_mut(stride)
    }

    /// Elementwise `self[p] += other[p]` over the padded grid
    pub fn add_assign_matrix(&mut self, other: &VectorMatrix) {
        debug_assert_eq!(self.width, other.width);
        debug_assert_eq!(self.height, other.height);
        for (d, s) in self.data.iter_mut().zip(other.data.iter()) {
            *d += *s;
        }
    }

    /// Elementwise `self[p] *= other[p]` over the padded grid
    pub fn mul_assign_matrix(&mut self, other: &VectorMatrix) {
        debug_assert_eq!(self.width, other.width);
        debug_assert_eq!(self.height, other.height);
        for (d, s) in self.data.iter_mut().zip(other.data.iter()) {
            *d *= *s;
        }
    }
}

/// Scale every pixel by a constant color
impl std::ops::MulAssign<Vec3> for VectorMatrix {
    fn mul_assign(&mut self, rhs: Vec3) {
        let pw = self.padded_width;
        let stride = self.row_stride().max(1);
        for row in self.data.chunks_mut(stride) {
            for v in &mut row[..pw] {
                *v *= rhs.x;
            }
            for v in &mut row[pw..2 * pw] {
                *v *= rhs.y;
            }
            for v in &mut row[2 * pw..] {
                *v *= rhs.z;
            }
        }
    }
}

/// Load a 4-pixel group from a row slice (three channel planes of `padded_width`)
#[inline]
pub fn quad_in_row(row: &[f32], padded_width: usize, qx: usize) -> Vec3x4 {
    let o = qx * 4;
    Vec3x4 {
        x: f32x4::new([row[o], row[o + 1], row[o + 2], row[o + 3]]),
        y: f32x4::new([
            row[padded_width + o],
            row[padded_width + o + 1],
            row[padded_width + o + 2],
            row[padded_width + o + 3],
        ]),
        z: f32x4::new([
            row[2 * padded_width + o],
            row[2 * padded_width + o + 1],
            row[2 * padded_width + o + 2],
            row[2 * padded_width + o + 3],
        ]),
    }
}

/// Store a 4-pixel group into a row slice
#[inline]
pub fn store_quad_in_row(row: &mut [f32], padded_width: usize, qx: usize, v: Vec3x4) {
    let o = qx * 4;
    let (x, y, z) = v.to_array();
    row[o..o + 4].copy_from_slice(&x);
    row[padded_width + o..padded_width + o + 4].copy_from_slice(&y);
    row[2 * padded_width + o..2 * padded_width + o + 4].copy_from_slice(&z);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_gradient(width: usize, height: usize) -> Vec<f32> {
        let mut data = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as f32, y as f32, 0.5, 1.0]);
            }
        }
        data
    }

    #[test]
    fn test_padded_width_rounds_up() {
        assert_eq!(VectorMatrix::new(5, 3).padded_width(), 8);
        assert_eq!(VectorMatrix::new(8, 3).padded_width(), 8);
        assert_eq!(VectorMatrix::new(0, 0).padded_width(), 0);
    }

    #[test]
    fn test_import_drops_alpha() {
        let m = VectorMatrix::from_rgba_f32(4, 2, &rgba_gradient(4, 2));
        assert_eq!(m.element(2, 1), Vec3::new(2.0, 1.0, 0.5));
    }

    #[test]
    fn test_import_replicates_padding() {
        let m = VectorMatrix::from_rgba_f32(5, 1, &rgba_gradient(5, 1));
        assert_eq!(m.padded_width(), 8);
        // Lanes 5..8 replicate pixel 4
        let last_quad = m.quad(1, 0);
        let (x, _, _) = last_quad.to_array();
        assert_eq!(x, [4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_quad_round_trip() {
        let mut m = VectorMatrix::new(8, 2);
        let v = Vec3x4::new(
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
        );
        m.set_quad(1, 1, v);
        assert_eq!(m.element(4, 1), Vec3::new(1.0, 5.0, 9.0));
        assert_eq!(m.element(7, 1), Vec3::new(4.0, 8.0, 12.0));
    }

    #[test]
    fn test_set_size_empty_frees() {
        let mut m = VectorMatrix::new(8, 8);
        assert!(!m.is_empty());
        m.set_size(0, 0);
        assert!(m.is_empty());
        assert_eq!(m.row_stride(), 0);
    }

    #[test]
    fn test_set_size_same_keeps_contents() {
        let mut m = VectorMatrix::new(4, 1);
        m.set_quad(0, 0, Vec3x4::splat(Vec3::ONE));
        m.set_size(4, 1);
        assert_eq!(m.element(0, 0), Vec3::ONE);
        m.set_size(4, 2);
        assert_eq!(m.element(0, 0), Vec3::ZERO);
    }

    #[test]
    fn test_mul_assign_color() {
        let mut m = VectorMatrix::from_rgba_f32(4, 1, &rgba_gradient(4, 1));
        m *= Vec3::new(2.0, 0.0, 1.0);
        assert_eq!(m.element(3, 0), Vec3::new(6.0, 0.0, 0.5));
    }

    #[test]
    fn test_elementwise_matrix_ops() {
        let mut a = VectorMatrix::from_rgba_f32(4, 1, &rgba_gradient(4, 1));
        let b = a.clone();
        a.add_assign_matrix(&b);
        assert_eq!(a.element(2, 0), Vec3::new(4.0, 0.0, 1.0));
        a.mul_assign_matrix(&b);
        assert_eq!(a.element(2, 0), Vec3::new(8.0, 0.0, 0.5));
    }
}
