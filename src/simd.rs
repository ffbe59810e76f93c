//! SIMD type definitions for 4-wide evaluation
//!
//! This module provides SIMD-friendly types for processing 4 pixels
//! simultaneously using SSE/NEON instructions. The lighting kernel and the
//! packet ray tracer both operate on horizontal groups of 4 pixels.
//!
//! Author: Moroya Sakamoto

use wide::f32x4;
use wide::CmpEq;

/// 4 3D vectors packed for SIMD processing
///
/// Structure-of-Arrays (SoA) layout for optimal SIMD performance:
/// - x: [x0, x1, x2, x3]
/// - y: [y0, y1, y2, y3]
/// - z: [z0, z1, z2, z3]
#[derive(Clone, Copy, Debug)]
pub struct Vec3x4 {
    /// X components (4-wide)
    pub x: f32x4,
    /// Y components (4-wide)
    pub y: f32x4,
    /// Z components (4-wide)
    pub z: f32x4,
}

impl Vec3x4 {
    /// Create from 4 separate Vec3 values
    #[inline]
    pub fn from_vecs(v: [glam::Vec3; 4]) -> Self {
        Vec3x4 {
            x: f32x4::new([v[0].x, v[1].x, v[2].x, v[3].x]),
            y: f32x4::new([v[0].y, v[1].y, v[2].y, v[3].y]),
            z: f32x4::new([v[0].z, v[1].z, v[2].z, v[3].z]),
        }
    }

    /// Create with all lanes set to the same vector
    #[inline]
    pub fn splat(v: glam::Vec3) -> Self {
        Vec3x4 {
            x: f32x4::splat(v.x),
            y: f32x4::splat(v.y),
            z: f32x4::splat(v.z),
        }
    }

    /// Create from raw x, y, z arrays
    #[inline]
    pub fn new(x: [f32; 4], y: [f32; 4], z: [f32; 4]) -> Self {
        Vec3x4 {
            x: f32x4::new(x),
            y: f32x4::new(y),
            z: f32x4::new(z),
        }
    }

    /// Zero vector for all 4 lanes
    #[inline]
    pub fn zero() -> Self {
        Vec3x4 {
            x: f32x4::ZERO,
            y: f32x4::ZERO,
            z: f32x4::ZERO,
        }
    }

    /// Compute length of all 4 vectors
    #[inline]
    pub fn length(self) -> f32x4 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Compute squared length of all 4 vectors
    #[inline]
    pub fn length_squared(self) -> f32x4 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Normalize all 4 vectors (zero-safe: returns zero vector for zero-length inputs)
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        // Branchless zero guard: clamp denominator to epsilon
        let safe_len = len.max(f32x4::splat(1e-10));
        Vec3x4 {
            x: self.x / safe_len,
            y: self.y / safe_len,
            z: self.z / safe_len,
        }
    }

    /// Dot product with another Vec3x4
    #[inline]
    pub fn dot(self, other: Self) -> f32x4 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product with another Vec3x4
    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Vec3x4 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// True if every channel of every lane is exactly zero
    #[inline]
    pub fn all_zero(self) -> bool {
        let zero = f32x4::ZERO;
        (self.x.cmp_eq(zero) & self.y.cmp_eq(zero) & self.z.cmp_eq(zero)).all()
    }

    /// Extract a single lane as a Vec3
    #[inline]
    pub fn lane(self, i: usize) -> glam::Vec3 {
        let (x, y, z) = self.to_array();
        glam::Vec3::new(x[i], y[i], z[i])
    }

    /// Extract results back to arrays
    #[inline]
    pub fn to_array(self) -> ([f32; 4], [f32; 4], [f32; 4]) {
        (self.x.to_array(), self.y.to_array(), self.z.to_array())
    }
}

// Operator implementations
impl std::ops::Add for Vec3x4 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Vec3x4 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl std::ops::AddAssign for Vec3x4 {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl std::ops::Sub for Vec3x4 {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        Vec3x4 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

/// Component-wise product (used for albedo modulation)
impl std::ops::Mul for Vec3x4 {
    type Output = Self;
    #[inline]
    fn mul(self, other: Self) -> Self {
        Vec3x4 {
            x: self.x * other.x,
            y: self.y * other.y,
            z: self.z * other.z,
        }
    }
}

impl std::ops::Mul<f32x4> for Vec3x4 {
    type Output = Self;
    #[inline]
    fn mul(self, scalar: f32x4) -> Self {
        Vec3x4 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }
}

impl std::ops::Neg for Vec3x4 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Vec3x4 {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}
