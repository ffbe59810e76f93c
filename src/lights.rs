//! Light descriptions and 4-wide unshadowed radiance evaluation
//!
//! Each light evaluates its unshadowed contribution at 4 surface points at
//! once. Evaluation returns exactly zero wherever the light cannot reach
//! geometrically (behind a directional light's plane, outside a spot cone),
//! which lets the shadow sampler skip ray casts for dark pixel groups.
//!
//! Author: Moroya Sakamoto

use crate::simd::Vec3x4;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use wide::f32x4;

/// Distance a directional light's anchor position is pushed back along its
/// emission direction, so shadow rays toward the anchor run against the light
const DIRECTIONAL_ANCHOR_DISTANCE: f32 = 1.0e5;

/// Distance attenuation parameters: `1 / (constant + linear*d + quadratic*d^2)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Attenuation {
    /// Constant denominator term
    pub constant: f32,
    /// Linear denominator term (per world unit)
    pub linear: f32,
    /// Quadratic denominator term (per squared world unit)
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Attenuation {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        }
    }
}

/// Spot cone parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpotCone {
    /// Cosine of the inner (full-intensity) half-angle
    pub cos_inner: f32,
    /// Cosine of the outer (cutoff) half-angle
    pub cos_outer: f32,
    /// Falloff exponent between the inner and outer cones
    pub exponent: f32,
}

/// What kind of emitter a light is, with its per-kind parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LightKind {
    /// Parallel light; `direction` is the way the light travels
    Directional {
        /// Normalized emission direction
        direction: Vec3,
    },
    /// Omnidirectional emitter with distance attenuation
    Point {
        /// Distance falloff
        attenuation: Attenuation,
    },
    /// Cone-restricted emitter
    Spot {
        /// Normalized cone axis (the way the light travels)
        direction: Vec3,
        /// Cone shape
        cone: SpotCone,
        /// Distance falloff
        attenuation: Attenuation,
    },
    /// Unconditional fill term; reaches every surface
    Ambient,
}

/// A light as supplied by the host, keyed by a stable object id
///
/// The id survives light-list updates, so refinement state can be carried
/// across edits that keep a light alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightDescription {
    /// Stable editor object id
    pub object_id: u64,
    /// World-space position (directional lights use a far anchor)
    pub position: Vec3,
    /// Linear RGB intensity, non-negative
    pub color: Vec3,
    /// Kind and per-kind parameters
    pub kind: LightKind,
}

impl LightDescription {
    /// A directional light. The anchor position is synthesized far along
    /// `-direction` so the uniform trace-toward-position shadow kernel sends
    /// rays against the light's travel.
    pub fn directional(object_id: u64, direction: Vec3, color: Vec3) -> Self {
        let direction = direction.normalize_or_zero();
        LightDescription {
            object_id,
            position: -direction * DIRECTIONAL_ANCHOR_DISTANCE,
            color,
            kind: LightKind::Directional { direction },
        }
    }

    /// A point light at `position`
    pub fn point(object_id: u64, position: Vec3, color: Vec3, attenuation: Attenuation) -> Self {
        LightDescription {
            object_id,
            position,
            color,
            kind: LightKind::Point { attenuation },
        }
    }

    /// A spot light at `position` shining along `direction`
    pub fn spot(
        object_id: u64,
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        cone: SpotCone,
        attenuation: Attenuation,
    ) -> Self {
        LightDescription {
            object_id,
            position,
            color,
            kind: LightKind::Spot {
                direction: direction.normalize_or_zero(),
                cone,
                attenuation,
            },
        }
    }

    /// An ambient fill light anchored at `position`
    pub fn ambient(object_id: u64, position: Vec3, color: Vec3) -> Self {
        LightDescription {
            object_id,
            position,
            color,
            kind: LightKind::Ambient,
        }
    }

    /// True for directional lights (their eye distance is pinned to zero)
    #[inline]
    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. })
    }

    /// Evaluate unshadowed radiance at 4 surface points at once.
    ///
    /// Returns per-pixel radiance as if no occluders existed; exactly zero
    /// where the light cannot reach geometrically.
    pub fn compute_at(&self, positions: Vec3x4, normals: Vec3x4) -> Vec3x4 {
        let color = Vec3x4::splat(self.color);
        match self.kind {
            LightKind::Directional { direction } => {
                let ndotl = normals.dot(Vec3x4::splat(-direction)).max(f32x4::ZERO);
                color * ndotl
            }
            LightKind::Point { attenuation } => {
                let to_light = Vec3x4::splat(self.position) - positions;
                let dist = to_light.length();
                let dir = to_light.normalize();
                let ndotl = normals.dot(dir).max(f32x4::ZERO);
                color * (ndotl * attenuation_factor(attenuation, dist))
            }
            LightKind::Spot {
                direction,
                cone,
                attenuation,
            } => {
                let to_light = Vec3x4::splat(self.position) - positions;
                let dist = to_light.length();
                let dir = to_light.normalize();
                let ndotl = normals.dot(dir).max(f32x4::ZERO);
                // Angle between the cone axis and the light-to-surface direction
                let cos_angle = Vec3x4::splat(direction).dot(-dir);
                let falloff = cone_falloff(cone, cos_angle);
                color * (ndotl * falloff * attenuation_factor(attenuation, dist))
            }
            LightKind::Ambient => color,
        }
    }
}

#[inline]
fn attenuation_factor(a: Attenuation, dist: f32x4) -> f32x4 {
    f32x4::ONE
        / (f32x4::splat(a.constant)
            + f32x4::splat(a.linear) * dist
            + f32x4::splat(a.quadratic) * dist * dist)
}

/// Angular falloff: 1 inside the inner cone, 0 outside the outer cone,
/// `t^exponent` between
#[inline]
fn cone_falloff(cone: SpotCone, cos_angle: f32x4) -> f32x4 {
    let span = (cone.cos_inner - cone.cos_outer).max(1e-6);
    let t = ((cos_angle - f32x4::splat(cone.cos_outer)) / f32x4::splat(span))
        .max(f32x4::ZERO)
        .min(f32x4::ONE);
    let t = t.to_array();
    f32x4::new([
        t[0].powf(cone.exponent),
        t[1].powf(cone.exponent),
        t[2].powf(cone.exponent),
        t[3].powf(cone.exponent),
    ])
}
