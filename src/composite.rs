//! Result assembly and display encoding
//!
//! The displayed image is the albedo scaled by a cheap ambient estimate,
//! plus every contributing light's partial image with computed lines
//! replicated into uncomputed ones via the nearest-line table. The result is
//! gamma-encoded into an 8-bit BGRA bitmap for the host's blit path.
//!
//! Author: Moroya Sakamoto

use crate::gbuffer::GBufferSet;
use crate::lights::LightDescription;
use crate::matrix::VectorMatrix;
use crate::registry::{IncrementalLightInfo, IncrementalState};
use crate::schedule::LineSchedule;
use glam::Vec3;

/// Scale applied to the normalized ambient hue
const AMBIENT_SCALE: f32 = 0.05;
/// Per-channel seed that keeps the ambient direction well-defined
const AMBIENT_EPSILON: f32 = 1e-4;

/// An 8-bit BGRA image ready for display
///
/// The alpha byte is always 0; the host's blit path is not alpha-aware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// `width * height * 4` bytes in B, G, R, 0 order
    pub data: Vec<u8>,
}

/// Cheap upper bound for light not yet traced: the contribution-weighted
/// sum of known light colors, normalized to a hue and scaled down.
///
/// Deliberately hue-only: ambient tint follows the scene's lights while its
/// level stays fixed.
pub fn estimated_unshot_ambient(pairs: &[(&LightDescription, &IncrementalLightInfo)]) -> Vec3 {
    let mut sum = Vec3::splat(AMBIENT_EPSILON);
    for &(light, info) in pairs {
        if matches!(
            info.state,
            IncrementalState::PartialResults | IncrementalState::HaveFullResults
        ) {
            sum += light.color * info.total_contribution;
        }
    }
    sum.normalize_or_zero() * AMBIENT_SCALE
}

/// Combine the ambient base with every contributing light's partial image.
///
/// For each display row the source row is the nearest computed line within
/// the same 32-row block at the light's refinement stage, so partially
/// refined lights fill the whole image immediately.
pub fn assemble_result(
    gbuffers: &GBufferSet,
    schedule: &LineSchedule,
    pairs: &[(&LightDescription, &IncrementalLightInfo)],
) -> VectorMatrix {
    let mut result = gbuffers.albedo.clone();
    result *= estimated_unshot_ambient(pairs);

    let height = result.height();
    for &(_, info) in pairs {
        if info.total_contribution <= 0.0
            || !matches!(
                info.state,
                IncrementalState::PartialResults | IncrementalState::HaveFullResults
            )
            || info.contribution_image.is_empty()
        {
            continue;
        }
        for y in 0..height {
            let src_y = schedule
                .display_source_row(info.partial_stage, y)
                .min(height - 1);
            for qx in 0..result.quads_per_row() {
                let lit = gbuffers.albedo.quad(qx, y) * info.contribution_image.quad(qx, src_y);
                result.set_quad(qx, y, result.quad(qx, y) + lit);
            }
        }
    }
    result
}

/// Gamma-encode a linear RGB matrix into a BGRA bitmap
pub fn encode_bgra(matrix: &VectorMatrix) -> Bitmap {
    let width = matrix.width();
    let height = matrix.height();
    let mut data = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let c = matrix.element(x, y);
            data.push(encode_channel(c.z));
            data.push(encode_channel(c.y));
            data.push(encode_channel(c.x));
            data.push(0);
        }
    }
    Bitmap {
        width,
        height,
        data,
    }
}

/// Map one linear channel to its display byte
#[inline]
fn encode_channel(c: f32) -> u8 {
    (255.0 * linear_to_gamma(c.clamp(0.0, 1.0))).round() as u8
}

/// Fixed display transfer curve
#[inline]
pub fn linear_to_gamma(c: f32) -> f32 {
    c.powf(1.0 / 2.2)
}
