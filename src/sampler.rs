//! Shadow sampler: one refinement pass for one light
//!
//! A pass traces the lines its refinement stage newly adds (per the
//! progressive schedule), 4 pixels at a time. Eligible rows are striped
//! across 4 parallel tasks; each task writes disjoint rows of the light's
//! contribution image and produces one scalar brightness estimate, which the
//! driver folds into the light's running total.
//!
//! Per pixel group: evaluate the light's unshadowed radiance, skip fully
//! dark groups, trace 4 shadow rays toward the light with a small origin
//! bias, zero shadowed lanes, store the pre-albedo result, and accumulate an
//! albedo-weighted, threshold-suppressed copy into the brightness estimate.
//! The threshold keeps faraway lights from being judged interesting.
//!
//! Author: Moroya Sakamoto

use crate::gbuffer::GBufferSet;
use crate::lights::LightDescription;
use crate::matrix::store_quad_in_row;
use crate::raytrace::RayTraceEnvironment;
use crate::registry::{IncrementalLightInfo, IncrementalState};
use crate::schedule::{LineSchedule, NUM_STAGES};
use crate::simd::Vec3x4;
use rayon::prelude::*;
use wide::f32x4;
use wide::CmpGt;

/// Shadow-ray origin offset along the ray, avoiding self-intersection
const SHADOW_BIAS: f32 = 0.02;
/// Far end of the shadow-ray hit interval
const TRACE_FAR: f32 = 1.0e9;
/// Channels at or below this brightness are ignored by the interest estimate
const DISPLAY_THRESHOLD: f32 = 0.1 / 1024.0;
/// Number of parallel tasks a pass is striped across
const NUM_TASKS: usize = 4;

/// Run one refinement pass for `light`, updating its incremental info.
///
/// The environment's acceleration structure must already be built. The
/// contribution image is sized to the G-buffer (contents persist across
/// passes at stable dimensions); the light's state, stage, running total,
/// and recency tick advance according to the pass outcome.
pub fn calculate_for_light(
    env: &RayTraceEnvironment,
    schedule: &LineSchedule,
    gbuffers: &GBufferSet,
    light: &LightDescription,
    info: &mut IncrementalLightInfo,
    current_tick: u64,
) {
    let width = gbuffers.width();
    let height = gbuffers.height();
    info.contribution_image.set_size(width, height);

    // Which lines this pass adds
    let prior_stage = (info.state == IncrementalState::PartialResults).then_some(info.partial_stage);
    let new_stage = prior_stage.map_or(0, |prior| prior + 1);
    let calc_mask = schedule.calc_mask(new_stage, prior_stage);

    let padded_width = info.contribution_image.padded_width();
    let task_totals: Vec<f32> = {
        // Stripe the eligible rows across the tasks by work-line index
        let mut buckets: Vec<Vec<(usize, &mut [f32])>> =
            (0..NUM_TASKS).map(|_| Vec::new()).collect();
        let mut work_line = 0usize;
        for (y, row) in info.contribution_image.rows_mut().enumerate() {
            let line_bit = 1u32 << (y & (NUM_STAGES - 1));
            if calc_mask & line_bit != 0 {
                buckets[work_line & (NUM_TASKS - 1)].push((y, row));
                work_line += 1;
            }
        }
        buckets
            .into_par_iter()
            .map(|rows| light_task(rows, env, gbuffers, light, padded_width))
            .collect()
    };
    let pass_total: f32 = task_totals.iter().sum();

    // The running total covers every line evaluated so far in this
    // refinement sequence, so sparse later passes cannot erase a bright
    // light's standing
    if prior_stage.is_some() {
        info.total_contribution += pass_total;
    } else {
        info.total_contribution = pass_total;
    }

    if info.total_contribution == 0.0 {
        info.contribution_image.set_size(0, 0);
    } else {
        info.last_nonzero_tick = current_tick;
    }
    info.partial_stage = new_stage;
    info.state = if new_stage == NUM_STAGES - 1 {
        IncrementalState::HaveFullResults
    } else {
        IncrementalState::PartialResults
    };
}

/// Trace and accumulate one task's stripe of rows; returns the sum over the
/// four SIMD lanes of the magnitude of the accumulated albedo-weighted light
fn light_task(
    rows: Vec<(usize, &mut [f32])>,
    env: &RayTraceEnvironment,
    gbuffers: &GBufferSet,
    light: &LightDescription,
    padded_width: usize,
) -> f32 {
    let quads = padded_width / 4;
    let threshold = f32x4::splat(DISPLAY_THRESHOLD);
    let light_pos = Vec3x4::splat(light.position);
    let bias = f32x4::splat(SHADOW_BIAS);
    let mut total = Vec3x4::zero();

    for (y, row) in rows {
        let mut line_total = Vec3x4::zero();
        for qx in 0..quads {
            let positions = gbuffers.positions.quad(qx, y);
            let normals = gbuffers.normals.quad(qx, y);
            let unshadowed = light.compute_at(positions, normals);
            if unshadowed.all_zero() {
                store_quad_in_row(row, padded_width, qx, unshadowed);
                continue;
            }

            // Shadow rays toward the light, nudged off the surface
            let to_light = light_pos - positions;
            let ray_len = to_light.length();
            let dir = to_light.normalize();
            let origins = positions + dir * bias;
            let trace = env.trace4(origins, dir, 0.0, TRACE_FAR);

            let hit_dist = trace.hit_distance.to_array();
            let len = ray_len.to_array();
            let (mut r, mut g, mut b) = unshadowed.to_array();
            for lane in 0..4 {
                if trace.hit_ids[lane] >= 0 && hit_dist[lane] < len[lane] {
                    r[lane] = 0.0;
                    g[lane] = 0.0;
                    b[lane] = 0.0;
                }
            }
            let visible = Vec3x4::new(r, g, b);
            store_quad_in_row(row, padded_width, qx, visible);

            // Albedo-weighted copy with dim channels suppressed
            let mut display = visible * gbuffers.albedo.quad(qx, y);
            display.x = display.x.cmp_gt(threshold).blend(display.x, f32x4::ZERO);
            display.y = display.y.cmp_gt(threshold).blend(display.y, f32x4::ZERO);
            display.z = display.z.cmp_gt(threshold).blend(display.z, f32x4::ZERO);
            line_total += display;
        }
        total += line_total;
    }

    total.length().to_array().iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbuffer::RgbaFloatImage;
    use crate::lights::Attenuation;
    use glam::Vec3;

    fn flat_gbuffers(width: usize, height: usize) -> GBufferSet {
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut albedo = Vec::new();
        for y in 0..height {
            for x in 0..width {
                positions.extend_from_slice(&[x as f32, y as f32, 0.0, 1.0]);
                normals.extend_from_slice(&[0.0, 0.0, 1.0, 1.0]);
                albedo.extend_from_slice(&[1.0, 1.0, 1.0, 1.0]);
            }
        }
        GBufferSet::from_images(
            &RgbaFloatImage::new(width, height, positions),
            &RgbaFloatImage::new(width, height, normals),
            &RgbaFloatImage::new(width, height, albedo),
        )
        .unwrap()
    }

    fn open_env() -> RayTraceEnvironment {
        // One distant triangle so the structure is non-trivial but occludes
        // nothing over the G-buffer
        let mut env = RayTraceEnvironment::new();
        env.add_triangle(
            0,
            Vec3::new(500.0, 0.0, -1.0),
            Vec3::new(501.0, 0.0, -1.0),
            Vec3::new(500.0, 1.0, -1.0),
            Vec3::splat(0.5),
        );
        env.build_acceleration_structure();
        env
    }

    fn occluded_env() -> RayTraceEnvironment {
        // A huge quad just above the surface blocks everything
        let mut env = RayTraceEnvironment::new();
        let h = 1000.0;
        let z = 1.0;
        let a = Vec3::new(-h, -h, z);
        let b = Vec3::new(h, -h, z);
        let c = Vec3::new(h, h, z);
        let d = Vec3::new(-h, h, z);
        env.add_triangle(0, a, b, c, Vec3::splat(0.5));
        env.add_triangle(3, a, c, d, Vec3::splat(0.5));
        env.build_acceleration_structure();
        env
    }

    fn fresh_info() -> IncrementalLightInfo {
        IncrementalLightInfo {
            object_id: 99,
            state: IncrementalState::New,
            partial_stage: 0,
            contribution_image: crate::matrix::VectorMatrix::empty(),
            total_contribution: 0.0,
            distance_to_eye: 0.0,
            last_nonzero_tick: 0,
        }
    }

    #[test]
    fn test_first_pass_computes_line_zero() {
        let gbuffers = flat_gbuffers(8, 4);
        let env = open_env();
        let schedule = LineSchedule::new();
        let light =
            LightDescription::directional(1, Vec3::NEG_Z, Vec3::new(1.0, 0.0, 0.0));
        let mut info = fresh_info();

        calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, 5);

        assert_eq!(info.state, IncrementalState::PartialResults);
        assert_eq!(info.partial_stage, 0);
        assert!(info.total_contribution > 0.0);
        assert_eq!(info.last_nonzero_tick, 5);
        // Row 0 holds the pre-albedo radiance; row 1 is untouched (zero)
        assert_eq!(
            info.contribution_image.element(3, 0),
            Vec3::new(1.0, 0.0, 0.0)
        );
        assert_eq!(info.contribution_image.element(3, 1), Vec3::ZERO);
    }

    #[test]
    fn test_refines_to_full_and_total_persists() {
        let gbuffers = flat_gbuffers(8, 4);
        let env = open_env();
        let schedule = LineSchedule::new();
        let light =
            LightDescription::directional(1, Vec3::NEG_Z, Vec3::new(1.0, 0.0, 0.0));
        let mut info = fresh_info();

        for tick in 0..NUM_STAGES as u64 {
            calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, tick);
        }
        assert_eq!(info.state, IncrementalState::HaveFullResults);
        assert_eq!(info.partial_stage, NUM_STAGES - 1);
        // Sparse later passes add no rows on a short image but must not
        // erase the light's standing
        assert!(info.total_contribution > 0.0);
        // Every real row is now computed
        for y in 0..4 {
            assert_eq!(
                info.contribution_image.element(0, y),
                Vec3::new(1.0, 0.0, 0.0),
                "row {} should hold full radiance",
                y
            );
        }
    }

    #[test]
    fn test_fully_occluded_light_frees_image() {
        let gbuffers = flat_gbuffers(8, 4);
        let env = occluded_env();
        let schedule = LineSchedule::new();
        let light = LightDescription::point(
            2,
            Vec3::new(4.0, 2.0, 50.0),
            Vec3::splat(100.0),
            Attenuation::default(),
        );
        let mut info = fresh_info();

        calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, 9);

        assert_eq!(info.total_contribution, 0.0);
        assert!(info.contribution_image.is_empty());
        assert_eq!(info.last_nonzero_tick, 0, "tick must not advance on zero");
        assert_eq!(info.state, IncrementalState::PartialResults);
    }

    #[test]
    fn test_faraway_light_suppressed_by_threshold() {
        let gbuffers = flat_gbuffers(8, 4);
        let env = open_env();
        let schedule = LineSchedule::new();
        // Inverse-square light so far away its contribution lands under the
        // display threshold
        let light = LightDescription::point(
            3,
            Vec3::new(0.0, 0.0, 1.0e4),
            Vec3::ONE,
            Attenuation {
                constant: 0.0,
                linear: 0.0,
                quadratic: 1.0,
            },
        );
        let mut info = fresh_info();

        calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, 3);

        assert_eq!(
            info.total_contribution, 0.0,
            "sub-threshold light must not be judged interesting"
        );
        assert!(info.contribution_image.is_empty());
    }

    #[test]
    fn test_partial_stage_masks_advance() {
        let gbuffers = flat_gbuffers(8, 64);
        let env = open_env();
        let schedule = LineSchedule::new();
        let light =
            LightDescription::directional(1, Vec3::NEG_Z, Vec3::new(0.0, 1.0, 0.0));
        let mut info = fresh_info();

        calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, 1);
        // Stage 0 computed rows 0 and 32 only
        assert_eq!(info.contribution_image.element(0, 0).y, 1.0);
        assert_eq!(info.contribution_image.element(0, 32).y, 1.0);
        assert_eq!(info.contribution_image.element(0, 16).y, 0.0);

        calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, 2);
        // Stage 1 added rows 16 and 48, and kept stage 0's rows
        assert_eq!(info.partial_stage, 1);
        assert_eq!(info.contribution_image.element(0, 16).y, 1.0);
        assert_eq!(info.contribution_image.element(0, 48).y, 1.0);
        assert_eq!(info.contribution_image.element(0, 0).y, 1.0);
        assert_eq!(info.contribution_image.element(0, 8).y, 0.0);
    }

    #[test]
    fn test_occluder_casts_hard_shadow_boundary() {
        let gbuffers = flat_gbuffers(8, 1);
        // Occluder quad above x in [0, 3.5] only
        let mut env = RayTraceEnvironment::new();
        let a = Vec3::new(-0.5, -10.0, 5.0);
        let b = Vec3::new(3.5, -10.0, 5.0);
        let c = Vec3::new(3.5, 10.0, 5.0);
        let d = Vec3::new(-0.5, 10.0, 5.0);
        env.add_triangle(0, a, b, c, Vec3::splat(0.5));
        env.add_triangle(3, a, c, d, Vec3::splat(0.5));
        env.build_acceleration_structure();

        let schedule = LineSchedule::new();
        // Directional light straight down
        let light = LightDescription::directional(7, Vec3::NEG_Z, Vec3::ONE);
        let mut info = fresh_info();
        calculate_for_light(&env, &schedule, &gbuffers, &light, &mut info, 1);

        // Pixels under the quad are shadowed; the rest are lit
        for x in 0..4 {
            assert_eq!(
                info.contribution_image.element(x, 0),
                Vec3::ZERO,
                "x = {} should be shadowed",
                x
            );
        }
        for x in 4..8 {
            assert!(
                info.contribution_image.element(x, 0).x > 0.9,
                "x = {} should be lit",
                x
            );
        }
    }
}
