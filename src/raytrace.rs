//! Packet ray tracing over a triangle soup
//!
//! A median-split AABB BVH built lazily from triangles supplied by the host,
//! traced 4 rays at a time. Traversal keeps all 4 lanes live with masked
//! arithmetic; a lane records a hit id and distance whenever a triangle
//! intersection beats its current best.
//!
//! Author: Moroya Sakamoto

use crate::simd::Vec3x4;
use glam::Vec3;
use wide::f32x4;
use wide::{CmpGe, CmpGt, CmpLe, CmpLt};

const MAX_TRIS_PER_LEAF: usize = 4;
const DET_EPSILON: f32 = 1e-9;

/// One triangle with its host-assigned id and payload color
#[derive(Debug, Clone, Copy)]
struct Triangle {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    id: i32,
    /// Payload carried per triangle; hard-shadow queries ignore it
    #[allow(dead_code)]
    color: Vec3,
}

impl Triangle {
    fn bounds(&self) -> (Vec3, Vec3) {
        (
            self.v0.min(self.v1).min(self.v2),
            self.v0.max(self.v1).max(self.v2),
        )
    }

    fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Internal { left: u32, right: u32, axis: usize },
    Leaf { first: u32, count: u32 },
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    min: Vec3,
    max: Vec3,
    kind: NodeKind,
}

/// Result of tracing 4 rays: per-lane hit id (negative = miss) and distance
#[derive(Debug, Clone, Copy)]
pub struct TraceResults {
    /// Hit triangle id per lane; `< 0` means the lane missed
    pub hit_ids: [i32; 4],
    /// Hit distance per lane; meaningful only where `hit_ids[lane] >= 0`
    pub hit_distance: f32x4,
}

/// Acceleration structure over a triangle list
///
/// Triangles are added up front; the BVH itself is built once on demand via
/// [`build_acceleration_structure`](Self::build_acceleration_structure).
#[derive(Debug, Default)]
pub struct RayTraceEnvironment {
    triangles: Vec<Triangle>,
    nodes: Vec<BvhNode>,
    built: bool,
}

struct TriInfo {
    index: usize,
    centroid: Vec3,
    min: Vec3,
    max: Vec3,
}

impl RayTraceEnvironment {
    /// Create an environment with no triangles
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one triangle. Invalidates any previously built structure.
    pub fn add_triangle(&mut self, id: i32, v0: Vec3, v1: Vec3, v2: Vec3, color: Vec3) {
        self.triangles.push(Triangle {
            v0,
            v1,
            v2,
            id,
            color,
        });
        self.built = false;
    }

    /// Number of triangles added
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// True once the acceleration structure is ready to trace
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Build the BVH. Idempotent; a no-op when already built.
    pub fn build_acceleration_structure(&mut self) {
        if self.built {
            return;
        }
        self.nodes.clear();
        if self.triangles.is_empty() {
            self.built = true;
            return;
        }

        let mut infos: Vec<TriInfo> = self
            .triangles
            .iter()
            .enumerate()
            .map(|(index, tri)| {
                let (min, max) = tri.bounds();
                TriInfo {
                    index,
                    centroid: tri.centroid(),
                    min,
                    max,
                }
            })
            .collect();

        let mut ordered = Vec::with_capacity(self.triangles.len());
        build_node(&mut infos, &self.triangles, &mut ordered, &mut self.nodes);
        self.triangles = ordered;
        self.built = true;
        log::debug!(
            "bvh built: {} triangles, {} nodes",
            self.triangles.len(),
            self.nodes.len()
        );
    }

    /// Trace 4 rays against the structure over the interval `[t_min, t_max]`.
    ///
    /// Directions need not be normalized, but distances are reported in
    /// units of the direction length, so callers normalize in practice.
    pub fn trace4(
        &self,
        origins: Vec3x4,
        directions: Vec3x4,
        t_min: f32,
        t_max: f32,
    ) -> TraceResults {
        let mut result = TraceResults {
            hit_ids: [-1; 4],
            hit_distance: f32x4::splat(t_max),
        };
        if self.nodes.is_empty() {
            return result;
        }

        let inv_dir = Vec3x4 {
            x: f32x4::ONE / directions.x,
            y: f32x4::ONE / directions.y,
            z: f32x4::ONE / directions.z,
        };
        // Sign of lane 0 picks the near child first; a heuristic, not a
        // correctness requirement since lanes may disagree
        let dir0 = directions.lane(0);
        let t_min4 = f32x4::splat(t_min);

        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.push(0);
        while let Some(node_index) = stack.pop() {
            let node = self.nodes[node_index as usize];
            if !self.hits_bounds(&node, origins, inv_dir, t_min4, result.hit_distance) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { first, count } => {
                    for tri in &self.triangles[first as usize..(first + count) as usize] {
                        intersect_triangle(tri, origins, directions, t_min4, &mut result);
                    }
                }
                NodeKind::Internal { left, right, axis } => {
                    if dir0[axis] < 0.0 {
                        stack.push(left);
                        stack.push(right);
                    } else {
                        stack.push(right);
                        stack.push(left);
                    }
                }
            }
        }
        result
    }

    /// Slab test: true if any lane's ray overlaps the node bounds within its
    /// current best interval
    #[inline]
    fn hits_bounds(
        &self,
        node: &BvhNode,
        origins: Vec3x4,
        inv_dir: Vec3x4,
        t_min: f32x4,
        t_best: f32x4,
    ) -> bool {
        let lo = Vec3x4::splat(node.min);
        let hi = Vec3x4::splat(node.max);
        let tx0 = (lo.x - origins.x) * inv_dir.x;
        let tx1 = (hi.x - origins.x) * inv_dir.x;
        let ty0 = (lo.y - origins.y) * inv_dir.y;
        let ty1 = (hi.y - origins.y) * inv_dir.y;
        let tz0 = (lo.z - origins.z) * inv_dir.z;
        let tz1 = (hi.z - origins.z) * inv_dir.z;

        let t_enter = tx0
            .min(tx1)
            .max(ty0.min(ty1))
            .max(tz0.min(tz1))
            .max(t_min);
        let t_exit = tx0
            .max(tx1)
            .min(ty0.max(ty1))
            .min(tz0.max(tz1))
            .min(t_best);
        t_enter.cmp_le(t_exit).any()
    }
}

/// 4-wide Moller-Trumbore against one triangle; updates lanes that hit closer
#[inline]
fn intersect_triangle(
    tri: &Triangle,
    origins: Vec3x4,
    directions: Vec3x4,
    t_min: f32x4,
    result: &mut TraceResults,
) {
    let v0 = Vec3x4::splat(tri.v0);
    let e1 = Vec3x4::splat(tri.v1 - tri.v0);
    let e2 = Vec3x4::splat(tri.v2 - tri.v0);

    let p = directions.cross(e2);
    let det = e1.dot(p);
    let inv_det = f32x4::ONE / det;

    let tvec = origins - v0;
    let u = tvec.dot(p) * inv_det;
    let q = tvec.cross(e1);
    let v = directions.dot(q) * inv_det;
    let t = e2.dot(q) * inv_det;

    let hit = det.abs().cmp_gt(f32x4::splat(DET_EPSILON))
        & u.cmp_ge(f32x4::ZERO)
        & v.cmp_ge(f32x4::ZERO)
        & (u + v).cmp_le(f32x4::ONE)
        & t.cmp_ge(t_min)
        & t.cmp_lt(result.hit_distance);
    if !hit.any() {
        return;
    }

    result.hit_distance = hit.blend(t, result.hit_distance);
    let lanes = hit.to_array();
    for (lane, &m) in lanes.iter().enumerate() {
        if m != 0.0 {
            result.hit_ids[lane] = tri.id;
        }
    }
}

/// Recursively build the node for `infos`, appending reordered triangles,
/// and return its index
fn build_node(
    infos: &mut [TriInfo],
    source: &[Triangle],
    ordered: &mut Vec<Triangle>,
    nodes: &mut Vec<BvhNode>,
) -> u32 {
    let mut bounds_min = Vec3::splat(f32::INFINITY);
    let mut bounds_max = Vec3::splat(f32::NEG_INFINITY);
    let mut centroid_min = Vec3::splat(f32::INFINITY);
    let mut centroid_max = Vec3::splat(f32::NEG_INFINITY);
    for info in infos.iter() {
        bounds_min = bounds_min.min(info.min);
        bounds_max = bounds_max.max(info.max);
        centroid_min = centroid_min.min(info.centroid);
        centroid_max = centroid_max.max(info.centroid);
    }

    let extent = centroid_max - centroid_min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    // Leaf when small, or when centroids collapse to a point
    if infos.len() <= MAX_TRIS_PER_LEAF || extent[axis] <= 0.0 {
        let first = ordered.len() as u32;
        ordered.extend(infos.iter().map(|info| source[info.index]));
        nodes.push(BvhNode {
            min: bounds_min,
            max: bounds_max,
            kind: NodeKind::Leaf {
                first,
                count: infos.len() as u32,
            },
        });
        return (nodes.len() - 1) as u32;
    }

    let mid = infos.len() / 2;
    infos.select_nth_unstable_by(mid, |a, b| {
        a.centroid[axis].total_cmp(&b.centroid[axis])
    });

    // Reserve the parent slot before recursing so children land after it
    let node_index = nodes.len() as u32;
    nodes.push(BvhNode {
        min: bounds_min,
        max: bounds_max,
        kind: NodeKind::Leaf { first: 0, count: 0 },
    });

    let (left_infos, right_infos) = infos.split_at_mut(mid);
    let left = build_node(left_infos, source, ordered, nodes);
    let right = build_node(right_infos, source, ordered, nodes);
    nodes[node_index as usize].kind = NodeKind::Internal { left, right, axis };
    node_index
}
