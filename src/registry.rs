//! Per-light incremental refinement state
//!
//! Every light the worker has ever seen owns one `IncrementalLightInfo`,
//! keyed by the light's stable object id. Infos persist across light-list
//! updates so a light that disappears and returns resumes from its prior
//! knowledge (total contribution, recency) instead of starting cold.
//!
//! The priority relation decides which light deserves the next refinement
//! pass; it is the heart of the scheduler.
//!
//! Author: Moroya Sakamoto

use crate::lights::LightDescription;
use crate::matrix::VectorMatrix;
use glam::Vec3;

/// Tick value the contribution counter starts from
pub const CONTRIBUTION_COUNTER_START: u64 = 1_000_000;

/// How far a light's refinement has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementalState {
    /// Nothing is known about this light yet
    New,
    /// Results existed but were thrown away
    NoResults,
    /// Some refinement passes are done
    PartialResults,
    /// Every line has been computed
    HaveFullResults,
}

/// Incremental bookkeeping for one light, keyed by its object id
#[derive(Debug)]
pub struct IncrementalLightInfo {
    /// Stable id of the light this info tracks
    pub object_id: u64,
    /// Refinement progress
    pub state: IncrementalState,
    /// Last completed refinement stage (0..=31), meaningful for partial/full
    pub partial_stage: usize,
    /// Per-pixel unshadowed-radiance-times-visibility; empty unless results
    /// exist and the light contributes
    pub contribution_image: VectorMatrix,
    /// Sum over SIMD lanes of the magnitude of accumulated albedo-weighted
    /// light from the most recent pass
    pub total_contribution: f32,
    /// Euclidean distance from the eye; pinned to 0 for directional lights
    pub distance_to_eye: f32,
    /// Tick of the most recent pass that produced nonzero contribution
    pub last_nonzero_tick: u64,
}

impl IncrementalLightInfo {
    fn new(object_id: u64) -> Self {
        IncrementalLightInfo {
            object_id,
            state: IncrementalState::New,
            partial_stage: 0,
            contribution_image: VectorMatrix::empty(),
            total_contribution: 0.0,
            distance_to_eye: 0.0,
            last_nonzero_tick: 0,
        }
    }

    /// Drop any computed image and demote the state (New stays New)
    pub fn discard_results(&mut self) {
        self.contribution_image.set_size(0, 0);
        if self.state != IncrementalState::New {
            self.state = IncrementalState::NoResults;
        }
    }

    /// True while refinement has not reached full results
    #[inline]
    pub fn has_work_to_do(&self) -> bool {
        self.state != IncrementalState::HaveFullResults
    }

    /// A new, never-evaluated light inside the view volume is boosted ahead
    /// of everything else
    pub fn is_high_priority(&self, light_position: Vec3, view_min: Vec3, view_max: Vec3) -> bool {
        self.state == IncrementalState::New
            && light_position.cmpge(view_min).all()
            && light_position.cmple(view_max).all()
    }

    /// Strict "pick the other one next" relation over candidate lights.
    ///
    /// Returns true when `other` deserves the next refinement pass more than
    /// `self` does. Full-result lights are filtered out before this is
    /// consulted.
    pub fn is_lower_priority_than(
        &self,
        my_position: Vec3,
        other: &IncrementalLightInfo,
        other_position: Vec3,
        view_min: Vec3,
        view_max: Vec3,
    ) -> bool {
        use IncrementalState::*;

        let high = self.is_high_priority(my_position, view_min, view_max);
        let other_high = other.is_high_priority(other_position, view_min, view_max);
        if high && !other_high {
            return false;
        }
        if other_high && !high {
            return true;
        }

        match (self.state, other.state) {
            // Both unknown: closest to the eye first
            (New, New) => self.distance_to_eye > other.distance_to_eye,

            // Unknown loses only to a light known to contribute
            (New, NoResults) => other.total_contribution > 0.0,
            (NoResults, New) => self.total_contribution == 0.0,

            // Refinement in flight beats starting something unknown
            (New, PartialResults) => true,
            (PartialResults, New) => false,

            (PartialResults, PartialResults) => {
                if self.total_contribution == 0.0 && other.total_contribution == 0.0 {
                    return other.last_nonzero_tick > self.last_nonzero_tick;
                }
                if other.total_contribution == 0.0 {
                    return false;
                }
                if self.total_contribution == 0.0 {
                    return true;
                }
                // Close in refinement: do the brighter one; far apart: do the
                // least refined one
                if self.partial_stage.abs_diff(other.partial_stage) <= 1 {
                    self.total_contribution < other.total_contribution
                } else {
                    self.partial_stage > other.partial_stage
                }
            }

            (PartialResults, NoResults)
            | (NoResults, PartialResults)
            | (NoResults, NoResults) => {
                if self.total_contribution == 0.0 && other.total_contribution == 0.0 {
                    return other.last_nonzero_tick > self.last_nonzero_tick;
                }
                self.total_contribution < other.total_contribution
            }

            // Full-result lights never compete for work
            (HaveFullResults, _) | (_, HaveFullResults) => false,
        }
    }
}

/// Arena of incremental infos with object-id lookup
///
/// Entries are created on first sighting of an id and retained for the
/// worker's lifetime; indices are stable.
#[derive(Debug, Default)]
pub struct LightRegistry {
    infos: Vec<IncrementalLightInfo>,
}

impl LightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of infos ever created
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True when no light has ever been seen
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Index of the info tracking `object_id`, if one exists
    pub fn index_of(&self, object_id: u64) -> Option<usize> {
        self.infos.iter().position(|info| info.object_id == object_id)
    }

    /// Shared access by arena index
    pub fn get(&self, index: usize) -> &IncrementalLightInfo {
        &self.infos[index]
    }

    /// Mutable access by arena index
    pub fn get_mut(&mut self, index: usize) -> &mut IncrementalLightInfo {
        &mut self.infos[index]
    }

    /// Link a new light list to the registry: every description gets an info
    /// (existing by id, or freshly created as `New`). Returns the arena index
    /// for each light, in list order.
    pub fn link_lights(&mut self, lights: &[LightDescription]) -> Vec<usize> {
        lights
            .iter()
            .map(|light| match self.index_of(light.object_id) {
                Some(index) => index,
                None => {
                    self.infos.push(IncrementalLightInfo::new(light.object_id));
                    self.infos.len() - 1
                }
            })
            .collect()
    }

    /// Discard every info's results (states demote, images free)
    pub fn discard_all(&mut self) {
        for info in &mut self.infos {
            info.discard_results();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IncrementalState::*;

    const NO_BOUNDS: (Vec3, Vec3) = (Vec3::ZERO, Vec3::ZERO);
    const FAR: Vec3 = Vec3::new(1000.0, 1000.0, 1000.0);

    fn info(state: IncrementalState, stage: usize, total: f32, tick: u64) -> IncrementalLightInfo {
        let mut i = IncrementalLightInfo::new(0);
        i.state = state;
        i.partial_stage = stage;
        i.total_contribution = total;
        i.last_nonzero_tick = tick;
        i
    }

    fn lower(a: &IncrementalLightInfo, b: &IncrementalLightInfo) -> bool {
        a.is_lower_priority_than(FAR, b, FAR, NO_BOUNDS.0, NO_BOUNDS.1)
    }

    #[test]
    fn test_high_priority_new_in_view_wins() {
        let inside = info(New, 0, 0.0, 0);
        let bright = info(NoResults, 0, 50.0, 7);
        let view_min = Vec3::splat(-10.0);
        let view_max = Vec3::splat(10.0);
        assert!(bright.is_lower_priority_than(FAR, &inside, Vec3::ZERO, view_min, view_max));
        assert!(!inside.is_lower_priority_than(Vec3::ZERO, &bright, FAR, view_min, view_max));
    }

    #[test]
    fn test_new_vs_new_closest_wins() {
        let mut near = info(New, 0, 0.0, 0);
        near.distance_to_eye = 1.0;
        let mut far = info(New, 0, 0.0, 0);
        far.distance_to_eye = 100.0;
        assert!(lower(&far, &near));
        assert!(!lower(&near, &far));
    }

    #[test]
    fn test_new_vs_no_results() {
        let new = info(New, 0, 0.0, 0);
        let dark = info(NoResults, 0, 0.0, 0);
        let bright = info(NoResults, 0, 5.0, 3);
        // A known contributor regains its results before a speculative light
        assert!(lower(&new, &bright));
        assert!(!lower(&bright, &new));
        // A known non-contributor loses to the unknown
        assert!(lower(&dark, &new));
        assert!(!lower(&new, &dark));
    }

    #[test]
    fn test_partial_beats_new() {
        let new = info(New, 0, 0.0, 0);
        let partial = info(PartialResults, 3, 1.0, 2);
        assert!(lower(&new, &partial));
        assert!(!lower(&partial, &new));
    }

    #[test]
    fn test_partial_pair_brightness_and_stage() {
        let dim = info(PartialResults, 4, 1.0, 2);
        let bright = info(PartialResults, 4, 10.0, 2);
        // Same stage: brighter first
        assert!(lower(&dim, &bright));
        assert!(!lower(&bright, &dim));

        // Far apart in refinement: least refined first even if dimmer
        let coarse_dim = info(PartialResults, 1, 1.0, 2);
        let fine_bright = info(PartialResults, 8, 10.0, 2);
        assert!(lower(&fine_bright, &coarse_dim));
        assert!(!lower(&coarse_dim, &fine_bright));
    }

    #[test]
    fn test_partial_pair_zero_contribution() {
        let stale = info(PartialResults, 2, 0.0, 5);
        let recent = info(PartialResults, 2, 0.0, 9);
        assert!(lower(&stale, &recent));
        assert!(!lower(&recent, &stale));

        let lit = info(PartialResults, 2, 0.5, 9);
        let dark = info(PartialResults, 2, 0.0, 9);
        assert!(lower(&dark, &lit));
        assert!(!lower(&lit, &dark));
    }

    #[test]
    fn test_no_results_pair() {
        let dim = info(NoResults, 0, 1.0, 1);
        let bright = info(NoResults, 0, 3.0, 1);
        assert!(lower(&dim, &bright));

        let stale = info(NoResults, 0, 0.0, 2);
        let recent = info(NoResults, 0, 0.0, 8);
        assert!(lower(&stale, &recent));
    }

    #[test]
    fn test_relation_is_never_mutual() {
        // No pair may be lower-priority in both directions
        let states = [New, NoResults, PartialResults];
        let mut candidates = Vec::new();
        for &state in &states {
            for &total in &[0.0f32, 2.0] {
                for &stage in &[0usize, 1, 8] {
                    for &tick in &[0u64, 5] {
                        let mut i = info(state, stage, total, tick);
                        i.distance_to_eye = stage as f32;
                        candidates.push(i);
                    }
                }
            }
        }
        for a in &candidates {
            for b in &candidates {
                assert!(
                    !(lower(a, b) && lower(b, a)),
                    "mutual lower-priority: {:?} vs {:?}",
                    (a.state, a.total_contribution, a.partial_stage, a.last_nonzero_tick),
                    (b.state, b.total_contribution, b.partial_stage, b.last_nonzero_tick),
                );
            }
        }
    }

    #[test]
    fn test_registry_links_and_persists() {
        let mut registry = LightRegistry::new();
        let l1 = LightDescription::point(10, Vec3::ZERO, Vec3::ONE, Default::default());
        let l2 = LightDescription::point(20, Vec3::ONE, Vec3::ONE, Default::default());

        let links = registry.link_lights(&[l1.clone()]);
        assert_eq!(links, vec![0]);
        registry.get_mut(0).state = HaveFullResults;
        registry.get_mut(0).total_contribution = 4.2;

        // New list with an extra light: the old id keeps its info
        let links = registry.link_lights(&[l2, l1]);
        assert_eq!(links, vec![1, 0]);
        assert_eq!(registry.get(1).state, New);
        assert_eq!(registry.get(0).total_contribution, 4.2);

        registry.discard_all();
        assert_eq!(registry.get(0).state, NoResults);
        assert_eq!(registry.get(1).state, New);
        assert_eq!(registry.get(0).total_contribution, 4.2);
    }

    #[test]
    fn test_discard_frees_image_keeps_new() {
        let mut info = IncrementalLightInfo::new(7);
        info.contribution_image = VectorMatrix::new(8, 8);
        info.state = PartialResults;
        info.discard_results();
        assert!(info.contribution_image.is_empty());
        assert_eq!(info.state, NoResults);

        let mut fresh = IncrementalLightInfo::new(8);
        fresh.discard_results();
        assert_eq!(fresh.state, New);
    }
}
