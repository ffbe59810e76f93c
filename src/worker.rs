//! Background worker and message router
//!
//! A single worker thread owns all preview state. It drains host messages
//! (which invalidate cached results), performs one refinement unit at a time
//! on the highest-priority light, and streams display bitmaps back at a
//! bounded rate: at most every 10 seconds while refining, immediately when
//! refinement drains, and within about a second of any invalidation.
//!
//! Messages are processed strictly in order, and never in the middle of a
//! work unit. The result bitmap carries the generation counter of the
//! G-buffers it was rendered from so the host can drop stale frames.
//!
//! Author: Moroya Sakamoto

use crate::composite::{assemble_result, encode_bgra, Bitmap};
use crate::gbuffer::{GBufferSet, RgbaFloatImage};
use crate::lights::LightDescription;
use crate::raytrace::RayTraceEnvironment;
use crate::registry::{IncrementalLightInfo, LightRegistry, CONTRIBUTION_COUNTER_START};
use crate::sampler::calculate_for_light;
use crate::schedule::LineSchedule;
use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest time refinement may run without sending a result
const SEND_INTERVAL: Duration = Duration::from_secs(10);
/// Invalidation rewinds the send clock to within a second of the deadline
const FORCED_SEND_REWIND: Duration = Duration::from_secs(9);
/// Payload color recorded for every shadow triangle
const SHADOW_TRIANGLE_COLOR: Vec3 = Vec3::new(0.5, 0.5, 0.5);

/// Messages the host posts to the worker
#[derive(Debug)]
pub enum MessageToPreview {
    /// Terminate the worker thread
    Exit,
    /// Replace the light list
    SetLights {
        /// The complete new light list, in host order
        lights: Vec<LightDescription>,
        /// Current eye position
        eye: Vec3,
    },
    /// Replace the shadow geometry
    SetGeometry {
        /// Flat sequence of vertex triples; empty means "no geometry"
        triangles: Vec<Vec3>,
    },
    /// Replace the deferred G-buffers
    SetGBuffers {
        /// World-space position plane
        positions: RgbaFloatImage,
        /// Surface normal plane
        normals: RgbaFloatImage,
        /// Surface albedo plane
        albedo: RgbaFloatImage,
        /// Current eye position
        eye: Vec3,
        /// Host generation counter, echoed in display results
        generation: u64,
    },
}

/// Messages the worker posts back to the host
#[derive(Debug)]
pub enum MessageFromPreview {
    /// An updated preview image; ownership transfers to the host
    DisplayResult {
        /// Gamma-encoded BGRA image at G-buffer dimensions
        bitmap: Bitmap,
        /// Generation of the G-buffers this image was rendered from
        generation: u64,
    },
}

/// Host-side handle to a spawned preview worker
pub struct PreviewHandle {
    sender: Sender<MessageToPreview>,
    receiver: Receiver<MessageFromPreview>,
    pending_gbuffers: Arc<AtomicI32>,
    thread: thread::JoinHandle<()>,
}

impl PreviewHandle {
    /// Queue for posting messages to the worker
    pub fn sender(&self) -> &Sender<MessageToPreview> {
        &self.sender
    }

    /// Queue the worker posts display results to
    pub fn receiver(&self) -> &Receiver<MessageFromPreview> {
        &self.receiver
    }

    /// Post a G-buffer update, bumping the pending counter the worker
    /// decrements on receipt (lets the host throttle G-buffer production)
    pub fn post_gbuffers(
        &self,
        positions: RgbaFloatImage,
        normals: RgbaFloatImage,
        albedo: RgbaFloatImage,
        eye: Vec3,
        generation: u64,
    ) {
        self.pending_gbuffers.fetch_add(1, Ordering::SeqCst);
        let _ = self.sender.send(MessageToPreview::SetGBuffers {
            positions,
            normals,
            albedo,
            eye,
            generation,
        });
    }

    /// Number of posted G-buffer updates the worker has not yet consumed
    pub fn pending_gbuffer_count(&self) -> i32 {
        self.pending_gbuffers.load(Ordering::SeqCst)
    }

    /// Wait for the worker thread to finish (post `Exit` first)
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Spawn the preview worker on its own background thread
pub fn spawn() -> std::io::Result<PreviewHandle> {
    let (sender, incoming) = unbounded();
    let (outgoing, receiver) = unbounded();
    let pending_gbuffers = Arc::new(AtomicI32::new(0));
    let worker_pending = Arc::clone(&pending_gbuffers);
    let thread = thread::Builder::new()
        .name("lighting-preview".into())
        .spawn(move || {
            LightingPreviewThread::new(incoming, outgoing, worker_pending).run();
        })?;
    Ok(PreviewHandle {
        sender,
        receiver,
        pending_gbuffers,
        thread,
    })
}

/// All preview state, owned by the worker thread
///
/// Public so hosts and tests can also drive the loop synchronously; `spawn`
/// is the threaded convenience wrapper.
pub struct LightingPreviewThread {
    incoming: Receiver<MessageToPreview>,
    outgoing: Sender<MessageFromPreview>,
    pending_gbuffers: Arc<AtomicI32>,

    schedule: LineSchedule,
    lights: Vec<LightDescription>,
    /// Registry arena index per active light, parallel to `lights`
    links: Vec<usize>,
    registry: LightRegistry,
    gbuffers: GBufferSet,
    rt_env: Option<RayTraceEnvironment>,

    last_eye: Vec3,
    view_min: Vec3,
    view_max: Vec3,

    result_dirty: bool,
    last_send: Instant,
    bitmap_generation: u64,
    contribution_counter: u64,
}

impl LightingPreviewThread {
    /// Create a worker around its two queues and the shared pending counter
    pub fn new(
        incoming: Receiver<MessageToPreview>,
        outgoing: Sender<MessageFromPreview>,
        pending_gbuffers: Arc<AtomicI32>,
    ) -> Self {
        LightingPreviewThread {
            incoming,
            outgoing,
            pending_gbuffers,
            schedule: LineSchedule::new(),
            lights: Vec::new(),
            links: Vec::new(),
            registry: LightRegistry::new(),
            gbuffers: GBufferSet::empty(),
            rt_env: None,
            last_eye: Vec3::ZERO,
            view_min: Vec3::ZERO,
            view_max: Vec3::ZERO,
            result_dirty: false,
            last_send: distant_past(),
            bitmap_generation: 0,
            contribution_counter: CONTRIBUTION_COUNTER_START,
        }
    }

    /// Main loop: drain messages while idle, refine one unit at a time,
    /// pace result sends
    pub fn run(&mut self) {
        loop {
            while !self.any_useful_work() || !self.incoming.is_empty() {
                if self.handle_one_message() {
                    return;
                }
            }
            if self.any_useful_work() {
                self.do_one_work_unit();
            }
            if self.result_dirty {
                let now = Instant::now();
                if now.duration_since(self.last_send) > SEND_INTERVAL || !self.any_useful_work() {
                    self.send_result();
                }
            }
            // The preview must never starve the editor
            thread::yield_now();
        }
    }

    /// Block for one message and apply it; returns true when the worker
    /// should exit
    pub fn handle_one_message(&mut self) -> bool {
        let msg = match self.incoming.recv() {
            Ok(msg) => msg,
            // Host dropped its sender; nothing more will ever arrive
            Err(_) => return true,
        };
        match msg {
            MessageToPreview::Exit => return true,
            MessageToPreview::SetLights { lights, eye } => {
                self.last_eye = eye;
                self.links = self.registry.link_lights(&lights);
                self.lights = lights;
                self.discard_results();
            }
            MessageToPreview::SetGeometry { triangles } => self.handle_geometry(triangles),
            MessageToPreview::SetGBuffers {
                positions,
                normals,
                albedo,
                eye,
                generation,
            } => self.handle_gbuffers(positions, normals, albedo, eye, generation),
        }
        false
    }

    /// True iff shadow geometry exists, G-buffers are present, and at least
    /// one light still has refinement to do
    pub fn any_useful_work(&self) -> bool {
        if self.rt_env.is_none() || self.gbuffers.is_empty() {
            return false;
        }
        self.links
            .iter()
            .any(|&link| self.registry.get(link).has_work_to_do())
    }

    /// Pick the highest-priority light with work left and run one
    /// refinement pass on it
    pub fn do_one_work_unit(&mut self) {
        let mut best: Option<usize> = None;
        for candidate in 0..self.lights.len() {
            let info = self.registry.get(self.links[candidate]);
            if !info.has_work_to_do() {
                continue;
            }
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    let current_info = self.registry.get(self.links[current]);
                    if current_info.is_lower_priority_than(
                        self.lights[current].position,
                        info,
                        self.lights[candidate].position,
                        self.view_min,
                        self.view_max,
                    ) {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        let Some(chosen) = best else { return };

        // Lazy acceleration-structure build, once per geometry update
        if let Some(env) = &mut self.rt_env {
            if !env.is_built() {
                log::info!("building acceleration structure");
                let start = Instant::now();
                env.build_acceleration_structure();
                log::info!(
                    "acceleration structure ready ({:.2} ms)",
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
        }
        let Some(env) = self.rt_env.as_ref() else {
            return;
        };

        let info = self.registry.get_mut(self.links[chosen]);
        calculate_for_light(
            env,
            &self.schedule,
            &self.gbuffers,
            &self.lights[chosen],
            info,
            self.contribution_counter,
        );
        if info.total_contribution != 0.0 {
            self.result_dirty = true;
        }
    }

    /// Assemble, encode, and post the current preview image
    pub fn send_result(&mut self) {
        let pairs: Vec<(&LightDescription, &IncrementalLightInfo)> = self
            .lights
            .iter()
            .zip(&self.links)
            .map(|(light, &link)| (light, self.registry.get(link)))
            .collect();
        let result = assemble_result(&self.gbuffers, &self.schedule, &pairs);
        let bitmap = encode_bgra(&result);
        if self
            .outgoing
            .send(MessageFromPreview::DisplayResult {
                bitmap,
                generation: self.bitmap_generation,
            })
            .is_err()
        {
            log::debug!("display receiver disconnected; result dropped");
        }
        self.last_send = Instant::now();
        self.result_dirty = false;
    }

    /// Registry of per-light incremental state (stable across list updates)
    pub fn registry(&self) -> &LightRegistry {
        &self.registry
    }

    /// The active light list in host order
    pub fn lights(&self) -> &[LightDescription] {
        &self.lights
    }

    /// True when a result newer than the last send exists
    pub fn result_dirty(&self) -> bool {
        self.result_dirty
    }

    fn handle_geometry(&mut self, triangles: Vec<Vec3>) {
        if triangles.len() % 3 != 0 {
            log::warn!(
                "ignoring geometry update: {} vertices is not a whole number of triangles",
                triangles.len()
            );
            return;
        }
        self.rt_env = if triangles.is_empty() {
            None
        } else {
            let mut env = RayTraceEnvironment::new();
            for (i, tri) in triangles.chunks_exact(3).enumerate() {
                env.add_triangle(
                    (i * 3) as i32,
                    tri[0],
                    tri[1],
                    tri[2],
                    SHADOW_TRIANGLE_COLOR,
                );
            }
            Some(env)
        };
        self.discard_results();
    }

    fn handle_gbuffers(
        &mut self,
        positions: RgbaFloatImage,
        normals: RgbaFloatImage,
        albedo: RgbaFloatImage,
        eye: Vec3,
        generation: u64,
    ) {
        self.pending_gbuffers.fetch_sub(1, Ordering::SeqCst);
        match GBufferSet::from_images(&positions, &normals, &albedo) {
            Ok(set) => {
                self.gbuffers = set;
                self.last_eye = eye;
                self.bitmap_generation = generation;
                let (view_min, view_max) = self.gbuffers.scene_bounds(eye);
                self.view_min = view_min;
                self.view_max = view_max;
                self.discard_results();
            }
            // The producer is trusted (same process); drop bad frames quietly
            Err(err) => log::warn!("ignoring g-buffer update: {err}"),
        }
    }

    /// Invalidate every cached per-light result, bump the tick, refresh eye
    /// distances, and force a send within about a second
    fn discard_results(&mut self) {
        self.registry.discard_all();
        self.contribution_counter += 1;
        for (light, &link) in self.lights.iter().zip(&self.links) {
            let info = self.registry.get_mut(link);
            info.distance_to_eye = if light.is_directional() {
                0.0
            } else {
                self.last_eye.distance(light.position)
            };
        }
        self.result_dirty = true;
        self.last_send = Instant::now()
            .checked_sub(FORCED_SEND_REWIND)
            .unwrap_or_else(Instant::now);
    }
}

/// An instant far enough back that the first result sends immediately
fn distant_past() -> Instant {
    Instant::now()
        .checked_sub(Duration::from_secs(1_000_000))
        .unwrap_or_else(Instant::now)
}
