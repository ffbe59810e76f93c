//! Common test helpers for prelight integration tests
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use prelight::prelude::*;

// ============================================================================
// Standard G-buffer fixtures
// ============================================================================

/// A flat floor in the z = 0 plane facing +Z: position (x, y, 0), white albedo
pub fn floor_positions(width: usize, height: usize) -> RgbaFloatImage {
    let mut data = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[x as f32, y as f32, 0.0, 1.0]);
        }
    }
    RgbaFloatImage::new(width, height, data)
}

/// Uniform plane of one RGBA value
pub fn uniform_image(width: usize, height: usize, rgba: [f32; 4]) -> RgbaFloatImage {
    let mut data = Vec::with_capacity(width * height * 4);
    for _ in 0..width * height {
        data.extend_from_slice(&rgba);
    }
    RgbaFloatImage::new(width, height, data)
}

/// Post the flat-floor G-buffer set for the given dimensions
pub fn floor_gbuffers_message(width: usize, height: usize, generation: u64) -> MessageToPreview {
    MessageToPreview::SetGBuffers {
        positions: floor_positions(width, height),
        normals: uniform_image(width, height, [0.0, 0.0, 1.0, 1.0]),
        albedo: uniform_image(width, height, [1.0, 1.0, 1.0, 1.0]),
        eye: Vec3::new(0.0, 0.0, 10.0),
        generation,
    }
}

// ============================================================================
// Standard geometry fixtures
// ============================================================================

/// One far-away triangle that occludes nothing over the floor but makes the
/// shadow environment buildable
pub fn distant_marker_triangle() -> Vec<Vec3> {
    vec![
        Vec3::new(900.0, 900.0, -50.0),
        Vec3::new(901.0, 900.0, -50.0),
        Vec3::new(900.0, 901.0, -50.0),
    ]
}

/// Two triangles forming a huge quad at height `z`, centered on the floor
pub fn occluder_quad(z: f32, half: f32) -> Vec<Vec3> {
    let a = Vec3::new(-half, -half, z);
    let b = Vec3::new(half, -half, z);
    let c = Vec3::new(half, half, z);
    let d = Vec3::new(-half, half, z);
    vec![a, b, c, a, c, d]
}

// ============================================================================
// Synchronous worker harness
// ============================================================================

/// A worker plus both queue endpoints, driven without a thread
pub struct Harness {
    /// The worker under test
    pub worker: LightingPreviewThread,
    /// Host-to-worker queue
    pub sender: crossbeam_channel::Sender<MessageToPreview>,
    /// Worker-to-host queue
    pub receiver: crossbeam_channel::Receiver<MessageFromPreview>,
}

impl Harness {
    /// Build a fresh worker around in-memory queues
    pub fn new() -> Self {
        let (sender, incoming) = crossbeam_channel::unbounded();
        let (outgoing, receiver) = crossbeam_channel::unbounded();
        let pending = std::sync::Arc::new(std::sync::atomic::AtomicI32::new(0));
        Harness {
            worker: LightingPreviewThread::new(incoming, outgoing, pending),
            sender,
            receiver,
        }
    }

    /// Post a message and let the worker consume it
    pub fn post(&mut self, msg: MessageToPreview) {
        self.sender.send(msg).expect("worker queue closed");
        assert!(
            !self.worker.handle_one_message(),
            "message unexpectedly requested exit"
        );
    }

    /// Run refinement units until no useful work remains; panics past
    /// `max_units`. Returns how many units ran.
    pub fn drive_until_idle(&mut self, max_units: usize) -> usize {
        let mut units = 0;
        while self.worker.any_useful_work() {
            assert!(
                units < max_units,
                "refinement did not terminate within {} units",
                max_units
            );
            self.worker.do_one_work_unit();
            units += 1;
        }
        units
    }

    /// Force a result send and return the resulting bitmap + generation
    pub fn take_result(&mut self) -> (Bitmap, u64) {
        self.worker.send_result();
        match self.receiver.try_recv().expect("no display result queued") {
            MessageFromPreview::DisplayResult { bitmap, generation } => (bitmap, generation),
        }
    }
}

/// BGRA pixel accessor into a display bitmap
pub fn pixel(bitmap: &Bitmap, x: usize, y: usize) -> [u8; 4] {
    let o = (y * bitmap.width + x) * 4;
    [
        bitmap.data[o],
        bitmap.data[o + 1],
        bitmap.data[o + 2],
        bitmap.data[o + 3],
    ]
}
