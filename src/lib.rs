//! # PRELIGHT
//!
//! **P.R.E.L.I.G.H.T. - Progressive Refinement Engine for Lighting
//! Incremental G-buffer Hard-shadow Tracing**
//!
//! An incremental, priority-scheduled, SIMD-parallel direct-lighting
//! previewer for level editors. Given a deferred G-buffer (per-pixel world
//! position, normal, and albedo), a triangle soup for shadows, an eye
//! position, and a list of lights, a background worker progressively
//! computes hard-shadowed direct illumination and streams display bitmaps
//! back to the host at a bounded rate.
//!
//! ## Features
//!
//! - **Incremental refinement**: bit-reversed line schedule; a coarse image
//!   after one pass, gap-bisecting detail on every pass after
//! - **Priority scheduling**: the light most deserving of the next pass
//!   wins (view-volume membership, brightness, refinement stage, recency)
//! - **SIMD kernel**: 4 pixels per step through light evaluation and packet
//!   shadow tracing, striped over 4 parallel tasks
//! - **Bounded output**: partial results display immediately via
//!   nearest-computed-line upsampling; sends pace at 10 s or on completion
//!
//! ## Example
//!
//! ```rust
//! use prelight::prelude::*;
//! use glam::Vec3;
//!
//! let preview = prelight::worker::spawn().unwrap();
//! preview
//!     .sender()
//!     .send(MessageToPreview::SetLights {
//!         lights: vec![LightDescription::directional(
//!             1,
//!             Vec3::NEG_Z,
//!             Vec3::new(1.0, 0.9, 0.8),
//!         )],
//!         eye: Vec3::new(0.0, 0.0, 64.0),
//!     })
//!     .unwrap();
//! // ... post geometry and G-buffers, receive DisplayResult bitmaps ...
//! preview.sender().send(MessageToPreview::Exit).unwrap();
//! preview.join();
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod composite;
pub mod gbuffer;
pub mod lights;
pub mod matrix;
pub mod raytrace;
pub mod registry;
pub mod sampler;
pub mod schedule;
pub mod simd;
pub mod worker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::composite::{assemble_result, encode_bgra, estimated_unshot_ambient, Bitmap};
    pub use crate::gbuffer::{GBufferError, GBufferSet, RgbaFloatImage};
    pub use crate::lights::{Attenuation, LightDescription, LightKind, SpotCone};
    pub use crate::matrix::VectorMatrix;
    pub use crate::raytrace::{RayTraceEnvironment, TraceResults};
    pub use crate::registry::{IncrementalLightInfo, IncrementalState, LightRegistry};
    pub use crate::sampler::calculate_for_light;
    pub use crate::schedule::{LineSchedule, NUM_STAGES};
    pub use crate::simd::Vec3x4;
    pub use crate::worker::{
        spawn, LightingPreviewThread, MessageFromPreview, MessageToPreview, PreviewHandle,
    };
}
