//! # tilepaint-ops
//!
//! Operations over tiled paint devices.
//!
//! # Modules
//!
//! - [`painter`] - Device-to-device compositing with masks and cancellation
//! - [`parallel`] - Rayon bulk fill and composite, one tile per task
//! - [`thumbnail`] - Area-averaged preview devices
//! - [`lod`] - Level-of-detail pyramids kept in sync by barrier jobs
//! - [`display`] - RGBA8 rendering for screens
//! - [`scheduler`] - Stroke jobs, conflict ordering and wave execution
//! - [`config`] - YAML engine configuration and the [`Engine`] entry point
//!
//! # Example
//!
//! ```rust
//! use tilepaint_core::Rect;
//! use tilepaint_ops::{Engine, EngineConfig, Painter};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let mut layer = engine.create_device(None).unwrap();
//! let mut brush = engine.create_device(None).unwrap();
//! brush.fill(Rect::new(10, 10, 4, 4), &[0, 0, 255, 255]).unwrap();
//!
//! Painter::new(&mut layer)
//!     .op("multiply")
//!     .bit_blt(&brush, Rect::new(0, 0, 32, 32), None)
//!     .unwrap();
//! assert_eq!(layer.exact_bounds(), Rect::new(10, 10, 4, 4));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod display;
mod error;
pub mod lod;
pub mod painter;
pub mod parallel;
pub mod scheduler;
pub mod thumbnail;

pub use config::{Engine, EngineConfig, MAX_LOD_LEVELS};
pub use display::{convert_to_rgba8, DisplayImage};
pub use error::{OpsError, OpsResult};
pub use lod::{lod_sync_job, LodCache};
pub use painter::Painter;
pub use scheduler::{
    Job, JobContext, JobKind, JobOrdering, RunReport, SharedDevice, StrokeId, StrokeScheduler,
    StrokeStatus,
};
pub use thumbnail::create_thumbnail_device;
