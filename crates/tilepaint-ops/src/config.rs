//! Engine configuration and the engine context built from it.
//!
//! Configuration is plain YAML; every field is optional:
//!
//! ```yaml
//! tile_budget: 4096          # max allocated tiles, all devices together
//! thumbnail_oversample: 4    # samples per axis per thumbnail pixel
//! lod_levels: 3
//! worker_threads: 0          # 0 = rayon default
//! default_color_space: rgba-u8
//! cancel_check_rows: 1
//! ```
//!
//! # Example
//!
//! ```rust
//! use tilepaint_ops::{Engine, EngineConfig};
//!
//! let config = EngineConfig::from_yaml_str("tile_budget: 16\nlod_levels: 2").unwrap();
//! let engine = Engine::new(config).unwrap();
//! let dev = engine.create_device(None).unwrap();
//! assert_eq!(dev.color_space().id(), "rgba-u8");
//! assert_eq!(engine.budget().limit(), Some(16));
//! ```

use crate::error::{OpsError, OpsResult};
use crate::lod::LodCache;
use crate::painter::Painter;
use crate::scheduler::StrokeScheduler;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tilepaint_core::ColorSpaceRegistry;
use tilepaint_store::{CancellationToken, Checkpoint, PaintDevice, TileBudget};
use tracing::debug;

/// Deepest LOD pyramid accepted.
pub const MAX_LOD_LEVELS: u8 = 16;

/// Tunables for an [`Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum allocated tiles across every device of the engine.
    pub tile_budget: Option<usize>,
    /// Samples per axis per thumbnail pixel; `None` averages every pixel.
    pub thumbnail_oversample: Option<u32>,
    /// Levels in each LOD pyramid.
    pub lod_levels: u8,
    /// Scheduler pool size; 0 picks the rayon default.
    pub worker_threads: usize,
    /// Color space of devices created without one.
    pub default_color_space: String,
    /// Scanlines between cancellation polls in bulk operations.
    pub cancel_check_rows: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_budget: None,
            thumbnail_oversample: None,
            lod_levels: 3,
            worker_threads: 0,
            default_color_space: "rgba-u8".into(),
            cancel_check_rows: 1,
        }
    }
}

impl EngineConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> OpsResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> OpsResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loading engine config");
        Self::from_yaml_str(&content)
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> OpsResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks values against a registry of color spaces.
    pub fn validate(&self, registry: &ColorSpaceRegistry) -> OpsResult<()> {
        if self.lod_levels == 0 || self.lod_levels > MAX_LOD_LEVELS {
            return Err(OpsError::config(format!(
                "lod_levels must be 1..={MAX_LOD_LEVELS}, got {}",
                self.lod_levels
            )));
        }
        if !registry.contains(&self.default_color_space) {
            return Err(OpsError::config(format!(
                "unknown default color space '{}'",
                self.default_color_space
            )));
        }
        if self.cancel_check_rows == 0 {
            return Err(OpsError::config("cancel_check_rows must be at least 1"));
        }
        if self.thumbnail_oversample == Some(0) {
            return Err(OpsError::config("thumbnail_oversample must be at least 1"));
        }
        Ok(())
    }
}

/// Shared context: registry, tile budget and configuration.
///
/// Devices created here all draw from one budget.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: ColorSpaceRegistry,
    budget: Arc<TileBudget>,
}

impl Engine {
    /// Engine over the builtin color spaces.
    pub fn new(config: EngineConfig) -> OpsResult<Self> {
        Self::with_registry(config, ColorSpaceRegistry::with_builtins())
    }

    /// Engine over a custom registry.
    pub fn with_registry(config: EngineConfig, registry: ColorSpaceRegistry) -> OpsResult<Self> {
        config.validate(&registry)?;
        let budget = match config.tile_budget {
            Some(limit) => TileBudget::with_limit(limit),
            None => TileBudget::unlimited(),
        };
        debug!(spaces = registry.len(), budget = ?config.tile_budget, "engine ready");
        Ok(Self {
            config,
            registry,
            budget: Arc::new(budget),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Color space registry.
    pub fn registry(&self) -> &ColorSpaceRegistry {
        &self.registry
    }

    /// Budget shared by every device of this engine.
    pub fn budget(&self) -> &Arc<TileBudget> {
        &self.budget
    }

    /// Empty device in `space_id`, or the configured default space.
    pub fn create_device(&self, space_id: Option<&str>) -> OpsResult<PaintDevice> {
        let id = space_id.unwrap_or(&self.config.default_color_space);
        let space = self.registry.get(id)?;
        Ok(PaintDevice::with_budget(space, Arc::clone(&self.budget)))
    }

    /// Checkpoint polling `token` at the configured interval.
    pub fn checkpoint<'a>(&self, token: &'a CancellationToken) -> Checkpoint<'a> {
        Checkpoint::new(token, self.config.cancel_check_rows)
    }

    /// Painter on `dst` polling `token` at the configured interval.
    pub fn painter<'a>(&self, dst: &'a mut PaintDevice, token: &'a CancellationToken) -> Painter<'a> {
        Painter::new(dst).cancel_with(token, self.config.cancel_check_rows)
    }

    /// Empty LOD pyramid for `device` with the configured depth.
    pub fn lod_cache(&self, device: &PaintDevice) -> LodCache {
        LodCache::new(device, self.config.lod_levels, Arc::clone(&self.budget))
    }

    /// Scheduler with the configured pool size and polling interval.
    pub fn scheduler(&self) -> OpsResult<StrokeScheduler> {
        Ok(StrokeScheduler::new(self.config.worker_threads)?.with_check_rows(self.config.cancel_check_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Job, JobKind};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tilepaint_core::{ChannelType, ColorModel, ColorSpaceBuilder, CompositeOp, CompositeParams, Rect};

    /// Writes every pixel it sees and cancels `0` on its first call.
    #[derive(Debug)]
    struct CancelOnFirstRow(CancellationToken);

    impl CompositeOp for CancelOnFirstRow {
        fn id(&self) -> &str {
            "cancel-on-first-row"
        }

        fn composite(&self, _: &[u8], dst: &mut [u8], n: usize, _: &CompositeParams<'_>) {
            self.0.cancel();
            for px in dst.chunks_exact_mut(2).take(n) {
                px.copy_from_slice(&[1, 255]);
            }
        }
    }

    #[test]
    fn test_painter_polls_at_configured_interval() {
        let token = CancellationToken::new();
        let space = ColorSpaceBuilder::new(ColorModel::GrayA, ChannelType::U8)
            .id("graya-trip")
            .with_op(Arc::new(CancelOnFirstRow(token.clone())))
            .build();
        let mut registry = ColorSpaceRegistry::with_builtins();
        registry.register(space);
        let config = EngineConfig { cancel_check_rows: 3, ..Default::default() };
        let engine = Engine::with_registry(config, registry).unwrap();

        let mut dst = engine.create_device(Some("graya-trip")).unwrap();
        let done = engine
            .painter(&mut dst, &token)
            .op("cancel-on-first-row")
            .fill_rect_with_mask(Rect::new(0, 0, 4, 10), &[0, 0], None)
            .unwrap();
        assert!(done.is_interrupted());
        // Cancelled during row 0, seen at the poll after row 2.
        assert_eq!(dst.exact_bounds(), Rect::new(0, 0, 4, 3));
    }

    #[test]
    fn test_fill_checkpoint_uses_configured_interval() {
        let engine = Engine::new(EngineConfig { cancel_check_rows: 4, ..Default::default() }).unwrap();
        let token = CancellationToken::new();
        let mut cp = engine.checkpoint(&token);
        assert!(!cp.row_done());
        token.cancel();
        assert!(!cp.row_done());
        assert!(!cp.row_done());
        assert!(cp.row_done());
    }

    #[test]
    fn test_scheduler_hands_interval_to_jobs() {
        let engine = Engine::new(EngineConfig { cancel_check_rows: 5, ..Default::default() }).unwrap();
        let mut sched = engine.scheduler().unwrap();
        let seen = Arc::new(AtomicU32::new(0));
        let stroke = sched.begin_stroke();
        let out = Arc::clone(&seen);
        sched
            .submit(Job::new(stroke, JobKind::DoStroke, "interval", move |ctx| {
                out.store(ctx.check_rows(), Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        assert_eq!(sched.run().completed, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.validate(&ColorSpaceRegistry::with_builtins()).is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = EngineConfig {
            tile_budget: Some(100),
            thumbnail_oversample: Some(2),
            lod_levels: 5,
            worker_threads: 2,
            default_color_space: "graya-u16".into(),
            cancel_check_rows: 8,
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(EngineConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects() {
        let reg = ColorSpaceRegistry::with_builtins();
        let bad = [
            EngineConfig { lod_levels: 0, ..Default::default() },
            EngineConfig { lod_levels: 17, ..Default::default() },
            EngineConfig { default_color_space: "lab-u8".into(), ..Default::default() },
            EngineConfig { cancel_check_rows: 0, ..Default::default() },
            EngineConfig { thumbnail_oversample: Some(0), ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(&reg), Err(OpsError::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn test_unknown_field_type_is_yaml_error() {
        assert!(matches!(
            EngineConfig::from_yaml_str("lod_levels: many"),
            Err(OpsError::Yaml(_))
        ));
    }

    #[test]
    fn test_engine_devices_share_budget() {
        let engine = Engine::new(EngineConfig { tile_budget: Some(3), ..Default::default() }).unwrap();
        let mut a = engine.create_device(None).unwrap();
        let mut b = engine.create_device(Some("alpha-u8")).unwrap();
        a.fill(tilepaint_core::Rect::new(0, 0, 128, 1), &[1, 1, 1, 1]).unwrap();
        b.set_pixel(0, 0, &[9]).unwrap();
        let err = b.set_pixel(100, 0, &[9]).unwrap_err();
        assert!(err.is_allocation_error());
        assert!(engine.create_device(Some("nope")).is_err());
    }
}
