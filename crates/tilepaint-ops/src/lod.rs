//! Level-of-detail pyramids.
//!
//! A [`LodCache`] keeps `n` successively halved copies of one device. Level
//! `l` pixel `(x, y)` is the average of the 2x2 block at `(2x, 2y)` of level
//! `l - 1`, where level 0 is the device itself in canvas coordinates.
//!
//! Syncing reads the device, so it must not overlap with paint jobs on the
//! same device. Through the scheduler, [`lod_sync_job`] submits it as a
//! barrier: every earlier job touching the device finishes first and later
//! ones wait for it.

use crate::error::{OpsError, OpsResult};
use crate::scheduler::{Job, JobKind, JobOrdering, SharedDevice, StrokeId};
use std::sync::{Arc, Mutex, PoisonError};
use tilepaint_core::{Rect, TILE_SIZE};
use tilepaint_store::{DeviceId, PaintDevice, TileBudget};
use tracing::debug;

/// Downsampled copies of one device.
#[derive(Debug)]
pub struct LodCache {
    device: DeviceId,
    budget: Arc<TileBudget>,
    /// `levels[0]` is half resolution.
    levels: Vec<PaintDevice>,
    /// Canvas region covered by the last sync.
    synced: Rect,
}

impl LodCache {
    /// Empty pyramid of `depth` levels for `device`.
    pub fn new(device: &PaintDevice, depth: u8, budget: Arc<TileBudget>) -> Self {
        let levels = (0..depth)
            .map(|_| PaintDevice::with_budget(Arc::clone(device.color_space()), Arc::clone(&budget)))
            .collect();
        Self {
            device: device.id(),
            budget,
            levels,
            synced: Rect::default(),
        }
    }

    /// Device this pyramid belongs to.
    pub fn device_id(&self) -> DeviceId {
        self.device
    }

    /// Number of levels below full resolution.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Level `n` (1 = half size), if present.
    pub fn level(&self, n: usize) -> Option<&PaintDevice> {
        n.checked_sub(1).and_then(|i| self.levels.get(i))
    }

    /// Recomputes every level under canvas rect `dirty`.
    pub fn sync(&mut self, device: &PaintDevice, dirty: Rect) -> OpsResult<()> {
        if device.id() != self.device {
            return Err(OpsError::config(format!(
                "LOD cache of {} cannot sync {}",
                self.device,
                device.id()
            )));
        }
        if self
            .levels
            .first()
            .is_some_and(|l| !l.color_space().is_compatible(device.color_space()))
        {
            // The device was converted: start over in its new space.
            let depth = self.levels.len() as u8;
            *self = Self::new(device, depth, Arc::clone(&self.budget));
        }

        let mut dirty = dirty;
        let mut written = 0usize;
        for l in 0..self.levels.len() {
            dirty = dirty.scaled_down(2);
            if dirty.is_empty() {
                break;
            }
            let (before, after) = self.levels.split_at_mut(l);
            let prev = if l == 0 { device } else { &before[l - 1] };
            let target = &mut after[0];
            let relevant = prev.extent().scaled_down(2).union(&target.extent());
            if let Some(region) = dirty.intersect(&relevant) {
                downsample_into(prev, target, region)?;
                written += region.area() as usize;
            }
        }
        self.synced = self.synced.union(&device.extent());
        debug!(device = %self.device, pixels = written, "LOD synced");
        Ok(())
    }

    /// Rebuilds the region covered now or at the previous sync.
    pub fn sync_all(&mut self, device: &PaintDevice) -> OpsResult<()> {
        let dirty = device.extent().union(&self.synced);
        self.sync(device, dirty)?;
        self.synced = device.extent();
        Ok(())
    }
}

/// Writes the 2x box downsample of `prev` into `region` of `target`, one
/// tile-high band at a time.
fn downsample_into(prev: &PaintDevice, target: &mut PaintDevice, region: Rect) -> OpsResult<()> {
    let space = Arc::clone(target.color_space());
    let ps = space.pixel_size();
    let width = region.width as usize;
    let mut src = Vec::new();
    let mut out = Vec::new();

    let mut y = region.y;
    while y < region.bottom() {
        let band = Rect::new(region.x, y, region.width, TILE_SIZE.min(region.bottom() - y));
        let src_rect = Rect::new(2 * band.x, 2 * band.y, 2 * band.width, 2 * band.height);
        src.resize(src_rect.area() as usize * ps, 0);
        prev.read_bytes(src_rect, &mut src)?;
        out.resize(band.area() as usize * ps, 0);

        let stride = 2 * width * ps;
        for by in 0..band.height as usize {
            let top = &src[2 * by * stride..][..stride];
            let bottom = &src[(2 * by + 1) * stride..][..stride];
            for bx in 0..width {
                let at = 2 * bx * ps;
                let quad = [
                    &top[at..at + ps],
                    &top[at + ps..at + 2 * ps],
                    &bottom[at..at + ps],
                    &bottom[at + ps..at + 2 * ps],
                ];
                let o = (by * width + bx) * ps;
                space.mix_colors_uniform(&quad, &mut out[o..o + ps]);
            }
        }
        target.write_bytes(band, &out)?;
        y = band.bottom();
    }
    Ok(())
}

/// Scheduler job syncing `cache` from `device` under `dirty`, as a barrier.
pub fn lod_sync_job(stroke: StrokeId, cache: Arc<Mutex<LodCache>>, device: SharedDevice, dirty: Rect) -> Job {
    let id = device.id();
    Job::new(stroke, JobKind::DoStroke, "lod-sync", move |_| {
        let dev = device.read();
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.sync(&dev, dirty)
    })
    .ordering(JobOrdering::Barrier)
    .reads(id, dirty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilepaint_core::ColorSpaceRegistry;

    fn device() -> PaintDevice {
        PaintDevice::new(ColorSpaceRegistry::with_builtins().get("graya-u8").unwrap())
    }

    #[test]
    fn test_levels_halve() {
        let mut dev = device();
        dev.fill(Rect::new(0, 0, 8, 8), &[200, 255]).unwrap();
        let mut lod = LodCache::new(&dev, 3, Arc::new(TileBudget::unlimited()));
        lod.sync_all(&dev).unwrap();
        assert_eq!(lod.depth(), 3);
        assert_eq!(lod.level(1).unwrap().exact_bounds(), Rect::new(0, 0, 4, 4));
        assert_eq!(lod.level(2).unwrap().exact_bounds(), Rect::new(0, 0, 2, 2));
        assert_eq!(lod.level(3).unwrap().pixel(0, 0), &[200, 255]);
        assert!(lod.level(0).is_none());
        assert!(lod.level(4).is_none());
    }

    #[test]
    fn test_incremental_sync_and_erase() {
        let mut dev = device();
        dev.set_pixel(-3, 5, &[100, 255]).unwrap();
        let mut lod = LodCache::new(&dev, 1, Arc::new(TileBudget::unlimited()));
        lod.sync(&dev, Rect::new(-3, 5, 1, 1)).unwrap();
        // (-3, 5) lands in the block at (-2, 2): one of four pixels set.
        let px = lod.level(1).unwrap().pixel(-2, 2).to_vec();
        assert_eq!(px[0], 100);
        assert!((63..=64).contains(&px[1]));

        dev.clear(Rect::new(-3, 5, 1, 1)).unwrap();
        lod.sync_all(&dev).unwrap();
        assert_eq!(lod.level(1).unwrap().pixel(-2, 2)[1], 0);
    }

    #[test]
    fn test_empty_device_allocates_nothing() {
        let dev = device();
        let mut lod = LodCache::new(&dev, 4, Arc::new(TileBudget::unlimited()));
        lod.sync(&dev, Rect::new(0, 0, 1000, 1000)).unwrap();
        assert!((1..=4).all(|l| lod.level(l).unwrap().tile_store().tile_count() == 0));
    }

    #[test]
    fn test_foreign_device_rejected() {
        let dev = device();
        let other = device();
        let mut lod = LodCache::new(&dev, 1, Arc::new(TileBudget::unlimited()));
        assert!(matches!(lod.sync(&other, Rect::new(0, 0, 1, 1)), Err(OpsError::Config(_))));
    }
}
