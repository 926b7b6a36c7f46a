//! Composite throughput timing.

use crate::BenchArgs;
use anyhow::{bail, Context, Result};
use std::time::Instant;
use tilepaint_core::{CompositeParams, Rect};
use tilepaint_ops::{parallel, Engine, Painter};
use tracing::{debug, warn};

/// Times `args.iterations` composites of a `size x size` region.
pub fn run(args: BenchArgs, engine: &Engine) -> Result<()> {
    if args.size == 0 || args.size > 1 << 14 {
        bail!("--size must be in 1..=16384, got {}", args.size);
    }
    let size = args.size as i32;
    let rect = Rect::new(0, 0, size, size);
    let mut dst = engine
        .create_device(Some(args.space.as_str()))
        .with_context(|| format!("Cannot create device in {}", args.space))?;
    let mut src = engine.create_device(Some(args.space.as_str()))?;
    let space = dst.color_space().clone();
    if space.composite_op(&args.op).is_none() {
        warn!(op = %args.op, space = %space.id(), "op not available, timing over");
    }

    let mut under = vec![0u8; space.pixel_size()];
    let mut over = vec![0u8; space.pixel_size()];
    space.from_rgba8(&[200, 180, 40, 255], &mut under, 1);
    space.from_rgba8(&[30, 90, 220, 160], &mut over, 1);
    parallel::par_fill(&mut dst, rect, &under)?;
    parallel::par_fill(&mut src, rect, &over)?;
    debug!(tiles = dst.tile_store().tile_count() * 2, "bench devices ready");

    let params = CompositeParams::new(0.8);
    let mut best = f64::MAX;
    let mut total = 0.0;
    for i in 0..args.iterations.max(1) {
        let start = Instant::now();
        if args.parallel {
            parallel::par_composite(&mut dst, &src, rect, &args.op, &params)?;
        } else {
            Painter::new(&mut dst)
                .op(args.op.as_str())
                .opacity(0.8)
                .bit_blt(&src, rect, None)?;
        }
        let secs = start.elapsed().as_secs_f64();
        debug!(iteration = i, secs, "composite timed");
        best = best.min(secs);
        total += secs;
    }

    let runs = args.iterations.max(1) as f64;
    let mpix = rect.area() as f64 / 1e6;
    println!(
        "{} {} {}x{} ({}, {} threads)",
        space.id(),
        args.op,
        args.size,
        args.size,
        if args.parallel { "parallel" } else { "scanline" },
        rayon::current_num_threads()
    );
    println!("  best: {:8.3} ms  {:8.1} Mpix/s", best * 1e3, mpix / best);
    println!("  mean: {:8.3} ms  {:8.1} Mpix/s", total / runs * 1e3, mpix * runs / total);
    Ok(())
}
