//! Reference paint scenario.
//!
//! Fill, composite, thumbnail, LOD and undo on one device, printing what
//! each step leaves behind.

use super::{format_pixel, format_size};
use crate::ScenarioArgs;
use anyhow::{Context, Result};
use tilepaint_core::{ColorSpace, Rect};
use tilepaint_ops::{convert_to_rgba8, create_thumbnail_device, Engine};
use tilepaint_store::{CancellationToken, PaintDevice};
use tracing::info;

fn native(space: &ColorSpace, rgba: [u8; 4]) -> Vec<u8> {
    let mut px = vec![0u8; space.pixel_size()];
    space.from_rgba8(&rgba, &mut px, 1);
    px
}

fn rgba(device: &PaintDevice, x: i32, y: i32) -> String {
    let mut out = [0u8; 4];
    device.color_space().to_rgba8(device.pixel(x, y), &mut out, 1);
    format_pixel(&out)
}

/// Runs the scenario.
pub fn run(args: ScenarioArgs, engine: &Engine, verbose: bool) -> Result<()> {
    let mut layer = engine
        .create_device(args.space.as_deref())
        .context("Failed to create device")?;
    let space = layer.color_space().clone();
    let paint = Rect::new(10, 10, 20, 20);
    println!("device {} in {}", layer.id(), space.id());
    println!("  extent in tiles:   {}", layer.tile_store().extent_in_tiles());

    let token = CancellationToken::new();
    layer.begin_transaction()?;
    let red = native(&space, [255, 0, 0, 255]);
    let filled = layer.fill_cancellable(paint, &red, &mut engine.checkpoint(&token))?;
    println!("fill {paint} red");
    if !filled.is_finished() {
        println!("  (interrupted)");
    }
    println!("  extent:            {}", layer.extent());
    println!("  pixel (15, 15):    {}", rgba(&layer, 15, 15));
    println!("  pixel (0, 0):      {}", rgba(&layer, 0, 0));

    let mut brush = engine.create_device(Some(space.id()))?;
    brush.fill(paint, &native(&space, [0, 0, 255, 255]))?;
    let done = engine
        .painter(&mut layer, &token)
        .op(args.op.as_str())
        .opacity(args.opacity)
        .bit_blt(&brush, paint, None)
        .context("Composite failed")?;
    println!("composite blue {} at {:.2}", args.op, args.opacity);
    println!("  pixel (15, 15):    {}", rgba(&layer, 15, 15));
    if !done.is_finished() {
        println!("  (interrupted)");
    }
    let tx = layer
        .commit_transaction()
        .context("Transaction was not open")?;
    println!("  undo memento:      {} tiles, {}", tx.len(), format_size(tx.memory_bytes()));

    let thumb = create_thumbnail_device(
        &layer,
        16,
        16,
        Rect::new(0, 0, 64, 64),
        engine.config().thumbnail_oversample,
        None,
    )?
    .into_inner();
    println!("thumbnail 16x16 of 64x64");
    println!("  pixel (3, 3):      {}", rgba(&thumb, 3, 3));

    let mut lod = engine.lod_cache(&layer);
    lod.sync_all(&layer)?;
    for level in 1..=lod.depth() {
        if let Some(dev) = lod.level(level) {
            println!("  LOD {level} bounds:      {}", dev.exact_bounds());
        }
    }

    let img = convert_to_rgba8(&layer, Rect::new(14, 14, 2, 2), None)?;
    println!("display 2x2 at (14, 14): {}", format_pixel(img.as_bytes()));

    let redo = layer.revert(tx)?;
    println!("undo");
    println!("  extent in tiles:   {}", layer.tile_store().extent_in_tiles());
    println!("  pixel (15, 15):    {}", rgba(&layer, 15, 15));
    println!("  redo memento:      {} tiles", redo.len());

    if verbose {
        println!(
            "tiles in use: {} ({} budget)",
            engine.budget().used(),
            engine
                .budget()
                .limit()
                .map_or_else(|| "unlimited".to_string(), |l| l.to_string())
        );
    }
    info!("scenario complete");
    Ok(())
}
