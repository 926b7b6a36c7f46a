//! Color space listing.

use crate::SpacesArgs;
use anyhow::{Context, Result};
use tilepaint_core::{ChannelRole, ColorSpace};
use tilepaint_ops::Engine;

/// Prints every registered color space, or just `args.id`.
pub fn run(args: SpacesArgs, engine: &Engine, verbose: bool) -> Result<()> {
    let registry = engine.registry();
    match &args.id {
        Some(id) => {
            let space = registry
                .get(id)
                .with_context(|| format!("Unknown color space: {id}"))?;
            print_space(&space, true, args.ops || verbose);
        }
        None => {
            for space in registry.iter() {
                print_space(space, verbose, args.ops);
            }
            println!("{} color spaces", registry.len());
        }
    }
    Ok(())
}

fn print_space(space: &ColorSpace, detail: bool, ops: bool) {
    println!(
        "{:<12} {:<6} {:>3} bytes/pixel  {}",
        space.id(),
        space.model().to_string(),
        space.pixel_size(),
        space.profile().name()
    );
    if detail {
        for ch in space.channel_info() {
            let role = match ch.role {
                ChannelRole::Color => "color",
                ChannelRole::Alpha => "alpha",
            };
            println!("    {:<8} {:<5} {} @ byte {}", ch.name, role, ch.channel_type, ch.offset);
        }
    }
    if ops {
        let ids: Vec<&str> = space.composite_op_ids().collect();
        println!("    ops: {}", ids.join(", "));
    }
}
