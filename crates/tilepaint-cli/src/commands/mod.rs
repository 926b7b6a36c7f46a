//! CLI command implementations

pub mod bench;
pub mod scenario;
pub mod spaces;

use anyhow::{Context, Result};
use std::path::Path;
use tilepaint_ops::{Engine, EngineConfig};
use tracing::debug;

/// Builds the engine from `--config`, or defaults.
///
/// A non-zero `--threads` also sizes the scheduler pool.
pub fn load_engine(config: Option<&Path>, threads: usize) -> Result<Engine> {
    let mut cfg = match config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if threads > 0 {
        cfg.worker_threads = threads;
    }
    debug!(?cfg, "engine configuration");
    Engine::new(cfg).context("Invalid engine configuration")
}

/// Formats a byte count for humans.
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats pixel bytes as a tuple of decimal bytes.
pub fn format_pixel(px: &[u8]) -> String {
    let parts: Vec<String> = px.iter().map(|b| b.to_string()).collect();
    format!("({})", parts.join(", "))
}
