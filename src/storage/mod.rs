//! Persistence layer.
//!
//! Saves and loads the whole engine (chain clock, token balances, oracle,
//! vault and market) as a pretty-printed JSON snapshot.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::Engine;

/// Default snapshot path.
pub const DEFAULT_STATE_FILE: &str = "binary_options_state.json";

/// Save the engine to a JSON file.
pub fn save_engine(engine: &Engine, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(engine)
        .context("Failed to serialise engine")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write state to {path}"))?;

    debug!(path, block = engine.block_number(), ticks = engine.ticks, "State saved");
    Ok(())
}

/// Load the engine from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_engine(path: Option<&str>) -> Result<Option<Engine>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {path}"))?;

    let engine: Engine = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse state from {path}"))?;

    if let Err(violation) = engine
        .vault
        .check_invariants()
        .and_then(|_| engine.vault.check_solvency(&engine.token))
    {
        anyhow::bail!("Snapshot {path} has an inconsistent vault: {violation}");
    }

    info!(
        path,
        block = engine.block_number(),
        ticks = engine.ticks,
        positions = engine.vault.total_supply(),
        "State loaded from disk"
    );

    Ok(Some(engine))
}

/// Delete the snapshot (for testing or reset).
pub fn delete_engine(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
