//! Configuration checking.

use std::path::Path;

use anyhow::{Context, Result};
use invigil_core::config::ProctorConfig;

/// Loads and validates a configuration file, printing the resolved form
/// with all defaults applied.
pub fn run(path: &Path) -> Result<()> {
    let config = ProctorConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    print!(
        "{}",
        config.to_toml().context("failed to render config")?
    );
    Ok(())
}
