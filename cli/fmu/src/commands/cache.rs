//! `fmu cache` — list and clear extracted packages.

use anyhow::{Context, Result};
use fmu_import::ExtractionCache;

pub fn list(cache: &ExtractionCache) -> Result<()> {
    let entries = cache.list().context("listing the extraction cache")?;
    println!("Extraction cache: {}", cache.root().display());
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    println!();
    for entry in &entries {
        let source = entry
            .source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown source>".to_string());
        println!("  {}  {source}", entry.hash.short());
    }
    println!();
    println!("{} extracted package(s)", entries.len());
    Ok(())
}

pub fn clear(cache: &ExtractionCache) -> Result<()> {
    let removed = cache.clear().context("clearing the extraction cache")?;
    println!(
        "Removed {removed} extracted package(s) from {}",
        cache.root().display()
    );
    Ok(())
}
