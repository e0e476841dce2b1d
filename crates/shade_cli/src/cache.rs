//! `shade cache`: clear, compact or inspect the record directory.

use crate::{CacheAction, GlobalArgs};

/// Runs a cache action.
pub fn run(action: &CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let manager = global.open_manager()?;
    let directory = manager.config().cache_directory;
    match action {
        CacheAction::Clear => {
            let removed = manager.clear_cache()?;
            if !global.quiet {
                eprintln!("   Removed {removed} records from {}", directory.display());
            }
        }
        CacheAction::Compact => {
            let before = manager.cache_disk_usage()?.records;
            // Loading enforces the configured limits.
            manager.warm_cache()?;
            let after = manager.cache_disk_usage()?.records;
            if !global.quiet {
                eprintln!("   Evicted {} of {before} records", before.saturating_sub(after));
            }
        }
        CacheAction::Stats { json } => {
            let usage = manager.cache_disk_usage()?;
            let config = manager.config();
            if *json {
                let value = serde_json::json!({
                    "directory": directory,
                    "records": usage.records,
                    "bytes": usage.bytes,
                    "max_entries": config.max_cache_entries,
                    "max_memory_mb": config.max_cache_memory_mb,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("directory:   {}", directory.display());
                println!("records:     {} / {}", usage.records, config.max_cache_entries);
                println!("size:        {} bytes", usage.bytes);
            }
        }
    }
    Ok(0)
}
