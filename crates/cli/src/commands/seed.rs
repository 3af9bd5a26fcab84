//! `maestro seed` — Insert the default mention vocabulary.

use super::runtime::open_stores;
use maestro_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.store.backend == "memory" {
        println!("  The memory store does not outlive this command; seeding happens on `maestro chat`.");
        return Ok(());
    }

    let stores = open_stores(&config).await?;
    let inserted = maestro_memory::seed_mentions(stores.mentions.as_ref()).await?;
    if inserted == 0 {
        println!("  Mentions already present, nothing to seed.");
    } else {
        println!("  Seeded {inserted} mentions.");
    }
    Ok(())
}
