//! `maestro popular` — The most-mentioned composers, instruments or performers.

use super::runtime::open_stores;
use maestro_config::AppConfig;
use maestro_core::catalog::MentionType;

pub async fn run(kind: &str, top: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let kind: MentionType = kind.parse()?;

    let stores = open_stores(&config).await?;
    let ranked = maestro_tools::popular_things(stores.mentions.as_ref(), kind, top).await?;

    println!("  Most mentioned ({kind}):");
    if ranked.is_empty() {
        println!("    none yet, run `maestro seed` and chat a little first");
    }
    for (i, mention) in ranked.iter().enumerate() {
        println!("  {:>3}. {:<20} {}", i + 1, mention.name, mention.count);
    }
    Ok(())
}
