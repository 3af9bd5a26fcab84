//! Startup data: the mention counter's vocabulary and the reference
//! documents retrieval draws on.

use maestro_core::catalog::{Mention, MentionType};
use maestro_core::error::{MemoryError, StoreError};
use maestro_core::memory::{MemoryBackend, MemoryNote};
use maestro_core::record::RecordStore;
use std::path::Path;
use tracing::{debug, info};

/// Metadata key naming the file a reference document came from.
pub const FILENAME_KEY: &str = "filename";

const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// The names tracked out of the box.
pub fn default_mentions() -> Vec<Mention> {
    use MentionType::*;
    [
        ("Brahms", Composer),
        ("Beethoven", Composer),
        ("Mozart", Composer),
        ("Chopin", Composer),
        ("Mahler", Composer),
        ("Piano", Instrument),
        ("Violin", Instrument),
        ("Cello", Instrument),
        ("Trumpet", Instrument),
        ("Ashkenazy", Performer),
        ("Callas", Performer),
    ]
    .into_iter()
    .map(|(name, kind)| Mention::new(name, kind))
    .collect()
}

/// Insert the default vocabulary if the store holds no mentions yet.
///
/// Returns the number of mentions inserted.
pub async fn seed_mentions(store: &dyn RecordStore<Mention>) -> Result<usize, StoreError> {
    if !store.find_all().await?.is_empty() {
        return Ok(0);
    }
    let saved = store.save_all(default_mentions()).await?;
    info!(count = saved.len(), store = store.name(), "Seeded mention vocabulary");
    Ok(saved.len())
}

/// Reference documents available without any configuration.
pub fn default_documents() -> Vec<MemoryNote> {
    [
        (
            "orchestra.md",
            "A symphony orchestra has four sections: strings, woodwinds, brass and percussion. \
             The strings are violins, violas, cellos and double basses, and usually sit at the front.",
        ),
        (
            "sonata-form.md",
            "Sonata form has three parts: the exposition presents two contrasting themes, the \
             development works them through distant keys, and the recapitulation returns both in the home key.",
        ),
        (
            "concert-etiquette.md",
            "At a classical concert the audience usually applauds after the last movement of a \
             symphony or concerto, not between movements. Arrive early; latecomers wait for a pause.",
        ),
        (
            "periods.md",
            "The common periods of classical music are Baroque (Bach, Handel), Classical (Haydn, Mozart), \
             Romantic (Beethoven's late works, Brahms, Chopin, Mahler) and Modern (Stravinsky, Shostakovich).",
        ),
    ]
    .into_iter()
    .map(|(file, text)| MemoryNote::new(text).with_metadata(FILENAME_KEY, file))
    .collect()
}

/// Read every `.txt` and `.md` file under `dir`, recursively, in name order.
pub fn read_documents(dir: &Path) -> Result<Vec<MemoryNote>, MemoryError> {
    let mut documents = Vec::new();
    collect_documents(dir, dir, &mut documents)?;
    Ok(documents)
}

fn collect_documents(root: &Path, dir: &Path, out: &mut Vec<MemoryNote>) -> Result<(), MemoryError> {
    let read_err = |e: std::io::Error| MemoryError::Storage(format!("{}: {e}", dir.display()));
    let mut entries = std::fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_documents(root, &path, out)?;
            continue;
        }
        let wanted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext));
        if !wanted {
            debug!(path = %path.display(), "Skipping non-text file");
            continue;
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| MemoryError::Storage(format!("{}: {e}", path.display())))?;
        if content.trim().is_empty() {
            continue;
        }
        let name = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        out.push(MemoryNote::new(content.trim()).with_metadata(FILENAME_KEY, name));
    }
    Ok(())
}

/// Add `documents` if the store holds no notes yet.
///
/// Returns the number of documents added.
pub async fn seed_documents(store: &dyn MemoryBackend, documents: Vec<MemoryNote>) -> Result<usize, MemoryError> {
    if store.count().await? > 0 {
        return Ok(0);
    }
    let total = documents.len();
    for document in documents {
        store.add(document).await?;
    }
    info!(count = total, store = store.name(), "Seeded reference documents");
    Ok(total)
}
