//! Wiring shared by the commands: stores, providers and the event listener.

use maestro_agent::{ChatOrchestrator, Components};
use maestro_config::AppConfig;
use maestro_core::catalog::{Mention, Performance};
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::memory::MemoryBackend;
use maestro_core::record::RecordStore;
use maestro_memory::{InMemoryBackend, InMemoryChatMemory, InMemoryRecordStore, SqliteRecordStore, VectorMemory};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The record stores selected by `[store]`, plus the note store selected by `[retrieval]`.
pub struct Stores {
    pub mentions: Arc<dyn RecordStore<Mention>>,
    pub performances: Arc<dyn RecordStore<Performance>>,
    pub notes: Arc<dyn MemoryBackend>,
}

/// Notes are embedded by the advisor endpoint, or keyword-scored when no
/// embedding model is configured.
fn open_notes(config: &AppConfig) -> Arc<dyn MemoryBackend> {
    match config.retrieval.embedding_model() {
        Some(model) => {
            let embedder = maestro_providers::build_provider(&config.advisor_model, config.api_key.as_deref());
            info!(model, "Notes searched by embedding");
            Arc::new(VectorMemory::new(embedder, model))
        }
        None => {
            info!("Notes searched by keyword");
            Arc::new(InMemoryBackend::new())
        }
    }
}

pub async fn open_stores(config: &AppConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    let notes = open_notes(config);
    match config.store.backend.as_str() {
        "memory" => Ok(Stores {
            mentions: Arc::new(InMemoryRecordStore::<Mention>::new()),
            performances: Arc::new(InMemoryRecordStore::<Performance>::new()),
            notes,
        }),
        "sqlite" => {
            let path = config.store_path();
            if let Some(file) = path.strip_prefix("sqlite://")
                && let Some(dir) = std::path::Path::new(file).parent()
            {
                std::fs::create_dir_all(dir)?;
            }
            let pool = maestro_memory::sqlite::open_pool(&path).await?;
            info!(path = %path, "Opened SQLite store");
            Ok(Stores {
                mentions: Arc::new(SqliteRecordStore::<Mention>::from_pool(pool.clone()).await?),
                performances: Arc::new(SqliteRecordStore::<Performance>::from_pool(pool).await?),
                notes,
            })
        }
        other => Err(format!("Unknown store backend '{other}' (expected memory or sqlite)").into()),
    }
}

/// Insert the default mentions and the reference documents into empty stores.
///
/// Documents come from `retrieval.documents_dir` when set, otherwise the
/// built-in set. Failing to embed them leaves retrieval empty but is not fatal.
pub async fn seed_stores(config: &AppConfig, stores: &Stores) -> Result<(), Box<dyn std::error::Error>> {
    let seeded = maestro_memory::seed_mentions(stores.mentions.as_ref()).await?;
    if seeded > 0 {
        info!(seeded, "Seeded default mentions");
    }

    let documents = match &config.retrieval.documents_dir {
        Some(dir) => maestro_memory::read_documents(Path::new(dir))?,
        None => maestro_memory::default_documents(),
    };
    if let Err(e) = maestro_memory::seed_documents(stores.notes.as_ref(), documents).await {
        warn!(error = %e, "Could not seed reference documents, retrieval starts empty");
    }
    Ok(())
}

/// Build the orchestrator with everything `config` asks for.
pub fn build_orchestrator(config: &AppConfig, stores: &Stores, events: Arc<EventBus>) -> ChatOrchestrator {
    let api_key = config.api_key.as_deref();
    let primary = maestro_providers::build_provider(&config.primary, api_key);
    let advisor = maestro_providers::build_provider(&config.advisor_model, api_key);

    let components = Components {
        primary,
        advisor,
        mentions: stores.mentions.clone(),
        performances: stores.performances.clone(),
        notes: stores.notes.clone(),
        chat_memory: Arc::new(InMemoryChatMemory::new().with_max_messages(config.chat_memory.retrieve_size)),
        events,
        tools: Arc::new(maestro_tools::default_registry(stores.mentions.clone())),
    };
    ChatOrchestrator::from_config(config, components)
}

/// Log domain events as they arrive, until the bus is dropped.
pub fn spawn_event_listener(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::MentionObserved { name, kind, .. } => info!(%name, %kind, "Mention observed"),
        DomainEvent::MemoryCaptured { note_id, .. } => debug!(%note_id, "Memory captured"),
        DomainEvent::PerformanceSaved { work, composer, date, .. } => {
            info!(%work, %composer, %date, "Performance saved")
        }
        DomainEvent::TopicBlocked { topic, .. } => info!(?topic, "Topic blocked"),
        DomainEvent::ResponseGenerated { model, tokens_used, .. } => {
            debug!(%model, tokens_used, "Response generated")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::catalog::MentionType;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn memory_backend_opens() {
        let stores = open_stores(&memory_config()).await.unwrap();
        assert!(stores.mentions.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_backend_opens_in_memory() {
        let mut config = AppConfig::default();
        config.store.backend = "sqlite".into();
        config.store.path = Some("sqlite::memory:".into());

        let stores = open_stores(&config).await.unwrap();
        stores.mentions.save(Mention::new("Brahms", MentionType::Composer)).await.unwrap();
        assert_eq!(stores.mentions.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "cassandra".into();
        assert!(open_stores(&config).await.is_err());
    }

    #[tokio::test]
    async fn notes_follow_retrieval_config() {
        let stores = open_stores(&memory_config()).await.unwrap();
        assert_eq!(stores.notes.name(), "vector");

        let mut config = memory_config();
        config.retrieval.embedding_model = String::new();
        let stores = open_stores(&config).await.unwrap();
        assert_eq!(stores.notes.name(), "in_memory");
    }

    #[tokio::test]
    async fn keyword_stores_are_seeded_with_documents() {
        let mut config = memory_config();
        config.retrieval.embedding_model = String::new();
        let stores = open_stores(&config).await.unwrap();

        seed_stores(&config, &stores).await.unwrap();

        assert_eq!(stores.mentions.find_all().await.unwrap().len(), 11);
        assert_eq!(
            stores.notes.count().await.unwrap(),
            maestro_memory::default_documents().len()
        );
    }

    #[tokio::test]
    async fn orchestrator_builds_from_defaults() {
        let config = memory_config();
        let stores = open_stores(&config).await.unwrap();
        let orchestrator = build_orchestrator(&config, &stores, Arc::new(EventBus::default()));
        assert_eq!(orchestrator.chain().len(), 7);
    }

    #[tokio::test]
    async fn listener_stops_when_bus_is_dropped() {
        let events = EventBus::default();
        let listener = spawn_event_listener(&events);
        events.publish(DomainEvent::MentionObserved {
            name: "Brahms".into(),
            kind: MentionType::Composer,
            timestamp: chrono::Utc::now(),
        });
        drop(events);
        listener.await.unwrap();
    }
}
