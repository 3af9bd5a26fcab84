//! Performance capture — saves upcoming performances the user announces.
//!
//! Blocking variant: the extraction runs on the background runner, but the
//! advisor waits for it, bounded by the retry policy's worst case. When a
//! performance is saved the turn ends with a fixed acknowledgement instead of
//! a model reply; otherwise the chain continues as if this advisor were
//! absent. The record is saved on the turn itself, so an extraction that
//! outlives its bound is aborted and leaves nothing behind.

use crate::advisor::{AdvisedRequest, AdvisedResponse, Advisor, Next, keys};
use crate::background::TaskRunner;
use crate::extract::{BasisExtractor, default_extractor};
use crate::model::AdvisorModel;
use crate::prompts;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use maestro_config::default_acknowledgement;
use maestro_core::catalog::Performance;
use maestro_core::error::Error;
use maestro_core::event::{DomainEvent, EventBus};
use maestro_core::record::RecordStore;
use maestro_core::Result;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Slack on top of the retry policy's worst case for task scheduling.
const SCHEDULING_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
struct PerformanceExtraction {
    #[serde(default)]
    work: Option<String>,
    #[serde(default)]
    composer: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl PerformanceExtraction {
    /// A record when every field is present and the date parses.
    fn performance(&self) -> Option<Performance> {
        let work = non_blank(self.work.as_deref())?;
        let composer = non_blank(self.composer.as_deref())?;
        let date = parse_date(non_blank(self.date.as_deref())?)?;
        Some(Performance::new(work, composer, date))
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Fill `{work}`, `{composer}` and `{date}` in `template`.
pub fn render_acknowledgement(template: &str, performance: &Performance) -> String {
    template
        .replace("{work}", &performance.work)
        .replace("{composer}", &performance.composer)
        .replace("{date}", &performance.date.format("%Y-%m-%d").to_string())
}

#[derive(Clone)]
struct Shared {
    model: AdvisorModel,
    retry: RetryPolicy,
    extractor: BasisExtractor,
    today: Arc<dyn Fn() -> NaiveDate + Send + Sync>,
}

/// Extracts `{work, composer, date}` from the user text and saves it.
pub struct PerformanceCaptureAdvisor {
    shared: Arc<Shared>,
    performances: Arc<dyn RecordStore<Performance>>,
    events: Option<Arc<EventBus>>,
    runner: TaskRunner,
    acknowledgement: String,
    order: i32,
}

impl PerformanceCaptureAdvisor {
    pub const DEFAULT_ORDER: i32 = 10;

    pub fn new(
        model: AdvisorModel,
        performances: Arc<dyn RecordStore<Performance>>,
        runner: TaskRunner,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                model,
                retry: RetryPolicy::default(),
                extractor: default_extractor(),
                today: Arc::new(|| Utc::now().date_naive()),
            }),
            performances,
            events: None,
            runner,
            acknowledgement: default_acknowledgement(),
            order: Self::DEFAULT_ORDER,
        }
    }

    fn shared_mut(&mut self) -> &mut Shared {
        Arc::make_mut(&mut self.shared)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.shared_mut().retry = retry;
        self
    }

    pub fn with_extractor(mut self, extractor: BasisExtractor) -> Self {
        self.shared_mut().extractor = extractor;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Date used to resolve relative dates such as "next Friday".
    pub fn with_today(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.shared_mut().today = Arc::new(today);
        self
    }

    pub fn with_acknowledgement(mut self, template: impl Into<String>) -> Self {
        self.acknowledgement = template.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// How long the turn may wait for the extraction.
    fn wait_bound(&self) -> Option<Duration> {
        self.shared
            .retry
            .worst_case_duration()
            .and_then(|d| d.checked_add(SCHEDULING_GRACE))
    }

    async fn save(&self, performance: Performance) -> Option<Performance> {
        let saved = match self.performances.save(performance).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Failed to save performance, continuing without it");
                return None;
            }
        };
        info!(id = ?saved.id, work = %saved.work, composer = %saved.composer, date = %saved.date, "Adding performance");

        if let Some(events) = &self.events {
            events.publish(DomainEvent::PerformanceSaved {
                id: saved.id.clone().unwrap_or_default(),
                work: saved.work.clone(),
                composer: saved.composer.clone(),
                date: saved.date,
                timestamp: Utc::now(),
            });
        }
        Some(saved)
    }
}

impl Shared {
    async fn extract_performance(&self, basis: &str, today: NaiveDate) -> Result<Option<Performance>> {
        let extraction: PerformanceExtraction = self
            .model
            .ask("", &prompts::save_performance(basis, today), prompts::performance_schema())
            .await?;

        let performance = extraction.performance();
        if performance.is_none() {
            info!(?extraction, "No complete performance in content");
        }
        Ok(performance)
    }

    async fn capture(self: Arc<Self>, basis: String) -> Result<Option<Performance>> {
        let today = (self.today)();
        let this = self.as_ref();
        let basis = basis.as_str();
        this.retry
            .execute("performance_capture", move || this.extract_performance(basis, today))
            .await
            .inspect_err(|e: &Error| {
                error!(error = %e, "Model kept failing to extract performance, giving up");
            })
    }
}

#[async_trait]
impl Advisor for PerformanceCaptureAdvisor {
    fn name(&self) -> &str {
        "performance_capture"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn advise(&self, request: AdvisedRequest, next: Next<'_>) -> Result<AdvisedResponse> {
        let basis = (self.shared.extractor)(&request);
        if basis.trim().is_empty() {
            return next.run(request).await;
        }

        let handle = self
            .runner
            .spawn_awaited("performance_capture", Arc::clone(&self.shared).capture(basis));

        let extracted = match self.wait_bound() {
            Some(bound) => handle.outcome_within(bound).await,
            None => handle.outcome().await,
        };
        let saved = match extracted.flatten() {
            Some(performance) => self.save(performance).await,
            None => None,
        };

        match saved {
            Some(performance) => {
                let reply = render_acknowledgement(&self.acknowledgement, &performance);
                let id = performance.id.unwrap_or_default();
                Ok(AdvisedResponse::canned(reply, &request).with_context(keys::PERFORMANCE_ID, id))
            }
            None => next.run(request).await,
        }
    }
}
