//! One cycle, start to finish: Gate → Aggregate → Compose → Render →
//! Deliver. The engine owns the scheduling decision that follows.
//!
//! Steps with external effects (`fetch`, `compose`, `deliver`) consult
//! the step ledger first, so a retried run re-executes only what never
//! completed. The gate is deliberately not ledgered: activity must be
//! read fresh on every attempt.

use chrono::Local;
use gazette_core::GazetteConfig;
use gazette_core::error::Result;
use gazette_core::traits::{ContentSource, PreferenceStore, Summarizer, Transport};
use gazette_core::types::Article;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::{CycleJob, JobStore};

pub(crate) const STEP_FETCH: &str = "fetch";
pub(crate) const STEP_COMPOSE: &str = "compose";
pub(crate) const STEP_DELIVER: &str = "deliver";

/// How a cycle ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Delivery succeeded; the engine should schedule the next cycle.
    Completed { article_count: usize },
    /// The gate short-circuited the run; nothing was fetched or sent.
    Skipped { reason: String },
    /// A cancellation token was observed. Any delivery that already
    /// happened stands; only further scheduling is suppressed.
    Cancelled,
}

/// The cycle pipeline, wired to its collaborators.
pub struct Pipeline {
    source: Arc<dyn ContentSource>,
    summarizer: Arc<dyn Summarizer>,
    transport: Arc<dyn Transport>,
    prefs: Arc<dyn PreferenceStore>,
    config: GazetteConfig,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ContentSource>,
        summarizer: Arc<dyn Summarizer>,
        transport: Arc<dyn Transport>,
        prefs: Arc<dyn PreferenceStore>,
        config: GazetteConfig,
    ) -> Self {
        Self {
            source,
            summarizer,
            transport,
            prefs,
            config,
        }
    }

    /// Execute one claimed cycle.
    pub async fn run(&self, job: &CycleJob, store: &Arc<Mutex<JobStore>>) -> Result<CycleOutcome> {
        let trigger = &job.trigger;
        let run_id = &job.run_id;
        trigger.validate()?;

        // A token present at entry aborts before any work happens.
        if store.lock().await.consume_cancel(&trigger.user_id)? {
            tracing::info!("Cycle {run_id} cancelled before start");
            return Ok(CycleOutcome::Cancelled);
        }

        // Activity gate — read fresh; a read failure means skip, never
        // send to a possibly-unsubscribed user.
        match self.prefs.get(&trigger.user_id).await {
            Ok(Some(sub)) if sub.is_active => {}
            Ok(_) => {
                tracing::info!("Cycle {run_id} skipped: subscription inactive");
                return Ok(CycleOutcome::Skipped {
                    reason: "subscription inactive".into(),
                });
            }
            Err(e) => {
                tracing::warn!("Cycle {run_id}: preferences unavailable, skipping: {e}");
                return Ok(CycleOutcome::Skipped {
                    reason: "preferences unavailable".into(),
                });
            }
        }

        // Aggregate.
        let articles: Vec<Article> = match self.step(store, run_id, STEP_FETCH).await? {
            Some(output) => serde_json::from_str(&output).unwrap_or_default(),
            None => {
                let articles = gazette_sources::fetch_all(
                    self.source.as_ref(),
                    &trigger.categories,
                    self.config.news.lookback_days,
                    self.config.news.per_category,
                )
                .await;
                self.record(store, run_id, STEP_FETCH, &serde_json::to_string(&articles)?)
                    .await?;
                articles
            }
        };
        tracing::info!(
            "Cycle {run_id}: {} article(s) across {} categor(ies)",
            articles.len(),
            trigger.categories.len()
        );

        // Compose.
        let summary: String = match self.step(store, run_id, STEP_COMPOSE).await? {
            Some(output) => match serde_json::from_str::<String>(&output) {
                Ok(summary) => summary,
                Err(_) => output,
            },
            None => {
                let summary = gazette_digest::compose(
                    self.summarizer.as_ref(),
                    &trigger.categories,
                    &articles,
                )
                .await?;
                self.record(store, run_id, STEP_COMPOSE, &serde_json::to_string(&summary)?)
                    .await?;
                summary
            }
        };

        // Render — pure, nothing to ledger.
        let rendered = gazette_digest::render(
            &summary,
            &trigger.email,
            &trigger.categories,
            articles.len(),
            Local::now(),
        );

        // Deliver — the one step where re-execution has a visible cost.
        if self.step(store, run_id, STEP_DELIVER).await?.is_none() {
            self.transport.send(&rendered).await?;
            self.record(store, run_id, STEP_DELIVER, "\"sent\"").await?;
        } else {
            tracing::info!("Cycle {run_id}: delivery already recorded, not re-sending");
        }

        // Last checkpoint before the scheduling decision. The email
        // above stands either way.
        if store.lock().await.consume_cancel(&trigger.user_id)? {
            tracing::info!("Cycle {run_id} cancelled after delivery; not rescheduling");
            return Ok(CycleOutcome::Cancelled);
        }

        Ok(CycleOutcome::Completed {
            article_count: articles.len(),
        })
    }

    async fn step(
        &self,
        store: &Arc<Mutex<JobStore>>,
        run_id: &str,
        step: &str,
    ) -> Result<Option<String>> {
        store.lock().await.step_output(run_id, step)
    }

    async fn record(
        &self,
        store: &Arc<Mutex<JobStore>>,
        run_id: &str,
        step: &str,
        output: &str,
    ) -> Result<()> {
        store.lock().await.record_step(run_id, step, output)
    }
}
