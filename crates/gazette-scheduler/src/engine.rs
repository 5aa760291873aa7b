//! Schedule Engine — claims due triggers, runs cycles, and decides what
//! happens next: reschedule on success, retry with backoff on a
//! retryable failure, go quiet on skip/cancel/fatal failure.
//!
//! A failed cycle deliberately does NOT reschedule itself: a broken
//! pipeline should surface to the operator instead of stacking retried
//! cycles into the future.

use chrono::{Local, Utc};
use gazette_core::config::SchedulerConfig;
use gazette_core::error::Result;
use gazette_core::traits::PreferenceStore;
use gazette_core::types::{CycleResult, CycleTrigger, SCHEDULE_DELETED_EVENT, SCHEDULE_EVENT};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use crate::pipeline::{CycleOutcome, Pipeline, STEP_DELIVER};
use crate::schedule::compute_next;
use crate::store::{CycleJob, CycleStatus, JobStore};

/// The engine. One per process; cycles for different users run
/// concurrently under the semaphore, same-user cycles are serialized by
/// the one-live-trigger-per-user invariant of the store.
pub struct ScheduleEngine {
    store: Arc<Mutex<JobStore>>,
    pipeline: Arc<Pipeline>,
    prefs: Arc<dyn PreferenceStore>,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
}

impl ScheduleEngine {
    pub fn new(
        store: Arc<Mutex<JobStore>>,
        pipeline: Pipeline,
        prefs: Arc<dyn PreferenceStore>,
        config: SchedulerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            store,
            pipeline: Arc::new(pipeline),
            prefs,
            config,
            semaphore,
        }
    }

    /// Shared handle to the trigger store (status views, tests).
    pub fn store(&self) -> Arc<Mutex<JobStore>> {
        self.store.clone()
    }

    /// Consume a `newsletter.schedule` event: queue one cycle. Returns
    /// the assigned runId, or None when the user already has a live
    /// cycle.
    pub async fn submit(&self, trigger: CycleTrigger) -> Result<Option<String>> {
        trigger.validate()?;
        let queued = self.store.lock().await.enqueue(&trigger)?;
        if let Some(run_id) = &queued {
            tracing::info!(
                "📅 {SCHEDULE_EVENT}: cycle {run_id} queued for {} ({})",
                trigger.user_id,
                trigger
                    .scheduled_for
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "now".into())
            );
        }
        Ok(queued)
    }

    /// Consume a `newsletter.schedule.deleted` event: cancel whatever
    /// cycle — pending or in-flight — currently exists for the user.
    pub async fn cancel(&self, user_id: &str) -> Result<()> {
        let store = self.store.lock().await;
        if store.cancel_pending(user_id)? {
            tracing::info!("🛑 {SCHEDULE_DELETED_EVENT}: pending cycle cancelled for {user_id}");
            return Ok(());
        }
        // No pending row — a live row now can only be running.
        match store.live_job(user_id)? {
            Some(job) => {
                store.request_cancel(user_id)?;
                tracing::info!(
                    "🛑 {SCHEDULE_DELETED_EVENT}: cancellation requested for in-flight cycle {}",
                    job.run_id
                );
            }
            None => {
                tracing::debug!("{SCHEDULE_DELETED_EVENT}: no live cycle for {user_id}");
            }
        }
        Ok(())
    }

    /// Re-seed a user whose subscription was just reactivated: build a
    /// fresh trigger from the *current* stored preferences, scheduled a
    /// full interval out. No-op if the user is unknown, inactive, or
    /// already has a live cycle.
    pub async fn reactivate(&self, user_id: &str) -> Result<Option<String>> {
        let Some(sub) = self.prefs.get(user_id).await? else {
            tracing::warn!("Reactivation requested for unknown user {user_id}");
            return Ok(None);
        };
        if !sub.is_active {
            tracing::debug!("Reactivation requested but {user_id} is inactive");
            return Ok(None);
        }
        let next = compute_next(Local::now(), sub.frequency).with_timezone(&Utc);
        self.submit(CycleTrigger {
            user_id: sub.user_id,
            email: sub.email,
            categories: sub.categories,
            frequency: sub.frequency,
            scheduled_for: Some(next),
        })
        .await
    }

    /// Re-queue cycles left running by a previous process. The step
    /// ledger makes their re-execution safe.
    pub async fn recover(&self) -> Result<usize> {
        let n = self.store.lock().await.recover_running()?;
        if n > 0 {
            tracing::info!("🔄 Recovered {n} interrupted cycle(s)");
        }
        Ok(n)
    }

    /// One engine tick: claim every due trigger and run the cycles to
    /// completion. Returns the terminal results (retried cycles report
    /// nothing until they finish for good).
    pub async fn tick(&self) -> Vec<CycleResult> {
        let due = match self.store.lock().await.claim_due(Utc::now()) {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!("Claiming due cycles failed: {e}");
                return Vec::new();
            }
        };
        if due.is_empty() {
            return Vec::new();
        }
        tracing::info!("🔔 Claimed {} due cycle(s)", due.len());

        let runs = due.into_iter().map(|job| self.run_job(job));
        futures::future::join_all(runs)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn run_job(&self, job: CycleJob) -> Option<CycleResult> {
        let _permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let user_id = job.trigger.user_id.clone();
        tracing::info!("▶️ Cycle {} started for {user_id}", job.run_id);

        match self.pipeline.run(&job, &self.store).await {
            Ok(CycleOutcome::Completed { article_count }) => {
                let next_at = compute_next(Local::now(), job.trigger.frequency).with_timezone(&Utc);
                let next_trigger = CycleTrigger {
                    scheduled_for: Some(next_at),
                    ..job.trigger.clone()
                };

                let store = self.store.lock().await;
                log_store(store.mark(&job.run_id, CycleStatus::Completed, None));
                log_store(store.clear_steps(&job.run_id));
                log_store(store.clear_cancel(&user_id));
                let queued = store.enqueue(&next_trigger).unwrap_or_else(|e| {
                    tracing::warn!("Failed to queue next cycle for {user_id}: {e}");
                    None
                });
                if let Some(next_id) = &queued {
                    tracing::info!(
                        "📅 {SCHEDULE_EVENT}: next cycle {next_id} for {user_id} at {next_at}"
                    );
                }

                Some(CycleResult {
                    run_id: job.run_id,
                    user_id,
                    article_count,
                    email_sent: true,
                    next_scheduled: queued.is_some(),
                    skipped: false,
                    skip_reason: None,
                })
            }
            Ok(CycleOutcome::Skipped { reason }) => {
                let store = self.store.lock().await;
                log_store(store.mark(&job.run_id, CycleStatus::Skipped, None));
                log_store(store.clear_steps(&job.run_id));
                log_store(store.clear_cancel(&user_id));

                Some(CycleResult {
                    run_id: job.run_id,
                    user_id,
                    article_count: 0,
                    email_sent: false,
                    next_scheduled: false,
                    skipped: true,
                    skip_reason: Some(reason),
                })
            }
            Ok(CycleOutcome::Cancelled) => {
                let store = self.store.lock().await;
                // A delivery that happened before the token was seen
                // stands; report it truthfully.
                let email_sent = store
                    .step_output(&job.run_id, STEP_DELIVER)
                    .ok()
                    .flatten()
                    .is_some();
                log_store(store.mark(&job.run_id, CycleStatus::Cancelled, None));
                log_store(store.clear_steps(&job.run_id));

                Some(CycleResult {
                    run_id: job.run_id,
                    user_id,
                    article_count: 0,
                    email_sent,
                    next_scheduled: false,
                    skipped: false,
                    skip_reason: None,
                })
            }
            Err(e) if e.is_retryable() && job.attempts + 1 < self.config.max_attempts => {
                let at = Utc::now() + chrono::Duration::seconds(self.config.retry_backoff_secs as i64);
                tracing::warn!(
                    "⚠️ Cycle {} for {user_id} failed (attempt {}), retrying at {at}: {e}",
                    job.run_id,
                    job.attempts + 1
                );
                log_store(self.store.lock().await.requeue(&job.run_id, at, &e.to_string()));
                None
            }
            Err(e) => {
                tracing::error!("❌ Cycle {} for {user_id} failed permanently: {e}", job.run_id);
                let store = self.store.lock().await;
                log_store(store.mark(&job.run_id, CycleStatus::Failed, Some(&e.to_string())));
                log_store(store.clear_steps(&job.run_id));
                log_store(store.clear_cancel(&user_id));

                Some(CycleResult {
                    run_id: job.run_id,
                    user_id,
                    article_count: 0,
                    email_sent: false,
                    next_scheduled: false,
                    skipped: false,
                    skip_reason: None,
                })
            }
        }
    }
}

fn log_store<T>(result: Result<T>) {
    if let Err(e) = result {
        tracing::warn!("Store update failed: {e}");
    }
}

/// Run the engine loop until the process exits.
pub async fn run(engine: Arc<ScheduleEngine>) {
    tracing::info!(
        "⏰ Schedule engine started (tick every {}s)",
        engine.config.tick_secs
    );
    if let Err(e) = engine.recover().await {
        tracing::warn!("Startup recovery failed: {e}");
    }

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(engine.config.tick_secs));
    loop {
        interval.tick().await;
        for result in engine.tick().await {
            tracing::info!(
                "Cycle {} for {}: sent={} next={} skipped={}",
                result.run_id,
                result.user_id,
                result.email_sent,
                result.next_scheduled,
                result.skipped
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Datelike, Duration, Timelike};
    use gazette_core::GazetteConfig;
    use gazette_core::error::GazetteError;
    use gazette_core::traits::{ContentSource, Summarizer, Transport};
    use gazette_core::types::{Article, Frequency, RenderedEmail, Subscription};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemPrefs {
        subs: StdMutex<HashMap<String, Subscription>>,
        fail_reads: AtomicBool,
    }

    impl MemPrefs {
        fn insert(&self, sub: Subscription) {
            self.subs.lock().unwrap().insert(sub.user_id.clone(), sub);
        }
    }

    #[async_trait]
    impl PreferenceStore for MemPrefs {
        async fn get(&self, user_id: &str) -> Result<Option<Subscription>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(GazetteError::Preferences("store down".into()));
            }
            Ok(self.subs.lock().unwrap().get(user_id).cloned())
        }

        async fn set_active(&self, user_id: &str, active: bool) -> Result<()> {
            if let Some(sub) = self.subs.lock().unwrap().get_mut(user_id) {
                sub.is_active = active;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for CountingSource {
        async fn fetch(&self, category: &str, _since: DateTime<Utc>) -> Result<Vec<Article>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..2)
                .map(|i| Article {
                    title: format!("{category} story {i}"),
                    url: format!("https://example.com/{category}/{i}"),
                    description: "desc".into(),
                })
                .collect())
        }
    }

    struct StubSummarizer {
        calls: AtomicUsize,
        output: String,
    }

    impl StubSummarizer {
        fn new(output: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                output: output.into(),
            }
        }
    }

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    /// Transport that fails the first `fail_first` sends, then records.
    struct FlakyTransport {
        calls: AtomicUsize,
        fail_first: usize,
        sent: StdMutex<Vec<RenderedEmail>>,
    }

    impl FlakyTransport {
        fn new(fail_first: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
                sent: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, email: &RenderedEmail) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(GazetteError::Delivery("transport error 502".into()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct Harness {
        engine: ScheduleEngine,
        store: Arc<Mutex<JobStore>>,
        prefs: Arc<MemPrefs>,
        source: Arc<CountingSource>,
        summarizer: Arc<StubSummarizer>,
        transport: Arc<FlakyTransport>,
        config: GazetteConfig,
        path: PathBuf,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            std::fs::remove_file(&self.path).ok();
        }
    }

    fn harness(summary: &str, fail_deliveries: usize) -> Harness {
        let path =
            std::env::temp_dir().join(format!("gazette-engine-{}.db", uuid::Uuid::new_v4()));
        let store = Arc::new(Mutex::new(JobStore::open(&path).unwrap()));
        let prefs = Arc::new(MemPrefs::default());
        let source = Arc::new(CountingSource::default());
        let summarizer = Arc::new(StubSummarizer::new(summary));
        let transport = Arc::new(FlakyTransport::new(fail_deliveries));

        let mut config = GazetteConfig::default();
        config.scheduler.retry_backoff_secs = 0;
        config.scheduler.max_attempts = 3;

        let pipeline = Pipeline::new(
            source.clone(),
            summarizer.clone(),
            transport.clone(),
            prefs.clone(),
            config.clone(),
        );
        let engine = ScheduleEngine::new(
            store.clone(),
            pipeline,
            prefs.clone(),
            config.scheduler.clone(),
        );

        Harness {
            engine,
            store,
            prefs,
            source,
            summarizer,
            transport,
            config,
            path,
        }
    }

    fn active_sub(user: &str, frequency: Frequency) -> Subscription {
        Subscription {
            user_id: user.into(),
            email: format!("{user}@x.com"),
            categories: vec!["technology".into(), "science".into()],
            frequency,
            is_active: true,
        }
    }

    fn trigger_for(sub: &Subscription) -> CycleTrigger {
        CycleTrigger {
            user_id: sub.user_id.clone(),
            email: sub.email.clone(),
            categories: sub.categories.clone(),
            frequency: sub.frequency,
            scheduled_for: None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_success_daily() {
        let h = harness("# Your Digest\n\nGreat stories.", 0);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        let results = h.engine.tick().await;
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.email_sent);
        assert!(result.next_scheduled);
        assert!(!result.skipped);
        // 2 categories × 2 articles each.
        assert_eq!(result.article_count, 4);

        let sent = h.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "u1@x.com");
        assert_eq!(sent[0].categories, "technology, science");
        assert_eq!(sent[0].article_count, 4);
        assert!(sent[0].content.contains("<h1>Your Digest</h1>"));
        drop(sent);

        // The emitted next trigger reconstructs the same subscription,
        // scheduled a day out at 09:00 local.
        let next = h.store.lock().await.live_job("u1").unwrap().unwrap();
        assert_eq!(next.status, CycleStatus::Pending);
        assert_eq!(next.trigger.user_id, sub.user_id);
        assert_eq!(next.trigger.email, sub.email);
        assert_eq!(next.trigger.categories, sub.categories);
        assert_eq!(next.trigger.frequency, sub.frequency);

        let at = next.trigger.scheduled_for.unwrap().with_timezone(&Local);
        assert_eq!((at.hour(), at.minute(), at.second()), (9, 0, 0));
        let tomorrow = (Local::now() + Duration::days(1)).date_naive();
        assert_eq!(at.date_naive(), tomorrow);
    }

    #[tokio::test]
    async fn test_inactive_subscription_skips_without_side_effects() {
        let h = harness("digest", 0);
        let mut sub = active_sub("u1", Frequency::Weekly);
        sub.is_active = false;
        h.prefs.insert(sub.clone());
        h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        let results = h.engine.tick().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].skipped);
        assert_eq!(results[0].skip_reason.as_deref(), Some("subscription inactive"));
        assert!(!results[0].email_sent);
        assert!(!results[0].next_scheduled);

        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.lock().await.live_job("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preferences_read_failure_fails_safe() {
        let h = harness("digest", 0);
        let sub = active_sub("u1", Frequency::Weekly);
        h.prefs.insert(sub.clone());
        h.prefs.fail_reads.store(true, Ordering::SeqCst);
        h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        let results = h.engine.tick().await;
        assert!(results[0].skipped);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_pending_cycle_never_runs() {
        let h = harness("digest", 0);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        let run_id = h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        h.engine.cancel("u1").await.unwrap();

        let results = h.engine.tick().await;
        assert!(results.is_empty());
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);

        let job = h.store.lock().await.get(&run_id).unwrap().unwrap();
        assert_eq!(job.status, CycleStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_token_observed_at_cycle_entry() {
        let h = harness("digest", 0);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        // The deleted-event lands after the claim: pending row is gone,
        // so only a token can reach the in-flight run.
        let job = {
            let store = h.store.lock().await;
            let claimed = store.claim_due(Utc::now()).unwrap();
            store.request_cancel("u1").unwrap();
            claimed.into_iter().next().unwrap()
        };

        let pipeline = Pipeline::new(
            h.source.clone(),
            h.summarizer.clone(),
            h.transport.clone(),
            h.prefs.clone(),
            h.config.clone(),
        );
        let outcome = pipeline.run(&job, &h.store).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        // Token was consumed.
        assert!(!h.store.lock().await.consume_cancel("u1").unwrap());
    }

    /// Transport that files a cancellation while the send is in flight.
    struct CancellingTransport {
        store: Arc<Mutex<JobStore>>,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CancellingTransport {
        async fn send(&self, email: &RenderedEmail) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            let user = email.to.split('@').next().unwrap_or_default().to_string();
            self.store.lock().await.request_cancel(&user)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_after_delivery_keeps_email_suppresses_reschedule() {
        let path =
            std::env::temp_dir().join(format!("gazette-engine-{}.db", uuid::Uuid::new_v4()));
        let store = Arc::new(Mutex::new(JobStore::open(&path).unwrap()));
        let prefs = Arc::new(MemPrefs::default());
        let transport = Arc::new(CancellingTransport {
            store: store.clone(),
            sent: AtomicUsize::new(0),
        });
        let config = GazetteConfig::default();
        let pipeline = Pipeline::new(
            Arc::new(CountingSource::default()),
            Arc::new(StubSummarizer::new("digest")),
            transport.clone(),
            prefs.clone(),
            config.clone(),
        );
        let engine =
            ScheduleEngine::new(store.clone(), pipeline, prefs.clone(), config.scheduler);

        let sub = active_sub("u1", Frequency::Daily);
        prefs.insert(sub.clone());
        let run_id = engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        let results = engine.tick().await;
        assert_eq!(results.len(), 1);
        // The email went out and is reported, but no next cycle exists.
        assert!(results[0].email_sent);
        assert!(!results[0].next_scheduled);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);

        let store_guard = store.lock().await;
        assert_eq!(store_guard.get(&run_id).unwrap().unwrap().status, CycleStatus::Cancelled);
        assert!(store_guard.live_job("u1").unwrap().is_none());
        drop(store_guard);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_empty_generation_fails_without_delivery() {
        let h = harness("   ", 0);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        let run_id = h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        let results = h.engine.tick().await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].email_sent);
        assert!(!results[0].next_scheduled);
        assert!(!results[0].skipped);

        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        let store = h.store.lock().await;
        assert_eq!(store.get(&run_id).unwrap().unwrap().status, CycleStatus::Failed);
        assert!(store.live_job("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delivery_retry_skips_completed_steps() {
        let h = harness("digest", 1);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        let run_id = h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        // First attempt: delivery fails, cycle re-queued with backoff 0.
        let results = h.engine.tick().await;
        assert!(results.is_empty());
        let job = h.store.lock().await.get(&run_id).unwrap().unwrap();
        assert_eq!(job.status, CycleStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 1);
        let fetches = h.source.calls.load(Ordering::SeqCst);
        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 1);

        // Second attempt: fetch and compose come from the ledger; only
        // the send re-executes. Same runId completes.
        let results = h.engine.tick().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].run_id, run_id);
        assert!(results[0].email_sent);
        assert!(results[0].next_scheduled);
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.transport.sent.lock().unwrap().len(), 1);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), fetches);
        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delivery_exhaustion_ends_failed() {
        let h = harness("digest", 99);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        let run_id = h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        assert!(h.engine.tick().await.is_empty());
        assert!(h.engine.tick().await.is_empty());
        let results = h.engine.tick().await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].email_sent);
        assert!(!results[0].next_scheduled);

        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 3);
        let store = h.store.lock().await;
        let job = store.get(&run_id).unwrap().unwrap();
        assert_eq!(job.status, CycleStatus::Failed);
        assert!(job.last_error.unwrap().contains("transport error"));
        assert!(store.live_job("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledgered_delivery_is_not_resent() {
        let h = harness("digest", 0);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();

        // Simulate a crash after deliver but before reschedule: the
        // step is ledgered, the cycle is back in the queue.
        let job = {
            let store = h.store.lock().await;
            let job = store.claim_due(Utc::now()).unwrap().pop().unwrap();
            store
                .record_step(&job.run_id, STEP_DELIVER, "\"sent\"")
                .unwrap();
            job
        };

        let pipeline = Pipeline::new(
            h.source.clone(),
            h.summarizer.clone(),
            h.transport.clone(),
            h.prefs.clone(),
            h.config.clone(),
        );
        let outcome = pipeline.run(&job, &h.store).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reactivation_seeds_pending_cycle() {
        let h = harness("digest", 0);
        let sub = active_sub("u1", Frequency::Biweekly);
        h.prefs.insert(sub.clone());

        let run_id = h.engine.reactivate("u1").await.unwrap().unwrap();
        let job = h.store.lock().await.get(&run_id).unwrap().unwrap();
        assert_eq!(job.status, CycleStatus::Pending);
        assert_eq!(job.trigger.categories, sub.categories);

        // Scheduled a full (3-day) interval out, at 09:00 local.
        let at = job.trigger.scheduled_for.unwrap().with_timezone(&Local);
        assert_eq!(at.hour(), 9);
        assert_eq!(at.date_naive(), (Local::now() + Duration::days(3)).date_naive());

        // Already seeded — no double-schedule.
        assert!(h.engine.reactivate("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reactivation_ignores_inactive_or_unknown_users() {
        let h = harness("digest", 0);
        let mut sub = active_sub("u1", Frequency::Weekly);
        sub.is_active = false;
        h.prefs.insert(sub);

        assert!(h.engine.reactivate("u1").await.unwrap().is_none());
        assert!(h.engine.reactivate("ghost").await.unwrap().is_none());
        assert!(h.store.lock().await.live_job("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_categories() {
        let h = harness("digest", 0);
        let trigger = CycleTrigger {
            user_id: "u1".into(),
            email: "u1@x.com".into(),
            categories: vec![],
            frequency: Frequency::Daily,
            scheduled_for: None,
        };
        assert!(h.engine.submit(trigger).await.is_err());
    }

    #[tokio::test]
    async fn test_emitted_trigger_round_trips_through_the_wire() {
        let h = harness("digest", 0);
        let sub = active_sub("u1", Frequency::Daily);
        h.prefs.insert(sub.clone());
        h.engine.submit(trigger_for(&sub)).await.unwrap().unwrap();
        h.engine.tick().await;

        let next = h.store.lock().await.live_job("u1").unwrap().unwrap();
        let wire = serde_json::to_string(&next.trigger).unwrap();
        let parsed: CycleTrigger = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, next.trigger);
        assert_eq!(parsed.user_id, "u1");
        assert_eq!(parsed.frequency, Frequency::Daily);
        // Month rollovers land on the right calendar day.
        let at = parsed.scheduled_for.unwrap().with_timezone(&Local);
        assert_eq!(at.day(), (Local::now() + Duration::days(1)).day());
    }
}
