//! Wire types — the data model shared by every pipeline stage.
//!
//! Trigger events keep the original camelCase field names on the wire
//! (`userId`, `scheduledFor`, ...) so emitted and consumed events stay
//! interchangeable across versions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GazetteError, Result};

/// Inbound event that starts or continues a cycle.
pub const SCHEDULE_EVENT: &str = "newsletter.schedule";
/// Inbound event that cancels any pending/in-flight cycle for a user.
pub const SCHEDULE_DELETED_EVENT: &str = "newsletter.schedule.deleted";

/// Delivery cadence.
///
/// Note: `Biweekly` maps to a **3-day** interval, not the calendar
/// meaning of every two weeks. Existing subscriptions depend on the
/// literal interval, so it is preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every 24 hours.
    Daily,
    /// Every 7 days. Also the fallback for absent/unknown values.
    #[default]
    Weekly,
    /// Every 3 days (see type-level note).
    Biweekly,
}

impl Frequency {
    /// Parse leniently: unknown or empty input falls back to `Weekly`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "biweekly" => Frequency::Biweekly,
            other => {
                if !other.is_empty() {
                    tracing::warn!("Unknown frequency '{other}', defaulting to weekly");
                }
                Frequency::Weekly
            }
        }
    }

    /// Interval between deliveries.
    pub fn interval(&self) -> Duration {
        match self {
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::days(7),
            Frequency::Biweekly => Duration::days(3),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
        }
    }

    /// serde helper: deserialize any string (or nothing) into a
    /// frequency, defaulting to weekly instead of rejecting the event.
    pub fn lenient<'de, D>(deserializer: D) -> std::result::Result<Frequency, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Frequency::parse).unwrap_or_default())
    }
}

/// The unit of work: one `newsletter.schedule` event.
///
/// Created at subscribe-time (no `scheduled_for` — run now) or by the
/// engine at the end of a completed cycle. Never mutated after creation;
/// the per-execution `runId` is assigned by the engine, not carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleTrigger {
    /// Opaque user identifier, stable across cycles.
    pub user_id: String,
    /// Delivery address.
    pub email: String,
    /// Ordered, non-empty category tags.
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "Frequency::lenient")]
    pub frequency: Frequency,
    /// When to run. Absent means "run now".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl CycleTrigger {
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(GazetteError::Config(
                "trigger requires at least one category".into(),
            ));
        }
        Ok(())
    }
}

/// Subscription state, owned by the external preferences store.
/// Read-only to the pipeline apart from `is_active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: String,
    pub email: String,
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "Frequency::lenient")]
    pub frequency: Frequency,
    pub is_active: bool,
}

/// One fetched article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Display-ready content plus delivery metadata, produced by the
/// renderer and consumed by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    /// Destination address.
    pub to: String,
    /// HTML body, or the raw summary when conversion yields nothing.
    pub content: String,
    /// Categories joined for display ("technology, science").
    pub categories: String,
    pub article_count: usize,
    /// Local display date.
    pub date: String,
}

/// Outcome of one cycle, for observability and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub run_id: String,
    pub user_id: String,
    pub article_count: usize,
    pub email_sent: bool,
    pub next_scheduled: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}
