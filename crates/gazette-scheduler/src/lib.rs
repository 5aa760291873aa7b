//! # Gazette Scheduler
//!
//! The engine driving each user's recurring newsletter cycle.
//! SQLite-backed — pending triggers, the per-step idempotence ledger,
//! and cancellation tokens all survive restarts.
//!
//! ## Architecture
//! ```text
//! Engine (tokio interval tick)
//!   ├── claim due triggers (pending, scheduled_for <= now)
//!   └── per trigger → Cycle pipeline (semaphore-bounded)
//!         Gate (is_active? fail-safe skip)
//!           → Aggregate (per-category fetch, failures absorbed)
//!           → Compose (generation call, empty output = fatal)
//!           → Render (markdown → HTML + metadata)
//!           → Deliver (EmailJS REST, retryable)
//!           → Reschedule (next trigger at computeNext, 09:00 local)
//!
//! Cancellation (`newsletter.schedule.deleted`):
//!   pending cycle  → cancelled in place, never runs
//!   running cycle  → token observed at entry or before reschedule;
//!                    an already-sent email is not retracted
//! ```
//!
//! Steps `fetch`, `compose` and `deliver` are ledgered per `runId`: a
//! retried cycle re-executes only what did not complete, so a crash
//! between deliver and reschedule cannot double-send.

pub mod engine;
pub mod pipeline;
pub mod prefs;
pub mod schedule;
pub mod store;

pub use engine::ScheduleEngine;
pub use pipeline::{CycleOutcome, Pipeline};
pub use prefs::SqlitePreferenceStore;
pub use schedule::{SEND_HOUR, compute_next};
pub use store::{CycleJob, CycleStatus, JobStore};
