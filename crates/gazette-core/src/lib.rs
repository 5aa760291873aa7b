//! # Gazette Core
//!
//! Shared foundation for the Gazette newsletter pipeline: configuration,
//! the error taxonomy, wire types, and the collaborator traits the
//! pipeline is built against (content source, summarizer, transport,
//! preference store).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::GazetteConfig;
pub use error::{GazetteError, Result};
pub use traits::{ContentSource, PreferenceStore, Summarizer, Transport};
pub use types::{Article, CycleResult, CycleTrigger, Frequency, RenderedEmail, Subscription};
