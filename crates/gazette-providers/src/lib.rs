//! # Gazette Providers
//!
//! Generation-service clients. All OpenAI-compatible chat-completion
//! APIs are handled by a single `OpenAiSummarizer`; any other backend
//! only needs to implement `gazette_core::traits::Summarizer`.

pub mod openai;

pub use openai::OpenAiSummarizer;

use gazette_core::config::LlmConfig;
use gazette_core::traits::Summarizer;

/// Create the configured summarizer.
pub fn create_summarizer(config: &LlmConfig) -> Box<dyn Summarizer> {
    Box::new(OpenAiSummarizer::new(config.clone()))
}
