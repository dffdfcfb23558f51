//! Hosted vision-language model integration
//!
//! Sends one chat-completion request that pairs the age-estimate prompt with a
//! URL to the staged photo, and reads back the first text answer.

pub mod client;
pub mod mock;
pub mod types;

pub use client::CompletionClient;
pub use mock::MockInferenceClient;

use crate::stage::StagedFile;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Ask the model about `file`. `Ok(None)` means the call succeeded but
    /// returned no rows.
    async fn complete(&self, prompt: &str, file: &StagedFile) -> Result<Option<String>>;
}
