mod http;
mod response;

pub use http::HttpModelClient;
pub use response::{
    parse_structured_response, ResponseSection, StructuredResponse, FALLBACK_FILENAME,
};

use async_trait::async_trait;

use crate::config::ResolvedModel;
use crate::error::ModelError;

/// A chat request assembled from a step's prompts, context and input.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    /// Concatenated prompt files.
    pub system: String,
    /// Reference material, input and routing instructions.
    pub prompt: String,
    /// Routing keys the model may return as `nextStep`.
    pub available_next_steps: Vec<String>,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    pub filename: String,
    pub mime_type: Option<String>,
    pub audio: Vec<u8>,
}

/// Remote model access used by the step executor.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn process_structured_request(
        &self,
        model: &ResolvedModel,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, ModelError>;

    /// Returns the transcript of the audio.
    async fn transcribe(
        &self,
        model: &ResolvedModel,
        request: &TranscriptionRequest,
    ) -> Result<String, ModelError>;
}
