//! Config builders shared by the integration tests.
//!
//! The default layout is a voice-memo pipeline:
//!
//! ```text
//! inbox/voice --transcribe--> inbox/transcripts --classify--> inbox/summaries --summarize--> notes
//!                                                          \-> inbox/results/misc (default)
//! ```

#![allow(dead_code)]

use vaultflow::config::{ModelConfig, ModelsConfig, OutputTarget, PipelineConfiguration, PipelineStep};

pub const TEST_API_KEY: &str = "sk-test-key";
pub const CLASSIFY_PROMPT: &str = "prompts/classify.md";

pub fn whisper_model() -> ModelConfig {
    ModelConfig::new("whisper-1", "whisper").with_api_key(TEST_API_KEY)
}

pub fn chat_model() -> ModelConfig {
    ModelConfig::new("gpt-4o-mini", "chatgpt").with_api_key(TEST_API_KEY)
}

pub fn models() -> ModelsConfig {
    ModelsConfig::new()
        .with_model("whisper", whisper_model())
        .with_model("gpt", chat_model())
}

pub fn transcribe_step() -> PipelineStep {
    PipelineStep::new(
        "inbox/voice",
        OutputTarget::simple("inbox/transcripts"),
        "inbox/archive/transcribe",
        "whisper",
    )
}

pub fn classify_step() -> PipelineStep {
    PipelineStep::new(
        "inbox/transcripts",
        OutputTarget::routed([("summarize", "inbox/summaries")], "inbox/results/misc"),
        "inbox/archive/classify",
        "gpt",
    )
    .with_prompts([CLASSIFY_PROMPT])
}

pub fn summarize_step() -> PipelineStep {
    PipelineStep::new(
        "inbox/summaries",
        OutputTarget::simple("notes"),
        "inbox/archive/summarize",
        "gpt",
    )
}

/// `transcribe` only.
pub fn transcribe_pipeline() -> PipelineConfiguration {
    PipelineConfiguration::new().with_step("transcribe", transcribe_step())
}

/// `classify` routing into `summarize`.
pub fn classify_pipeline() -> PipelineConfiguration {
    PipelineConfiguration::new()
        .with_step("classify", classify_step())
        .with_step("summarize", summarize_step())
}

/// All three steps.
pub fn voice_pipeline() -> PipelineConfiguration {
    PipelineConfiguration::new()
        .with_step("transcribe", transcribe_step())
        .with_step("classify", classify_step())
        .with_step("summarize", summarize_step())
}
