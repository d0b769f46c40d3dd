//! End-to-end tests: real filesystem vault, scripted model client.

mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::Notify;

use common::*;
use vaultflow::config::ModelsConfig;
use vaultflow::error::ModelError;
use vaultflow::model::{ResponseSection, StructuredResponse};
use vaultflow::pipeline::{
    ErrorKind, ExecutorOptions, OutputFrontmatter, PipelineError, ProcessingStatus, PIPELINE_TAG,
};

fn paths(files: &[String]) -> Vec<&str> {
    files.iter().map(String::as_str).collect()
}

fn single_step_options() -> ExecutorOptions {
    ExecutorOptions {
        follow_chain: false,
        ..ExecutorOptions::default()
    }
}

fn classify_vault() -> TestVault {
    let vault = TestVault::new();
    vault.write(CLASSIFY_PROMPT, "Classify the note.");
    vault
}

#[tokio::test]
async fn test_transcribe_single_step() {
    let vault = TestVault::new();
    vault.write("inbox/voice/meeting.mp3", b"ID3\x03fake-audio");
    let client = Arc::new(ScriptedModelClient::new().with_transcript("We ship on Friday."));
    let executor = vault.executor(models(), transcribe_pipeline(), client.clone());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Completed);
    assert_eq!(result.step_id(), Some("transcribe"));
    assert_eq!(paths(result.output_files()), ["inbox/transcripts/meeting.md"]);
    assert_eq!(
        result.archive_path(),
        Some("inbox/archive/transcribe/meeting.mp3")
    );
    assert_eq!(result.next_step(), None);
    assert!(result.error().is_none());

    assert!(!vault.exists("inbox/voice/meeting.mp3"));
    assert!(vault.exists("inbox/archive/transcribe/meeting.mp3"));
    assert_eq!(client.transcribed(), ["meeting.mp3"]);

    let document = vault.read("inbox/transcripts/meeting.md");
    let (frontmatter, body) = OutputFrontmatter::parse(&document).unwrap();
    assert_eq!(frontmatter.source, "inbox/archive/transcribe/meeting.mp3");
    assert_eq!(frontmatter.step, "transcribe");
    assert_eq!(frontmatter.next_step, None);
    assert_eq!(frontmatter.pipeline, PIPELINE_TAG);
    assert!(chrono::DateTime::parse_from_rfc3339(&frontmatter.processed).is_ok());
    assert_eq!(body, "We ship on Friday.");
}

#[tokio::test]
async fn test_frontmatter_field_order() {
    let vault = TestVault::new();
    vault.write("inbox/voice/memo.m4a", b"fake");
    let client = Arc::new(ScriptedModelClient::new().with_transcript("hello"));
    let executor = vault.executor(models(), transcribe_pipeline(), client);

    executor.process_next_file().await.unwrap();

    let document = vault.read("inbox/transcripts/memo.md");
    let keys: Vec<&str> = document
        .lines()
        .skip(1)
        .take_while(|line| *line != "---")
        .filter_map(|line| line.split(':').next())
        .collect();
    assert_eq!(keys, ["source", "processed", "step", "pipeline"]);
    assert!(document.ends_with("---\n\nhello"));
}

#[tokio::test]
async fn test_nothing_to_do_is_skipped() {
    let vault = TestVault::new();
    let client = Arc::new(ScriptedModelClient::new());
    let executor = vault.executor(models(), voice_pipeline(), client.clone());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Skipped);
    assert!(result.output_files().is_empty());
    assert!(result.error().is_none());
    assert!(client.requests().is_empty());
    assert!(client.transcribed().is_empty());
}

#[tokio::test]
async fn test_bogus_next_step_falls_back_to_default() {
    let vault = classify_vault();
    vault.write(
        "inbox/transcripts/standup.md",
        "---\ntags: [voice]\n---\nDaily standup notes",
    );
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("standup-summary", "Summary", Some("publish"));
    let executor = vault.executor(models(), classify_pipeline(), client.clone());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Completed);
    assert_eq!(result.next_step(), None);
    assert_eq!(
        paths(result.output_files()),
        ["inbox/results/misc/standup-summary.md"]
    );

    let decision = result.routing_decision().unwrap();
    assert!(decision.fallback_used);
    assert_eq!(decision.requested.as_deref(), Some("publish"));
    assert_eq!(decision.available, ["summarize"]);
    assert!(result.warnings().iter().any(|w| w.contains("publish")));

    let document = vault.read("inbox/results/misc/standup-summary.md");
    let (frontmatter, _) = OutputFrontmatter::parse(&document).unwrap();
    assert_eq!(frontmatter.next_step, None);
    assert_eq!(frontmatter.step, "classify");
}

#[tokio::test]
async fn test_chat_request_contents() {
    let vault = classify_vault();
    vault.write("context/people.md", "Ana leads design.");
    vault.write(
        "inbox/transcripts/standup.md",
        "---\ntags: [voice]\n---\nDaily standup notes",
    );
    let mut pipeline = classify_pipeline();
    pipeline.insert("classify", classify_step().with_context(["context/people.md"]));
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("standup", "ok", None);
    let executor = vault.executor(models(), pipeline, client.clone());

    executor.process_next_file().await.unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.system.contains("Classify the note."));
    assert!(request.prompt.contains("Ana leads design."));
    assert!(request.prompt.contains("Daily standup notes"));
    assert!(!request.prompt.contains("tags: [voice]"));
    assert!(request.prompt.contains("summarize"));
    assert_eq!(request.available_next_steps, ["summarize"]);
}

#[tokio::test]
async fn test_generic_filename_uses_input_name() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/meeting-notes.md", "notes");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("response.md", "Body", None);
    let executor = vault.executor(models(), classify_pipeline(), client);

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(
        paths(result.output_files()),
        ["inbox/results/misc/meeting-notes.md"]
    );
}

#[tokio::test]
async fn test_existing_output_is_not_overwritten() {
    let vault = classify_vault();
    vault.write("inbox/results/misc/recap.md", "older recap");
    vault.write("inbox/transcripts/today.md", "notes");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("recap", "newer recap", None);
    let executor = vault.executor(models(), classify_pipeline(), client);

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(paths(result.output_files()), ["inbox/results/misc/recap_2.md"]);
    assert_eq!(vault.read("inbox/results/misc/recap.md"), "older recap");
}

#[tokio::test]
async fn test_chain_follows_next_step() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/launch.md", "We discussed the launch.");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("launch-plan", "Plan body", Some("summarize"));
    client.push_section("launch-summary", "Short summary", None);
    let executor = vault.executor(models(), classify_pipeline(), client.clone());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Completed);
    assert_eq!(result.step_id(), Some("summarize"));
    assert_eq!(paths(result.output_files()), ["notes/launch-summary.md"]);
    assert_eq!(
        result.archive_path(),
        Some("inbox/archive/summarize/launch-plan.md")
    );

    assert!(vault.exists("inbox/archive/classify/launch.md"));
    assert!(!vault.exists("inbox/summaries/launch-plan.md"));

    let intermediate = vault.read("inbox/archive/summarize/launch-plan.md");
    let (frontmatter, body) = OutputFrontmatter::parse(&intermediate).unwrap();
    assert_eq!(frontmatter.next_step.as_deref(), Some("summarize"));
    assert_eq!(body, "Plan body");

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prompt.contains("Plan body"));
    assert!(requests[1].available_next_steps.is_empty());
}

#[tokio::test]
async fn test_chain_disabled_stops_after_one_step() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/launch.md", "We discussed the launch.");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("launch-plan", "Plan body", Some("summarize"));
    let executor = vault
        .executor(models(), classify_pipeline(), client.clone())
        .with_options(single_step_options());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.step_id(), Some("classify"));
    assert_eq!(result.next_step(), Some("summarize"));
    assert_eq!(paths(result.output_files()), ["inbox/summaries/launch-plan.md"]);
    assert!(vault.exists("inbox/summaries/launch-plan.md"));
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn test_failed_step_in_chain_is_terminal() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/launch.md", "We discussed the launch.");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("launch-plan", "Plan body", Some("summarize"));
    client.push_error(ModelError::Api {
        status: 529,
        message: "overloaded".into(),
    });
    let executor = vault.executor(models(), classify_pipeline(), client);

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Failed);
    assert_eq!(result.step_id(), Some("summarize"));
    assert_eq!(result.input_file(), "inbox/summaries/launch-plan.md");
    assert!(vault.exists("inbox/summaries/launch-plan.md"));
}

#[tokio::test]
async fn test_multiple_sections_each_get_a_file() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/retro.md", "Retro notes");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_response(StructuredResponse::from_sections(vec![
        ResponseSection::new("action-items", "A").with_next_step("summarize"),
        ResponseSection::new("decisions", "B"),
    ]));
    let executor = vault
        .executor(models(), classify_pipeline(), client)
        .with_options(single_step_options());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(
        paths(result.output_files()),
        [
            "inbox/summaries/action-items.md",
            "inbox/results/misc/decisions.md"
        ]
    );
    assert_eq!(result.next_step(), Some("summarize"));
}

#[tokio::test]
async fn test_whisper_rejects_text_input() {
    let vault = TestVault::new();
    vault.write("inbox/voice/memo.md", "not audio");
    let client = Arc::new(ScriptedModelClient::new().with_transcript("unused"));
    let executor = vault.executor(models(), transcribe_pipeline(), client.clone());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Failed);
    assert_eq!(result.error_kind(), Some(ErrorKind::Configuration));
    assert!(vault.exists("inbox/voice/memo.md"));
    assert!(client.transcribed().is_empty());
}

#[tokio::test]
async fn test_blank_api_key_fails_before_model_call() {
    let vault = TestVault::new();
    vault.write("inbox/voice/meeting.mp3", b"fake");
    let models = ModelsConfig::new().with_model(
        "whisper",
        vaultflow::config::ModelConfig::new("whisper-1", "whisper"),
    );
    let client = Arc::new(ScriptedModelClient::new().with_transcript("unused"));
    let executor = vault.executor(models, transcribe_pipeline(), client.clone());

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Failed);
    assert_eq!(result.error_kind(), Some(ErrorKind::Configuration));
    assert!(result.error().unwrap().contains("whisper"));
    assert!(vault.exists("inbox/voice/meeting.mp3"));
    assert!(client.transcribed().is_empty());
}

#[tokio::test]
async fn test_archive_failure_keeps_input_in_place() {
    let vault = TestVault::new();
    vault.write("inbox/voice/meeting.mp3", b"fake");
    let storage = Arc::new(CountingStorage::failing_moves(vault.root()));
    let client = Arc::new(ScriptedModelClient::new().with_transcript("transcript"));
    let executor = vault.executor_with(storage, models(), transcribe_pipeline(), client);

    let result = executor.process_next_file().await.unwrap();

    assert_eq!(result.status(), ProcessingStatus::Completed);
    assert_eq!(result.archive_path(), Some("inbox/voice/meeting.mp3"));
    assert!(result.warnings().iter().any(|w| w.contains("archiving")));
    assert!(vault.exists("inbox/voice/meeting.mp3"));

    let document = vault.read("inbox/transcripts/meeting.md");
    let (frontmatter, _) = OutputFrontmatter::parse(&document).unwrap();
    assert_eq!(frontmatter.source, "inbox/voice/meeting.mp3");
}

#[tokio::test]
async fn test_process_specific_file() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/a.md", "first");
    vault.write("inbox/transcripts/b.md", "second");
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("b-notes", "done", None);
    let executor = vault.executor(models(), classify_pipeline(), client.clone());

    let result = executor
        .process_file("inbox/transcripts/b.md")
        .await
        .unwrap();

    assert_eq!(result.input_file(), "inbox/transcripts/b.md");
    assert!(result.is_completed());
    assert!(vault.exists("inbox/transcripts/a.md"));
    assert!(client.requests()[0].prompt.contains("second"));
}

#[tokio::test]
async fn test_process_file_outside_any_input() {
    let vault = classify_vault();
    vault.write("elsewhere/note.md", "x");
    let executor = vault.executor(
        models(),
        classify_pipeline(),
        Arc::new(ScriptedModelClient::new()),
    );

    let err = executor.process_file("elsewhere/note.md").await.unwrap_err();
    assert!(matches!(err, PipelineError::NoStepForFile(_)));

    let err = executor.process_file("../escape.md").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileSystem);
}

#[tokio::test]
async fn test_concurrent_call_fails_without_discovery() {
    let vault = classify_vault();
    vault.write("inbox/transcripts/a.md", "first");
    let storage = Arc::new(CountingStorage::new(vault.root()));
    let gate = Arc::new(Notify::new());
    let client = Arc::new(ScriptedModelClient::new().with_gate(Arc::clone(&gate)));
    client.push_section("a-notes", "done", None);
    let executor = Arc::new(vault.executor_with(
        storage.clone(),
        models(),
        classify_pipeline(),
        client.clone(),
    ));

    let running = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.process_next_file().await })
    };
    client.called.notified().await;
    assert!(executor.state().is_processing());

    let listings = storage.list_calls();
    let err = executor.process_next_file().await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyProcessing));
    assert_eq!(storage.list_calls(), listings);

    gate.notify_one();
    let result = running.await.unwrap().unwrap();
    assert!(result.is_completed());
    assert!(!executor.state().is_processing());

    let result = executor.process_next_file().await.unwrap();
    assert_eq!(result.status(), ProcessingStatus::Skipped);
}

#[tokio::test]
async fn test_batch_continues_after_failure() {
    let vault = classify_vault();
    for name in ["a", "b", "c"] {
        vault.write(&format!("inbox/transcripts/{name}.md"), name);
    }
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("a-out", "A", None);
    client.push_error(ModelError::Api {
        status: 500,
        message: "boom".into(),
    });
    client.push_section("c-out", "C", None);
    let executor = vault.executor(models(), classify_pipeline(), client);

    let mut batch = executor.process_all_files_with(10, true);
    let mut results = Vec::new();
    while let Some(outcome) = batch.next().await {
        results.push(outcome.unwrap());
    }

    let statuses: Vec<_> = results.iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        [
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
            ProcessingStatus::Completed
        ]
    );
    assert_eq!(results[1].input_file(), "inbox/transcripts/b.md");
    assert_eq!(results[1].error_kind(), Some(ErrorKind::Pipeline));
    assert_eq!(batch.iterations(), 3);
    assert!(vault.exists("inbox/transcripts/b.md"));
    assert!(!executor.state().is_processing());
}

#[tokio::test]
async fn test_batch_stops_on_first_error() {
    let vault = classify_vault();
    for name in ["a", "b", "c"] {
        vault.write(&format!("inbox/transcripts/{name}.md"), name);
    }
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("a-out", "A", None);
    client.push_error(ModelError::Api {
        status: 500,
        message: "boom".into(),
    });
    let executor = vault.executor(models(), classify_pipeline(), client);

    let mut batch = executor.process_all_files_with(10, false);

    assert!(batch.next().await.unwrap().unwrap().is_completed());
    let err = batch.next().await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Model(ModelError::Api { status: 500, .. })));
    assert!(batch.next().await.is_none());
    assert!(vault.exists("inbox/transcripts/c.md"));
}

#[tokio::test]
async fn test_batch_stops_after_failed_chained_step() {
    let vault = classify_vault();
    for name in ["a", "b"] {
        vault.write(&format!("inbox/transcripts/{name}.md"), name);
    }
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("a-plan", "Plan", Some("summarize"));
    client.push_error(ModelError::Api {
        status: 500,
        message: "boom".into(),
    });
    let executor = vault.executor(models(), classify_pipeline(), client.clone());

    let mut batch = executor.process_all_files_with(10, false);

    let result = batch.next().await.unwrap().unwrap();
    assert!(result.is_failed());
    assert_eq!(result.step_id(), Some("summarize"));
    assert_eq!(result.input_file(), "inbox/summaries/a-plan.md");
    assert!(batch.next().await.is_none());
    assert_eq!(client.requests().len(), 2);
    assert!(vault.exists("inbox/transcripts/b.md"));
}

#[tokio::test]
async fn test_batch_does_not_retry_failed_chained_input() {
    let vault = classify_vault();
    for name in ["a", "b"] {
        vault.write(&format!("inbox/transcripts/{name}.md"), name);
    }
    let client = Arc::new(ScriptedModelClient::new());
    client.push_section("a-plan", "Plan", Some("summarize"));
    client.push_error(ModelError::Api {
        status: 500,
        message: "boom".into(),
    });
    client.push_section("b-out", "B", None);
    let executor = vault.executor(models(), classify_pipeline(), client.clone());

    let results: Vec<_> = executor
        .process_all_files_with(10, true)
        .into_stream()
        .collect()
        .await;

    let inputs: Vec<&str> = results
        .iter()
        .map(|r| r.as_ref().unwrap().input_file())
        .collect();
    assert_eq!(inputs, ["inbox/summaries/a-plan.md", "inbox/transcripts/b.md"]);
    assert_eq!(client.requests().len(), 3);
    assert!(vault.exists("inbox/summaries/a-plan.md"));
}

#[tokio::test]
async fn test_batch_respects_iteration_limit() {
    let vault = classify_vault();
    for name in ["a", "b", "c"] {
        vault.write(&format!("inbox/transcripts/{name}.md"), name);
    }
    let client = Arc::new(ScriptedModelClient::new());
    for name in ["a", "b", "c"] {
        client.push_section(&format!("{name}-out"), name, None);
    }
    let executor = vault.executor(models(), classify_pipeline(), client);

    let results: Vec<_> = executor
        .process_all_files_with(2, true)
        .into_stream()
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.as_ref().unwrap().is_completed()));
    assert!(vault.exists("inbox/transcripts/c.md"));
}

#[tokio::test]
async fn test_batch_drains_whole_pipeline() {
    let vault = classify_vault();
    vault.write("inbox/voice/standup.mp3", b"fake");
    let client = Arc::new(ScriptedModelClient::new().with_transcript("Standup transcript"));
    client.push_section("standup-plan", "Plan", Some("summarize"));
    client.push_section("standup-summary", "Summary", None);
    let executor = vault
        .executor(models(), voice_pipeline(), client)
        .with_options(single_step_options());

    let mut steps = Vec::new();
    let mut batch = executor.process_all_files();
    while let Some(outcome) = batch.next().await {
        let result = outcome.unwrap();
        assert!(result.is_completed(), "{:?}", result);
        steps.push(result.step_id().unwrap().to_string());
    }

    assert_eq!(steps, ["transcribe", "classify", "summarize"]);
    assert_eq!(vault.files_in("notes"), ["notes/standup-summary.md"]);
}
