// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// End-to-end query and ingestion through the orchestrator

use crate::common::{orchestrator_with, test_config, MockLlm};
use faq_rag_node::{
    knowledge::{DirectorySource, Document, StaticSource},
    llm::GenerationError,
    rag::{IngestionError, RagError},
    sessions::{Role, SessionError},
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SKY: &str = "The sky is blue. Water boils at 100°C.";

fn sky_source() -> StaticSource {
    StaticSource::new(vec![Document::plain("sky.txt", SKY)])
}

#[tokio::test]
async fn test_sky_question_answered_from_corpus() {
    let llm = Arc::new(MockLlm::answering("The sky is blue."));
    let orchestrator = orchestrator_with(&test_config(), llm.clone());

    let report = orchestrator
        .ingest(&sky_source(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.chunks_indexed, 1);

    let answer = orchestrator
        .query("sky-session", "What color is the sky?")
        .await
        .unwrap();

    assert_eq!(answer.answer, "The sky is blue.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id, "sky.txt");
    assert!(answer.sources[0].similarity >= 0.1);

    let prompt = llm.last_prompt().unwrap();
    assert!(prompt.contains(SKY));
    assert!(prompt.contains("Question: What color is the sky?"));

    let history = orchestrator.history("sky-session").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "What color is the sky?");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].text, "The sky is blue.");
}

#[tokio::test]
async fn test_question_with_colliding_words_is_answered() {
    let llm = Arc::new(MockLlm::answering("Emails are answered within a day."));
    let orchestrator = orchestrator_with(&test_config(), llm.clone());
    orchestrator
        .ingest(
            &StaticSource::new(vec![Document::plain(
                "email.txt",
                "Email policy: we answer every email within one business day.",
            )]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let answer = orchestrator
        .query("mail", "What is the email policy?")
        .await
        .unwrap();

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id, "email.txt");
    assert_eq!(orchestrator.history("mail").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_corpus_still_generates() {
    let llm = Arc::new(MockLlm::answering("I don't have that information yet."));
    let orchestrator = orchestrator_with(&test_config(), llm.clone());

    let answer = orchestrator
        .query("s1", "Do you ship to Antarctica?")
        .await
        .unwrap();

    assert!(answer.sources.is_empty());
    let prompt = llm.last_prompt().unwrap();
    assert!(!prompt.contains("<knowledge_sources>"));
    assert!(prompt.contains("No relevant information was found"));
    assert!(prompt.contains("Do you ship to Antarctica?"));
    assert_eq!(llm.prompts().len(), 1);
}

#[tokio::test]
async fn test_follow_up_question_sees_previous_turn() {
    let llm = Arc::new(MockLlm::answering("Standard shipping takes five days."));
    let orchestrator = orchestrator_with(&test_config(), llm.clone());

    orchestrator.query("s", "How long is shipping?").await.unwrap();
    orchestrator.query("s", "And for express?").await.unwrap();

    let prompt = llm.last_prompt().unwrap();
    assert!(prompt.contains("User: How long is shipping?"));
    assert!(prompt.contains("Assistant: Standard shipping takes five days."));
    assert_eq!(orchestrator.history("s").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_small_budget_drops_oldest_history() {
    let mut config = test_config();
    config.prompt.token_budget = 300;
    let llm = Arc::new(MockLlm::answering("Blue."));
    let orchestrator = orchestrator_with(&config, llm.clone());
    orchestrator
        .ingest(&sky_source(), &CancellationToken::new())
        .await
        .unwrap();

    for i in 0..4 {
        orchestrator
            .sessions()
            .append_turn(
                "long",
                format!("Old question {} {}", i, "about delivery windows ".repeat(5)),
                format!("Old answer {} {}", i, "with lots of carrier detail ".repeat(4)),
            )
            .await
            .unwrap();
    }

    orchestrator.query("long", "What color is the sky?").await.unwrap();

    let prompt = llm.last_prompt().unwrap();
    assert!(!prompt.contains("Old question 0"));
    assert!(prompt.contains(SKY));
    assert!(prompt.contains("Question: What color is the sky?"));
    assert!((prompt.chars().count() + 3) / 4 <= 300);
}

#[tokio::test]
async fn test_timeout_leaves_history_untouched() {
    let mut config = test_config();
    config.llm.timeout_ms = 50;
    let llm = Arc::new(MockLlm::slow("too late", Duration::from_millis(500)));
    let orchestrator = orchestrator_with(&config, llm);

    let err = orchestrator
        .query("slow", "Where is my parcel?")
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::GenerationTimeout { timeout_ms: 50 }));
    assert_eq!(err.error_code(), "GENERATION_TIMEOUT");
    assert!(orchestrator.history("slow").await.is_none());
}

#[tokio::test]
async fn test_generation_failure_leaves_history_untouched() {
    let llm = Arc::new(MockLlm::failing(GenerationError::Api {
        status: 529,
        message: "Overloaded".to_string(),
    }));
    let orchestrator = orchestrator_with(&test_config(), llm);

    let err = orchestrator.query("s", "Hello?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation(GenerationError::Api { status: 529, .. })));
    assert!(orchestrator.history("s").await.is_none());
}

#[tokio::test]
async fn test_blank_answer_is_an_error() {
    let llm = Arc::new(MockLlm::answering("   \n"));
    let orchestrator = orchestrator_with(&test_config(), llm);

    let err = orchestrator.query("s", "Hello?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation(GenerationError::EmptyResponse)));
    assert_eq!(err.user_message(), "No response from LLM");
    assert!(orchestrator.history("s").await.is_none());
}

#[tokio::test]
async fn test_invalid_requests_rejected_before_generation() {
    let llm = Arc::new(MockLlm::answering("unused"));
    let orchestrator = orchestrator_with(&test_config(), llm.clone());

    let err = orchestrator.query("s", "   ").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));

    let err = orchestrator.query("", "Hello?").await.unwrap_err();
    assert!(matches!(err, RagError::Session(SessionError::EmptyId)));

    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn test_directory_ingest_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("shipping.md"),
        "# Shipping\nOrders ship within two business days.",
    )
    .unwrap();
    std::fs::write(dir.path().join("hours.txt"), "Support is open 9am to 5pm.").unwrap();
    std::fs::write(dir.path().join("brochure.pdf"), b"%PDF-1.4").unwrap();
    std::fs::write(dir.path().join("broken.txt"), [0xffu8, 0xfe, 0x00, 0xc3]).unwrap();

    let llm = Arc::new(MockLlm::answering("ok"));
    let orchestrator = orchestrator_with(&test_config(), llm);
    let report = orchestrator
        .ingest(&DirectorySource::new(dir.path()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.documents_indexed, 2);
    assert_eq!(report.chunks_indexed, 2);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.contains(&IngestionError::UnsupportedFormat {
        document_id: "brochure.pdf".to_string()
    }));
    assert!(report.failures.contains(&IngestionError::InvalidUtf8 {
        document_id: "broken.txt".to_string()
    }));

    let stats = orchestrator.stats().await;
    assert_eq!(
        stats.sources,
        vec!["hours.txt".to_string(), "shipping.md".to_string()]
    );
}

#[tokio::test]
async fn test_missing_directory_fails_ingest() {
    let llm = Arc::new(MockLlm::answering("ok"));
    let orchestrator = orchestrator_with(&test_config(), llm);

    let err = orchestrator
        .ingest(
            &DirectorySource::new("/definitely/not/a/real/kb"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RagError::Ingestion(IngestionError::SourceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_concurrent_queries_on_one_session() {
    let llm = Arc::new(MockLlm::answering("Blue."));
    let orchestrator = Arc::new(orchestrator_with(&test_config(), llm));
    orchestrator
        .ingest(&sky_source(), &CancellationToken::new())
        .await
        .unwrap();

    let queries = (0..10).map(|i| {
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .query("shared", &format!("Question {} about the sky", i))
                .await
        }
    });
    for result in join_all(queries).await {
        assert!(result.is_ok());
    }

    let history = orchestrator.history("shared").await.unwrap();
    assert_eq!(history.len(), 20);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
    for i in 0..10 {
        let question = format!("Question {} about the sky", i);
        assert_eq!(history.iter().filter(|m| m.text == question).count(), 1);
    }
}

#[tokio::test]
async fn test_distinct_sessions_are_isolated() {
    let llm = Arc::new(MockLlm::answering("Answer."));
    let orchestrator = Arc::new(orchestrator_with(&test_config(), llm));

    let queries = ["alpha", "beta", "gamma"].map(|id| {
        let orchestrator = orchestrator.clone();
        async move { orchestrator.query(id, &format!("Hello from {}", id)).await }
    });
    for result in join_all(queries).await {
        assert!(result.is_ok());
    }

    for id in ["alpha", "beta", "gamma"] {
        let history = orchestrator.history(id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, format!("Hello from {}", id));
    }
    assert_eq!(orchestrator.sessions().session_count().await, 3);
}
