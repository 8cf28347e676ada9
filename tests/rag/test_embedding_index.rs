// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Embedding index: ingestion, rebuild and search behaviour

use crate::common::FlakyEmbedder;
use faq_rag_node::{
    knowledge::Document,
    rag::{Chunker, EmbeddingIndex, IngestionError},
    HashingEmbedder,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn faq_documents() -> Vec<Document> {
    vec![
        Document::markdown(
            "shipping.md",
            "# Shipping\nStandard shipping takes three to five business days.",
        ),
        Document::markdown(
            "returns.md",
            "# Returns\nItems can be returned within 30 days of delivery.",
        ),
        Document::plain(
            "payments.txt",
            "We accept credit cards, debit cards and gift vouchers.",
        ),
    ]
}

fn hashing_index() -> EmbeddingIndex {
    EmbeddingIndex::new(Arc::new(HashingEmbedder::default()))
}

#[tokio::test]
async fn test_every_chunk_retrieves_itself_first() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    let docs = faq_documents();
    index
        .rebuild(&docs, &chunker, &CancellationToken::new())
        .await
        .unwrap();

    for doc in &docs {
        for chunk in chunker.chunk(doc) {
            let result = index.search(&chunk.text, 1).await.unwrap();
            assert_eq!(result.len(), 1);
            assert_eq!(result.results[0].chunk, chunk);
            assert!(result.results[0].similarity > 0.99);
        }
    }
}

#[tokio::test]
async fn test_search_results_are_ordered_and_bounded() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    index
        .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
        .await
        .unwrap();

    let result = index.search("how long does shipping take", 2).await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.results[0].chunk.document_id, "shipping.md");
    assert!(result.results[0].similarity >= result.results[1].similarity);

    let all = index.search("shipping", 10).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_rebuild_replaces_previous_contents() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    let cancel = CancellationToken::new();

    index.rebuild(&faq_documents(), &chunker, &cancel).await.unwrap();
    assert_eq!(index.len().await, 3);

    let report = index
        .rebuild(
            &[Document::plain("only.txt", "Our office is closed on public holidays.")],
            &chunker,
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.documents_indexed, 1);
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(index.sources().await, vec!["only.txt".to_string()]);
}

#[tokio::test]
async fn test_cancelled_rebuild_keeps_current_index() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    index
        .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = index
        .rebuild(
            &[Document::plain("new.txt", "Replacement content.")],
            &chunker,
            &cancel,
        )
        .await;

    assert_eq!(result.unwrap_err(), IngestionError::Cancelled);
    assert_eq!(index.len().await, 3);
    assert!(!index.sources().await.contains(&"new.txt".to_string()));
}

#[tokio::test]
async fn test_failed_chunks_are_skipped_and_counted() {
    let index = EmbeddingIndex::new(Arc::new(FlakyEmbedder::new("vouchers")));
    let chunker = Chunker::new(1000, 200).unwrap();

    let report = index
        .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.documents_indexed, 3);
    assert_eq!(report.chunks_indexed, 2);
    assert_eq!(report.chunks_skipped, 1);
    assert_eq!(
        index.sources().await,
        vec!["returns.md".to_string(), "shipping.md".to_string()]
    );
}

#[tokio::test]
async fn test_upsert_replaces_one_document() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    index
        .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
        .await
        .unwrap();

    let updated = Document::markdown(
        "returns.md",
        "# Returns\nReturns are accepted within 60 days.",
    );
    let report = index.upsert_document(&updated, &chunker).await;
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(index.len().await, 3);

    let chunk = index.chunk("returns.md", 0).await.unwrap();
    assert!(chunk.text.contains("60 days"));
}

#[tokio::test]
async fn test_concurrent_searches_during_rebuild() {
    let index = Arc::new(hashing_index());
    let chunker = Chunker::new(1000, 200).unwrap();
    index
        .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let index = index.clone();
        handles.push(tokio::spawn(async move {
            let query = if i % 2 == 0 { "shipping days" } else { "returned delivery" };
            index.search(query, 3).await.unwrap()
        }));
    }
    let rebuild = {
        let index = index.clone();
        let chunker = chunker.clone();
        tokio::spawn(async move {
            index
                .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
                .await
                .unwrap()
        })
    };

    for handle in handles {
        // Each search sees either the old or the new index, both complete
        assert_eq!(handle.await.unwrap().len(), 3);
    }
    assert_eq!(rebuild.await.unwrap().chunks_indexed, 3);
}

#[tokio::test]
async fn test_stats_report_sources_and_model() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    index
        .rebuild(&faq_documents(), &chunker, &CancellationToken::new())
        .await
        .unwrap();

    let stats = index.stats().await;
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.total_sources, 3);
    assert_eq!(stats.dimension, 384);
    assert_eq!(stats.model, "feature-hashing-v1");
    assert_eq!(stats.sources[0], "payments.txt");
}

#[tokio::test]
async fn test_passage_found_through_section_heading() {
    let index = hashing_index();
    let chunker = Chunker::new(80, 0).unwrap();
    let docs = vec![
        Document::markdown(
            "refunds.md",
            "## Refunds\nMoney goes back to the card used at checkout. Banks may hold the amount for up to ten days before it appears on your statement.",
        ),
        Document::markdown(
            "shipping.md",
            "## Shipping\nParcels leave the warehouse within two business days.",
        ),
    ];
    index
        .rebuild(&docs, &chunker, &CancellationToken::new())
        .await
        .unwrap();

    let result = index.search("refunds", 10).await.unwrap();
    let banks = result
        .iter()
        .find(|r| r.chunk.document_id == "refunds.md" && r.chunk.index == 1)
        .unwrap();

    // Only the heading mentions refunds; the stored text is still the exact span
    assert!(!banks.chunk.text.to_lowercase().contains("refund"));
    assert!(banks.similarity > 0.2, "similarity was {}", banks.similarity);
    assert_eq!(banks.chunk.heading.as_deref(), Some("Refunds"));
}

#[tokio::test]
async fn test_colliding_words_still_index_and_match() {
    let index = hashing_index();
    let chunker = Chunker::new(1000, 200).unwrap();
    let report = index
        .rebuild(
            &[Document::plain("email.txt", "Email policy")],
            &chunker,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(report.chunks_skipped, 0);

    let result = index.search("What is the email policy?", 1).await.unwrap();
    assert_eq!(result.results[0].chunk.document_id, "email.txt");
    assert!(result.results[0].similarity > 0.99);
}
