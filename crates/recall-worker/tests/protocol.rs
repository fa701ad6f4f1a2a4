//! Protocol tests against the real worker binary

use recall_core::embedding::fallback::content_vector;
use recall_core::embedding::{BackendFailure, EmbeddingBackend, WorkerProcessBackend};
use std::time::Duration;

fn worker() -> WorkerProcessBackend {
    WorkerProcessBackend::new(
        vec![env!("CARGO_BIN_EXE_recall-embed-worker").to_string()],
        "all-MiniLM-L6-v2",
        Duration::from_secs(10),
    )
    .unwrap()
}

#[tokio::test]
async fn round_trip_matches_deterministic_encoder() {
    let out = worker()
        .embed(&["hello world".to_string()])
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 384);
    assert_eq!(out[0], content_vector("hello world", 384));
}

#[tokio::test]
async fn batch_preserves_order() {
    let texts: Vec<String> = ["first", "second", "third"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let out = worker().embed(&texts).await.unwrap();
    assert_eq!(out.len(), 3);
    for (text, vector) in texts.iter().zip(&out) {
        assert_eq!(vector, &content_vector(text, 384));
    }
}

#[tokio::test]
async fn identical_text_is_bit_identical_across_processes() {
    let backend = worker();
    let a = backend.embed(&["same text".to_string()]).await.unwrap();
    let b = backend.embed(&["same text".to_string()]).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn empty_batch_yields_model_error() {
    let err = worker().embed(&[]).await.unwrap_err();
    assert!(matches!(err, BackendFailure::ModelError(_)));
}
