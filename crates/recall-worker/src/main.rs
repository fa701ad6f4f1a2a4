//! One-shot embedding worker
//!
//! Spawned fresh for every embedding call. Reads a single JSON
//! `EmbedRequest` from stdin, writes exactly one JSON `EmbedResponse` to
//! stdout, and exits. Logs go to stderr only — stdout belongs to the
//! protocol.
//!
//! This stock worker answers with the deterministic content-derived
//! encoder, which keeps the subprocess path exercised end to end on any
//! platform. Deployments with a real model runtime point
//! `worker_command` at their own program speaking the same protocol.

use recall_core::embedding::fallback::content_vector;
use recall_core::embedding::{EmbedRequest, EmbedResponse};
use std::io::{Read, Write};
use tracing::{debug, error};

/// Known model dimensions; anything unrecognized gets the default.
/// Overridable through RECALL_EMBED_DIMENSION.
const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("all-mpnet-base-v2", 768),
];

const DEFAULT_DIMENSION: usize = 384;

fn dimension_for(model: &str) -> usize {
    if let Ok(raw) = std::env::var("RECALL_EMBED_DIMENSION") {
        if let Ok(dim) = raw.parse::<usize>() {
            if dim > 0 {
                return dim;
            }
        }
    }
    MODEL_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dim)| *dim)
        .unwrap_or(DEFAULT_DIMENSION)
}

fn respond(response: &EmbedResponse) -> std::io::Result<()> {
    let body = serde_json::to_vec(response)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body)?;
    stdout.flush()
}

fn run() -> i32 {
    let mut input = String::new();
    if let Err(err) = std::io::stdin().lock().read_to_string(&mut input) {
        error!(error = %err, "failed to read request");
        return 1;
    }

    let request: EmbedRequest = match serde_json::from_str(&input) {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, "invalid request body");
            let _ = respond(&EmbedResponse {
                embeddings: None,
                error: Some(format!("invalid request: {err}")),
            });
            return 1;
        }
    };

    if request.texts.is_empty() {
        let _ = respond(&EmbedResponse {
            embeddings: None,
            error: Some("texts must be non-empty".to_string()),
        });
        return 1;
    }

    let dimension = dimension_for(&request.model);
    debug!(model = %request.model, dimension, texts = request.texts.len(), "embedding");

    let embeddings: Vec<Vec<f32>> = request
        .texts
        .iter()
        .map(|text| content_vector(text, dimension))
        .collect();

    match respond(&EmbedResponse {
        embeddings: Some(embeddings),
        error: None,
    }) {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "failed to write response");
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run());
}
