// Test doubles shared by unit tests across modules

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embeddings::EmbeddingProvider;
use crate::model::{ConverseOutput, ConverseRequest, ModelProvider, StopReason};
use crate::{RagError, Result};

const HASH_DIMENSION: usize = 64;

/// Bag-of-words embedder: texts sharing tokens get similar vectors
#[derive(Debug, Default)]
pub struct HashEmbedder {
    embedded: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of texts embedded so far
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

fn token_slot(token: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % HASH_DIMENSION as u64) as usize
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; HASH_DIMENSION];
    for token in text.split_whitespace() {
        vector[token_slot(token)] += 1.0;
    }
    // keeps empty text off the zero vector
    vector[0] += 0.01;
    vector
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedded.fetch_add(1, Ordering::SeqCst);
        Ok(hash_vector(text))
    }
}

/// Embedder whose every call fails
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding("embedding service down".to_string()))
    }
}

/// Embedder that succeeds for a fixed number of texts, then fails
#[derive(Debug)]
pub struct ExhaustingEmbedder {
    remaining: AtomicUsize,
}

impl ExhaustingEmbedder {
    pub fn new(successes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(successes),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ExhaustingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| hash_vector(text))
            .map_err(|_| RagError::Embedding("embedding quota exhausted".to_string()))
    }
}

/// Model provider replaying scripted outputs and recording every request
#[derive(Debug, Default)]
pub struct ScriptedModel {
    outputs: Mutex<VecDeque<Result<ConverseOutput>>>,
    requests: Mutex<Vec<ConverseRequest>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(outputs: Vec<Result<ConverseOutput>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            ..Self::default()
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| Ok(completed(text))).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ConverseRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

pub fn completed(text: &str) -> ConverseOutput {
    ConverseOutput {
        text: text.to_string(),
        stop_reason: StopReason::EndTurn,
    }
}

pub fn guardrail_blocked() -> ConverseOutput {
    ConverseOutput {
        text: "blocked by guardrail".to_string(),
        stop_reason: StopReason::GuardrailIntervened,
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn converse(&self, request: ConverseRequest) -> Result<ConverseOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .unwrap_or_else(|| Err(RagError::Model("no scripted output left".to_string())))
    }
}
