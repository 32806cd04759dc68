//! Text embedding providers for the hybrid search service.
//!
//! The service treats embedding as a pure function `text -> R^d`. Two
//! providers implement it: a local ONNX model (production) and a seeded
//! hash generator (tests, model-free development). Both normalize input
//! identically, so the same text always maps to the same vector within a
//! process lifetime regardless of caller-side casing or whitespace.

pub mod config;
pub mod embedder;

pub use embedder::{
    Embedder, EmbedderInfo, EmbeddingError, HashEmbedder, OnnxConfig, OnnxEmbedder, ProviderKind,
};
