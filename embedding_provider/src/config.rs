use std::path::PathBuf;

use crate::embedder::OnnxConfig;

/// Default settings for the local ONNX embedder.
#[derive(Debug, Clone, Copy)]
pub struct OnnxDefaults {
    pub model_path: &'static str,
    pub tokenizer_path: &'static str,
    pub runtime_library_path: &'static str,
    pub embedding_dimension: usize,
    pub max_input_tokens: usize,
    pub model_id: &'static str,
}

/// Shared defaults so the service, CLI and tests stay in sync.
pub const ONNX_DEFAULTS: OnnxDefaults = OnnxDefaults {
    model_path: "models/all-MiniLM-L6-v2/model.onnx",
    tokenizer_path: "models/all-MiniLM-L6-v2/tokenizer.json",
    runtime_library_path: "bin/onnxruntime/lib/libonnxruntime.so",
    embedding_dimension: 384,
    max_input_tokens: 512,
    model_id: "all-MiniLM-L6-v2",
};

/// Convenience helper to build an [`OnnxConfig`] from the shared defaults.
/// Asset paths resolve relative to this crate's directory so the defaults
/// work from the workspace root or the crate dir alike.
pub fn default_onnx_config() -> OnnxConfig {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    OnnxConfig {
        model_path: base.join(ONNX_DEFAULTS.model_path),
        tokenizer_path: base.join(ONNX_DEFAULTS.tokenizer_path),
        runtime_library_path: base.join(ONNX_DEFAULTS.runtime_library_path),
        dimension: ONNX_DEFAULTS.embedding_dimension,
        max_input_length: ONNX_DEFAULTS.max_input_tokens,
        model_id: ONNX_DEFAULTS.model_id.into(),
    }
}
