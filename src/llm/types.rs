use serde::Serialize;

/// Decoding parameters. Fixed for every chat answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 300,
            temperature: 0.7,
            do_sample: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }
}
