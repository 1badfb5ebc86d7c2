use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation model unavailable: {0}")]
    Unavailable(String),

    #[error("generation timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("generation model returned an empty completion")]
    EmptyOutput,
}
