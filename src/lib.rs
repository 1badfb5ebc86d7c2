pub mod core;
pub mod corpus;
pub mod embedding;
pub mod index;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod recorder;
pub mod retrieval;
pub mod server;
pub mod state;
