pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use service::{ConfigError, ConfigService};
pub use settings::{EmbeddingProviderKind, Settings};
