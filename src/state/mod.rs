use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::corpus::{CorpusExtractor, SqlCorpusExtractor};
use crate::embedding::{build_embedder, Embedder};
use crate::index::ChunkingIndexer;
use crate::knowledge::KnowledgeBaseManager;
use crate::llm::{GenerationService, LlmProvider, OpenAiCompatProvider};
use crate::pipeline::AnswerPipeline;
use crate::prompt::PromptAssembler;
use crate::recorder::{InteractionRecorder, InteractionSink, SqlInteractionSink};
use crate::retrieval::CombinedRetriever;

pub mod error;

use error::InitializationError;

/// External collaborators the service is wired from. Production builds them
/// from settings; tests substitute stubs.
pub struct Components {
    pub extractor: Arc<dyn CorpusExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub provider: Arc<dyn LlmProvider>,
    pub sink: Arc<dyn InteractionSink>,
}

impl Components {
    pub fn from_settings(paths: &AppPaths, settings: &Settings) -> Result<Self, InitializationError> {
        let embedder = build_embedder(&settings.embedding)
            .map_err(|e| InitializationError::Embedding(e.into()))?;

        let provider = OpenAiCompatProvider::new(
            &settings.generation.base_url,
            &settings.generation.model,
            settings.generation.api_key.clone(),
            Duration::from_secs(settings.generation.timeout_secs),
        )
        .map_err(|e| InitializationError::Llm(e.into()))?;

        let sink = SqlInteractionSink::connect_lazy(&settings.database.ticketing_url(paths))
            .map_err(|e| InitializationError::Recorder(e.into()))?;

        Ok(Self {
            extractor: Arc::new(SqlCorpusExtractor::from_settings(&settings.database, paths)),
            embedder,
            provider: Arc::new(provider),
            sink: Arc::new(sink),
        })
    }
}

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub knowledge: Arc<KnowledgeBaseManager>,
    pub pipeline: AnswerPipeline,
    pub recorder: Arc<InteractionRecorder>,
}

impl AppState {
    /// Loads configuration, then wires and starts every component.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let raw = config.load_config()?;
        tracing::info!(
            config_path = %config.config_path().display(),
            "Effective configuration: {}",
            config.redact_sensitive_values(&raw)
        );
        let settings = crate::core::config::service::settings_from_value(raw)?;

        let components = Components::from_settings(&paths, &settings)?;
        Self::with_components(paths, settings, components).await
    }

    /// Builds the state around the given components. Loads or builds both
    /// knowledge bases before returning; a failure there is fatal.
    pub async fn with_components(
        paths: Arc<AppPaths>,
        settings: Settings,
        components: Components,
    ) -> Result<Arc<Self>, InitializationError> {
        let indexer = ChunkingIndexer::new(components.embedder, settings.indexing.embed_batch_size);
        let knowledge = Arc::new(KnowledgeBaseManager::new(
            paths.index_dir.clone(),
            components.extractor,
            indexer,
        ));
        knowledge
            .initialize()
            .await
            .map_err(|e| InitializationError::KnowledgeBase(e.into()))?;

        let retriever = Arc::new(CombinedRetriever::for_knowledge_bases(knowledge.clone()));
        let generator = GenerationService::new(
            components.provider,
            Duration::from_secs(settings.generation.timeout_secs),
        );
        let pipeline = AnswerPipeline::new(
            retriever,
            PromptAssembler::new(settings.prompt.max_context_chars),
            generator,
            settings.retrieval.top_k,
        );

        let recorder = Arc::new(InteractionRecorder::spawn(
            components.sink,
            settings.recorder.queue_capacity,
        ));

        Ok(Arc::new(AppState {
            paths,
            settings: Arc::new(settings),
            knowledge,
            pipeline,
            recorder,
        }))
    }
}
