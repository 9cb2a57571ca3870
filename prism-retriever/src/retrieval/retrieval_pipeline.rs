//! Encoder + index + retriever over a preprocessed corpus

use super::corpus::{CacheOutcome, CorpusSnapshot, load_or_preprocess};
use super::pipeline::{Pipeline, PipelineKind, PipelineResponse};
use super::query::{Query, QueryRequest, RetrievalResult};
use crate::config::PipelineConfig;
use crate::error::{Result, RetrieverError};
use crate::index::{SearchHits, VectorIndex};
use crate::registry::ComponentRegistry;
use async_trait::async_trait;
use image::DynamicImage;
use prism_embed::{ImageEncoder, JointEncoder, TextEncoder};

/// Four query modes over one image index and one text index
pub struct RetrievalPipeline {
    config: PipelineConfig,
    encoder: JointEncoder,
    snapshot: CorpusSnapshot,
    image_index: Box<dyn VectorIndex>,
    text_index: Box<dyn VectorIndex>,
    cache_outcome: CacheOutcome,
}

impl std::fmt::Debug for RetrievalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("encoder", &self.encoder)
            .field("indexer", &self.image_index.name())
            .field("images", &self.snapshot.image_count())
            .field("texts", &self.snapshot.text_count())
            .field("top_k", &self.config.retriever.top_k)
            .finish()
    }
}

impl RetrievalPipeline {
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_registry(config, ComponentRegistry::global()).await
    }

    /// Construct components, then load or encode the corpus and build both indices.
    pub async fn with_registry(config: PipelineConfig, registry: &ComponentRegistry) -> Result<Self> {
        config.validate()?;

        let backend = registry.create_model(&config.model).await?;
        let indexer = registry.create_indexer(&config.indexer).await?;
        if backend.dimension() != indexer.dimension() {
            return Err(RetrieverError::InvalidDimension {
                expected: indexer.dimension(),
                actual: backend.dimension(),
            });
        }

        let text = TextEncoder::new(backend.text.clone(), config.encoder.window())?;
        let image = ImageEncoder::new(backend.image.clone());
        let encoder = JointEncoder::new(text, image, config.encoder.combination)?;

        let settings = serde_json::to_vec(&(&config.model, &config.encoder))?;
        let (snapshot, cache_outcome) =
            load_or_preprocess(&encoder, &config.data, &settings).await?;

        let image_index = indexer.build(&snapshot.image_vectors)?;
        let text_index = indexer.build(&snapshot.text_vectors)?;

        tracing::info!(
            "Retrieval pipeline ready: {} images, {} texts, {} index, top_k {}",
            snapshot.image_count(),
            snapshot.text_count(),
            indexer.name(),
            config.retriever.top_k
        );
        Ok(Self {
            config,
            encoder,
            snapshot,
            image_index,
            text_index,
            cache_outcome,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &CorpusSnapshot {
        &self.snapshot
    }

    pub fn encoder(&self) -> &JointEncoder {
        &self.encoder
    }

    /// Whether construction was served from the feature cache
    pub fn cache_outcome(&self) -> CacheOutcome {
        self.cache_outcome
    }

    pub fn top_k(&self) -> usize {
        self.config.retriever.top_k
    }

    /// Run one validated query
    pub async fn retrieve(&self, query: &Query) -> Result<Vec<RetrievalResult>> {
        tracing::debug!("Running {} query", query.query_type());
        match query {
            Query::Text2Image { text } => {
                let vector = self.encoder.text().encode(text).await?;
                let hits = self.image_index.search(&vector, self.top_k())?;
                Ok(self.image_results(hits))
            }
            Query::Text2Text { text } => {
                let vector = self.encoder.text().encode(text).await?;
                let hits = self.text_index.search(&vector, self.top_k())?;
                Ok(self.text_results(hits))
            }
            Query::Image2Text { image } => {
                let vector = self.encoder.image().encode(image).await?;
                let hits = self.text_index.search(&vector, self.top_k())?;
                Ok(self.text_results(hits))
            }
            Query::Multimodal2Text { image, text } => self.retrieve_multimodal(image, text).await,
        }
    }

    /// `multimodal2text` without building a [`Query`]
    pub async fn retrieve_multimodal(
        &self,
        image: &DynamicImage,
        text: &str,
    ) -> Result<Vec<RetrievalResult>> {
        let vector = self.encoder.encode(image, text).await?;
        let hits = self.text_index.search(&vector, self.top_k())?;
        Ok(self.text_results(hits))
    }

    fn image_results(&self, (scores, ids): SearchHits) -> Vec<RetrievalResult> {
        scores
            .into_iter()
            .zip(ids)
            .filter_map(|(similarity, id)| {
                let row = checked_row(id, self.snapshot.image_paths.len(), "image")?;
                Some(RetrievalResult::Image {
                    path: self.snapshot.image_paths[row].clone(),
                    similarity,
                })
            })
            .collect()
    }

    fn text_results(&self, (scores, ids): SearchHits) -> Vec<RetrievalResult> {
        scores
            .into_iter()
            .zip(ids)
            .filter_map(|(similarity, id)| {
                let row = checked_row(id, self.snapshot.text_ids.len(), "text")?;
                Some(RetrievalResult::Text {
                    id: self.snapshot.text_ids[row].clone(),
                    content: self.snapshot.text_contents[row].clone(),
                    similarity,
                })
            })
            .collect()
    }
}

/// `id` as a row number, or `None` with a warning when out of range
fn checked_row(id: i64, len: usize, corpus: &str) -> Option<usize> {
    match usize::try_from(id) {
        Ok(row) if row < len => Some(row),
        _ => {
            tracing::warn!(
                "Dropping invalid {} index {} (corpus has {} items)",
                corpus,
                id,
                len
            );
            None
        }
    }
}

#[async_trait]
impl Pipeline for RetrievalPipeline {
    async fn run(&self, request: QueryRequest) -> Result<PipelineResponse> {
        let query = Query::try_from(request)?;
        let results = self.retrieve(&query).await?;
        tracing::info!("{} query returned {} results", query.query_type(), results.len());
        Ok(PipelineResponse::Results(results))
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::Retrieval
    }
}
