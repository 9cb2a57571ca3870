//! Query rewriting in front of the retrieval pipeline
//!
//! Only `multimodal2text` requests carrying both an image and text are
//! analyzed. Analysis failure never fails the request: retrieval proceeds
//! with the original text and the failure is reported in the envelope.

use super::pipeline::{Pipeline, PipelineKind, PipelineResponse};
use super::query::{Query, QueryRequest, QueryType, RetrievalResult};
use super::retrieval_pipeline::RetrievalPipeline;
use crate::config::PipelineConfig;
use crate::error::{Result, RetrieverError};
use crate::registry::ComponentRegistry;
use async_trait::async_trait;
use image::DynamicImage;
use prism_query::{QueryAnalysisResult, QueryAnalyzer};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Keywords {
    pub explicit: Vec<String>,
    pub implicit: Vec<String>,
}

/// Retrieval hits plus what the analyzer made of the query
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub results: Vec<RetrievalResult>,
    /// `None` when the request was not eligible for analysis
    pub query_analysis: Option<QueryAnalysisResult>,
    pub original_query: Option<String>,
    /// Set only when analysis succeeded
    pub enhanced_query: Option<String>,
    pub keywords: Keywords,
}

impl AnalysisResponse {
    fn passthrough(results: Vec<RetrievalResult>) -> Self {
        Self {
            results,
            query_analysis: None,
            original_query: None,
            enhanced_query: None,
            keywords: Keywords::default(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.query_analysis.as_ref().is_some_and(|analysis| analysis.success)
    }
}

pub struct QueryAnalysisPipeline {
    analyzer: QueryAnalyzer,
    retrieval: RetrievalPipeline,
}

impl std::fmt::Debug for QueryAnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryAnalysisPipeline")
            .field("analyzer", &self.analyzer)
            .field("retrieval", &self.retrieval)
            .finish()
    }
}

impl QueryAnalysisPipeline {
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_registry(config, ComponentRegistry::global()).await
    }

    /// Requires a `[query_analyzer]` section naming the generator
    pub async fn with_registry(config: PipelineConfig, registry: &ComponentRegistry) -> Result<Self> {
        let section = config.query_analyzer.clone().ok_or_else(|| {
            RetrieverError::config("query_analysis pipeline requires a [query_analyzer] section")
        })?;
        let generator = registry.create_generator(&section.generator).await?;
        let analyzer = QueryAnalyzer::new(generator, section.analyzer)?;
        let retrieval = RetrievalPipeline::with_registry(config, registry).await?;
        Ok(Self::from_parts(analyzer, retrieval))
    }

    pub fn from_parts(analyzer: QueryAnalyzer, retrieval: RetrievalPipeline) -> Self {
        Self {
            analyzer,
            retrieval,
        }
    }

    pub fn retrieval(&self) -> &RetrievalPipeline {
        &self.retrieval
    }

    /// Rewrite the query, then retrieve texts with the rewritten (or original) text
    pub async fn analyze_and_retrieve(
        &self,
        image: &DynamicImage,
        image_label: Option<&str>,
        query_text: &str,
    ) -> Result<AnalysisResponse> {
        tracing::info!("Analyzing query: '{}'", query_text);
        let (query, analysis) = self
            .analyzer
            .get_enhanced_query(image, image_label, query_text)
            .await;

        if analysis.success {
            tracing::info!("Retrieving with enhanced query: '{}'", query);
        } else {
            tracing::info!("Retrieving with original query: '{}'", query_text);
        }
        let results = self.retrieval.retrieve_multimodal(image, &query).await?;

        let (enhanced_query, keywords) = if analysis.success {
            (
                Some(query),
                Keywords {
                    explicit: analysis.explicit_keywords.clone(),
                    implicit: analysis.implicit_keywords.clone(),
                },
            )
        } else {
            (None, Keywords::default())
        };

        Ok(AnalysisResponse {
            results,
            query_analysis: Some(analysis),
            original_query: Some(query_text.to_string()),
            enhanced_query,
            keywords,
        })
    }
}

#[async_trait]
impl Pipeline for QueryAnalysisPipeline {
    async fn run(&self, request: QueryRequest) -> Result<PipelineResponse> {
        let multimodal = request.query_type == QueryType::Multimodal2Text.to_string();
        let response = if let (true, Some(image), Some(text)) =
            (multimodal, &request.image, &request.text)
        {
            self.analyze_and_retrieve(image, request.image_label.as_deref(), text)
                .await?
        } else {
            tracing::info!(
                "Skipping query analysis for {} request",
                request.query_type
            );
            let query = Query::try_from(request)?;
            AnalysisResponse::passthrough(self.retrieval.retrieve(&query).await?)
        };
        Ok(PipelineResponse::Analyzed(Box::new(response)))
    }

    fn kind(&self) -> PipelineKind {
        PipelineKind::QueryAnalysis
    }
}
