//! The uniform `run` contract and pipeline selection

use super::query::{QueryRequest, RetrievalResult};
use super::query_analysis::{AnalysisResponse, QueryAnalysisPipeline};
use super::retrieval_pipeline::RetrievalPipeline;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::registry::ComponentRegistry;
use async_trait::async_trait;
use serde::Serialize;

/// Named pipeline variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Retrieval,
    QueryAnalysis,
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineKind::Retrieval => write!(f, "retrieval"),
            PipelineKind::QueryAnalysis => write!(f, "query_analysis"),
        }
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retrieval" | "retrieve" => Ok(PipelineKind::Retrieval),
            "query_analysis" | "query-analysis" | "analysis" => Ok(PipelineKind::QueryAnalysis),
            _ => Err(format!(
                "Invalid pipeline: '{s}'. Valid values are: retrieval, query_analysis"
            )),
        }
    }
}

/// What a pipeline returns for one request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PipelineResponse {
    /// Ranked hits from the retrieval pipeline
    Results(Vec<RetrievalResult>),
    /// Hits plus the query-analysis envelope
    Analyzed(Box<AnalysisResponse>),
}

impl PipelineResponse {
    pub fn results(&self) -> &[RetrievalResult] {
        match self {
            PipelineResponse::Results(results) => results,
            PipelineResponse::Analyzed(response) => &response.results,
        }
    }

    pub fn into_results(self) -> Vec<RetrievalResult> {
        match self {
            PipelineResponse::Results(results) => results,
            PipelineResponse::Analyzed(response) => response.results,
        }
    }

    pub fn analysis(&self) -> Option<&AnalysisResponse> {
        match self {
            PipelineResponse::Results(_) => None,
            PipelineResponse::Analyzed(response) => Some(response),
        }
    }
}

/// A constructed pipeline. Corpus state is fixed once construction returns;
/// `run` never mutates it.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, request: QueryRequest) -> Result<PipelineResponse>;

    fn kind(&self) -> PipelineKind;
}

/// Build a pipeline from the process-wide component registry
pub async fn build_pipeline(kind: PipelineKind, config: PipelineConfig) -> Result<Box<dyn Pipeline>> {
    build_pipeline_with(kind, config, ComponentRegistry::global()).await
}

pub async fn build_pipeline_with(
    kind: PipelineKind,
    config: PipelineConfig,
    registry: &ComponentRegistry,
) -> Result<Box<dyn Pipeline>> {
    tracing::info!("Building {} pipeline", kind);
    let pipeline: Box<dyn Pipeline> = match kind {
        PipelineKind::Retrieval => Box::new(RetrievalPipeline::with_registry(config, registry).await?),
        PipelineKind::QueryAnalysis => {
            Box::new(QueryAnalysisPipeline::with_registry(config, registry).await?)
        }
    };
    Ok(pipeline)
}
