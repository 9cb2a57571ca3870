pub mod corpus;
pub mod pipeline;
pub mod query;
pub mod query_analysis;
pub mod retrieval_pipeline;

pub use corpus::{CacheOutcome, CorpusSnapshot, TextRecord};
pub use pipeline::{Pipeline, PipelineKind, PipelineResponse, build_pipeline, build_pipeline_with};
pub use query::{Query, QueryRequest, QueryType, RetrievalResult};
pub use query_analysis::{AnalysisResponse, Keywords, QueryAnalysisPipeline};
pub use retrieval_pipeline::RetrievalPipeline;
