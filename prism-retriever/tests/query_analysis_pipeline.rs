mod common;

use anyhow::Result;
use common::{COLORS, Corpus, analysis_reply, analyzer_section, solid};
use prism_query::{AnalyzerConfig, QueryAnalyzer, ScriptedGenerator};
use prism_retriever::retrieval::{
    Pipeline, PipelineKind, PipelineResponse, QueryAnalysisPipeline, QueryRequest,
    RetrievalPipeline, build_pipeline,
};
use prism_retriever::{PipelineConfig, RetrieverError};
use std::sync::Arc;

fn config_with_replies(corpus: &Corpus, replies: &[String]) -> Result<PipelineConfig> {
    Ok(PipelineConfig::from_toml_str(
        &corpus.config_toml(2, &analyzer_section(replies)),
    )?)
}

#[tokio::test]
async fn test_well_formed_reply_enhances_query() -> Result<()> {
    let corpus = Corpus::new()?;
    let replies = vec![analysis_reply("a red sports car on a city street", &["street", "vehicle"])];
    let pipeline = build_pipeline(PipelineKind::QueryAnalysis, config_with_replies(&corpus, &replies)?).await?;

    let response = pipeline
        .run(QueryRequest::multimodal2text(solid(COLORS[0].1), "what is this"))
        .await?;
    let envelope = response.analysis().expect("analysis envelope");

    assert!(envelope.succeeded());
    assert_eq!(
        envelope.enhanced_query.as_deref(),
        Some("a red sports car on a city street")
    );
    assert_eq!(envelope.original_query.as_deref(), Some("what is this"));
    assert_eq!(envelope.keywords.explicit, vec!["car"]);
    assert_eq!(envelope.keywords.implicit, vec!["street", "vehicle"]);
    assert_eq!(envelope.results.len(), 2);
    assert_eq!(envelope.query_analysis.as_ref().map(|a| a.attempts), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_repaired_reply_is_accepted() -> Result<()> {
    let corpus = Corpus::new()?;
    let reply = "assistant\n\n{original_query: 'q', explicit_keywords: ['a',], implicit_keywords: ['b'], augmented_query: 'better q',}".to_string();
    let pipeline = QueryAnalysisPipeline::new(config_with_replies(&corpus, &[reply])?).await?;

    let envelope = pipeline
        .analyze_and_retrieve(&solid(COLORS[1].1), None, "q")
        .await?;
    assert!(envelope.succeeded());
    assert_eq!(envelope.enhanced_query.as_deref(), Some("better q"));
    Ok(())
}

#[tokio::test]
async fn test_image_label_is_sent_to_generator() -> Result<()> {
    let corpus = Corpus::new()?;
    let reply = analysis_reply("a red car parked outside", &["parking"]);
    let generator = Arc::new(ScriptedGenerator::new([reply])?);
    let analyzer = QueryAnalyzer::new(generator.clone(), AnalyzerConfig::default())?;
    let retrieval = RetrievalPipeline::new(corpus.config(2)?).await?;
    let pipeline = QueryAnalysisPipeline::from_parts(analyzer, retrieval);

    let request =
        QueryRequest::multimodal2text(solid(COLORS[0].1), "where is it").with_image_label("driveway.png");
    let response = pipeline.run(request).await?;
    assert!(response.analysis().expect("analysis envelope").succeeded());

    let prompts = generator.calls.lock().expect("call log");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Image: driveway.png"));
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_to_original_query() -> Result<()> {
    let corpus = Corpus::new()?;
    let replies = vec![analysis_reply("never used", &[])];
    let pipeline = QueryAnalysisPipeline::new(config_with_replies(&corpus, &replies)?).await?;
    let image = solid(COLORS[2].1);

    let envelope = pipeline.analyze_and_retrieve(&image, None, "blue water").await?;
    let analysis = envelope.query_analysis.as_ref().expect("analysis result");
    assert!(!analysis.success);
    assert_eq!(analysis.attempts, 3);
    assert!(analysis.error.as_deref().unwrap_or_default().contains("Max attempts"));
    assert_eq!(envelope.enhanced_query, None);
    assert!(envelope.keywords.implicit.is_empty());

    // Same hits as retrieving with the original text directly
    let direct = pipeline
        .retrieval()
        .retrieve_multimodal(&image, "blue water")
        .await?;
    assert_eq!(envelope.results, direct);
    Ok(())
}

#[tokio::test]
async fn test_other_modes_skip_analysis() -> Result<()> {
    let corpus = Corpus::new()?;
    let replies = vec![analysis_reply("unused", &["x"])];
    let pipeline = build_pipeline(PipelineKind::QueryAnalysis, config_with_replies(&corpus, &replies)?).await?;

    let response = pipeline.run(QueryRequest::text2image("red")).await?;
    match response {
        PipelineResponse::Analyzed(envelope) => {
            assert!(envelope.query_analysis.is_none());
            assert_eq!(envelope.results.len(), 2);
        }
        other => panic!("expected an analyzed response, got {other:?}"),
    }

    let err = pipeline.run(QueryRequest::new("bogus")).await.unwrap_err();
    assert!(matches!(err, RetrieverError::UnsupportedQueryType { .. }));
    Ok(())
}

#[tokio::test]
async fn test_missing_analyzer_section_is_config_error() -> Result<()> {
    let corpus = Corpus::new()?;
    let err = QueryAnalysisPipeline::new(corpus.config(2)?)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrieverError::Config { .. }));
    Ok(())
}
