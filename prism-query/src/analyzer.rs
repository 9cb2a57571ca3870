//! Bounded-retry query analysis
//!
//! Each attempt prompts the generator, extracts and repairs the JSON in its
//! reply and validates it. Schema failures start a new attempt until
//! `max_attempts` is reached; a failing model call ends the loop immediately.
//! Either way the caller always gets a usable query back.

use crate::error::{AnalysisError, Result};
use crate::generator::{GenerationParams, Generator};
use crate::prompt::{DEFAULT_IMAGE_LABEL, build_prompt};
use crate::repair::process_response;
use crate::schema::QueryAnalysis;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Settings for the analysis loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_temperature() -> f32 {
    GenerationParams::default().temperature
}

fn default_max_new_tokens() -> usize {
    GenerationParams::default().max_new_tokens
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            temperature: default_temperature(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AnalysisError::invalid_config(
                "max_attempts must be at least 1",
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(AnalysisError::invalid_config(
                "temperature must be a non-negative number",
            ));
        }
        Ok(())
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_new_tokens: self.max_new_tokens,
        }
    }
}

/// Outcome of analyzing one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysisResult {
    pub success: bool,
    pub original_query: String,
    pub enhanced_query: Option<String>,
    pub explicit_keywords: Vec<String>,
    pub implicit_keywords: Vec<String>,
    pub analysis: Option<QueryAnalysis>,
    /// Last raw generator reply, if any
    pub raw_response: Option<String>,
    /// Repaired JSON text of the last attempt, if extraction succeeded
    pub processed: Option<String>,
    pub error: Option<String>,
    pub attempts: usize,
}

impl QueryAnalysisResult {
    fn failure(original_query: &str, error: String, attempts: usize) -> Self {
        Self {
            success: false,
            original_query: original_query.to_string(),
            enhanced_query: None,
            explicit_keywords: Vec::new(),
            implicit_keywords: Vec::new(),
            analysis: None,
            raw_response: None,
            processed: None,
            error: Some(error),
            attempts,
        }
    }
}

/// Rewrites an image plus text query into an augmented text query
pub struct QueryAnalyzer {
    generator: Arc<dyn Generator>,
    config: AnalyzerConfig,
}

impl std::fmt::Debug for QueryAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryAnalyzer")
            .field("generator", &self.generator.name())
            .field("config", &self.config)
            .finish()
    }
}

impl QueryAnalyzer {
    pub fn new(generator: Arc<dyn Generator>, config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { generator, config })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run the attempt loop for one query.
    ///
    /// `image_label` names the image in the prompt, usually its file name.
    pub async fn analyze_query(
        &self,
        image: &DynamicImage,
        image_label: Option<&str>,
        query_text: &str,
    ) -> QueryAnalysisResult {
        let prompt = build_prompt(image_label.unwrap_or(DEFAULT_IMAGE_LABEL), query_text);
        let params = self.config.generation_params();
        let mut raw_response = None;
        let mut processed = None;
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            let reply = match self.generator.generate(&prompt, image, &params).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!("Query analysis aborted on attempt {}: {}", attempt, err);
                    let mut result = QueryAnalysisResult::failure(
                        query_text,
                        format!("Critical error: {err}"),
                        attempt,
                    );
                    result.raw_response = raw_response;
                    result.processed = processed;
                    return result;
                }
            };

            let outcome = process_response(&reply).and_then(|json| {
                processed = Some(json.clone());
                QueryAnalysis::validate(&json)
            });
            raw_response = Some(reply);

            match outcome {
                Ok(analysis) => {
                    tracing::debug!("Query analysis succeeded on attempt {}", attempt);
                    return QueryAnalysisResult {
                        success: true,
                        original_query: query_text.to_string(),
                        enhanced_query: Some(analysis.augmented_query.clone()),
                        explicit_keywords: analysis.explicit_keywords.clone(),
                        implicit_keywords: analysis.implicit_keywords.clone(),
                        analysis: Some(analysis),
                        raw_response,
                        processed,
                        error: None,
                        attempts: attempt,
                    };
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        "Attempt {} failed for query '{}': {}",
                        attempt,
                        query_text,
                        err
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    let mut result = QueryAnalysisResult::failure(
                        query_text,
                        format!("Critical error: {err}"),
                        attempt,
                    );
                    result.raw_response = raw_response;
                    result.processed = processed;
                    return result;
                }
            }
        }

        let detail = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        let mut result = QueryAnalysisResult::failure(
            query_text,
            format!("Max attempts reached. Last error: {detail}"),
            self.config.max_attempts,
        );
        result.raw_response = raw_response;
        result.processed = processed;
        result
    }

    /// The augmented query on success, otherwise the original text
    pub async fn get_enhanced_query(
        &self,
        image: &DynamicImage,
        image_label: Option<&str>,
        query_text: &str,
    ) -> (String, QueryAnalysisResult) {
        let result = self.analyze_query(image, image_label, query_text).await;
        match &result.enhanced_query {
            Some(enhanced) if result.success => (enhanced.clone(), result),
            _ => {
                tracing::warn!(
                    "Query analysis failed, using original query: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
                (query_text.to_string(), result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};

    const GOOD: &str = "assistant\n\n{\"original_query\": \"why here?\", \"explicit_keywords\": [\"here\"], \"implicit_keywords\": [\"pigeons\"], \"augmented_query\": \"why are pigeons on this bench?\"}";
    const EMPTY_IMPLICIT: &str = "assistant\n\n{\"original_query\": \"why here?\", \"explicit_keywords\": [], \"implicit_keywords\": [], \"augmented_query\": \"x\"}";

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _image: &DynamicImage,
            _params: &GenerationParams,
        ) -> Result<String> {
            Err(anyhow::anyhow!("model crashed").into())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([90, 90, 90])))
    }

    fn analyzer(generator: Arc<dyn Generator>) -> QueryAnalyzer {
        QueryAnalyzer::new(generator, AnalyzerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_well_formed_reply() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD]).unwrap());
        let (query, result) = analyzer(generator.clone())
            .get_enhanced_query(&image(), None, "why here?")
            .await;

        assert_eq!(query, "why are pigeons on this bench?");
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.implicit_keywords, vec!["pigeons"]);
        assert_eq!(result.explicit_keywords, vec!["here"]);
        assert!(result.processed.is_some());
        assert_eq!(generator.call_count(), 1);
        assert!(generator.calls.lock().unwrap()[0].contains("Query: \"why here?\""));
        assert!(generator.calls.lock().unwrap()[0].contains("Image: uploaded_image"));
    }

    #[tokio::test]
    async fn test_image_label_reaches_prompt() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD]).unwrap());
        analyzer(generator.clone())
            .get_enhanced_query(&image(), Some("bench_pigeons.jpg"), "why here?")
            .await;

        let calls = generator.calls.lock().unwrap();
        assert!(calls[0].contains("Image: bench_pigeons.jpg"));
        assert!(!calls[0].contains("uploaded_image"));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let generator =
            Arc::new(ScriptedGenerator::new(["no json at all", EMPTY_IMPLICIT, GOOD]).unwrap());
        let (query, result) = analyzer(generator.clone())
            .get_enhanced_query(&image(), None, "why here?")
            .await;

        assert_eq!(query, "why are pigeons on this bench?");
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_exhaustion_returns_original_query() {
        let generator = Arc::new(ScriptedGenerator::new([EMPTY_IMPLICIT]).unwrap());
        let (query, result) = analyzer(generator.clone())
            .get_enhanced_query(&image(), None, "why here?")
            .await;

        assert_eq!(query, "why here?");
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(generator.call_count(), 3);
        assert!(result.enhanced_query.is_none());
        assert!(result.error.as_deref().unwrap().starts_with("Max attempts reached"));
        assert!(result.error.as_deref().unwrap().contains("implicit_keywords"));
        assert_eq!(result.raw_response.as_deref(), Some(EMPTY_IMPLICIT));
        assert!(logs_contain("Attempt 3 failed"));
    }

    #[tokio::test]
    async fn test_generation_error_is_not_retried() {
        let (query, result) = analyzer(Arc::new(FailingGenerator))
            .get_enhanced_query(&image(), None, "what is this?")
            .await;

        assert_eq!(query, "what is this?");
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert!(result.error.unwrap().starts_with("Critical error"));
    }

    #[tokio::test]
    async fn test_repair_rescues_sloppy_reply() {
        let sloppy = "Answer: {original_query: 'q', explicit_keywords: [], implicit_keywords: ['cat',], augmented_query: 'q about a cat',}";
        let generator = Arc::new(ScriptedGenerator::new([sloppy]).unwrap());
        let (query, result) = analyzer(generator).get_enhanced_query(&image(), None, "q").await;

        assert_eq!(query, "q about a cat");
        assert_eq!(result.implicit_keywords, vec!["cat"]);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = AnalyzerConfig {
            max_attempts: 0,
            ..AnalyzerConfig::default()
        };
        let generator = Arc::new(ScriptedGenerator::new([GOOD]).unwrap());
        assert!(QueryAnalyzer::new(generator, config).is_err());
    }
}
