//! Instruction prompt for the analysis model

/// Label used for the image when the caller has no file name for it
pub const DEFAULT_IMAGE_LABEL: &str = "uploaded_image";

const TEMPLATE: &str = r#"You are a multimodal semantic parser. Analyze the user's query and associated image to generate structured retrieval keywords by following these steps:

1. Cross-Modal Entity Recognition:
- Identify explicit entities (nouns/verbs)
- Resolve pronouns like "it" or "this" using image context
- REQUIRED: Extract at least 1 implicit keyword from image context

2. Generate Valid JSON (STRICT FORMAT):
{
  "original_query": "[EXACT_USER_QUERY]",
  "explicit_keywords": ["term1", "term2"],
  "implicit_keywords": ["MUST_HAVE_AT_LEAST_1_ITEM"],  // REQUIRED FIELD
  "augmented_query": "Natural fusion of visual and textual clues"
}

Bad Example (REJECT):
{"implicit_keywords": []}  // EMPTY ARRAY NOT ALLOWED
{"implicit_keywords": "object"}  // STRING INSTEAD OF ARRAY

Good Example:
Image: park bench with pigeons
Query: "Why are they gathered here?"
Output:
{
  "original_query": "Why are they gathered here?",
  "explicit_keywords": ["gathered"],
  "implicit_keywords": ["pigeons", "park bench", "feeding"],
  "augmented_query": "Why are pigeons gathered around this park bench for feeding?"
}

Current Task:
Image: {image_label}
Query: "{query_text}"

Generate valid JSON (IMPLICIT_KEYWORDS MUST BE NON-EMPTY ARRAY):"#;

/// Render the analysis instruction for one query
pub fn build_prompt(image_label: &str, query_text: &str) -> String {
    TEMPLATE
        .replace("{image_label}", image_label)
        .replace("{query_text}", query_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_query_and_label() {
        let prompt = build_prompt(DEFAULT_IMAGE_LABEL, "what breed is this dog?");
        assert!(prompt.contains("Image: uploaded_image"));
        assert!(prompt.contains("Query: \"what breed is this dog?\""));
        assert!(prompt.contains("\"implicit_keywords\": [\"MUST_HAVE_AT_LEAST_1_ITEM\"]"));
        assert!(!prompt.contains("{query_text}"));
    }
}
