#![allow(dead_code)]

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use prism_retriever::PipelineConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const DIM: usize = 64;

pub const TEXTS: [(&str, &str); 3] = [
    ("1", "a red sports car parked on the street"),
    ("2", "a green forest with tall pine trees"),
    ("3", "a blue ocean under a clear sky"),
];

pub const COLORS: [(&str, [u8; 3]); 3] = [
    ("red.png", [220, 20, 20]),
    ("green.png", [20, 200, 40]),
    ("blue.png", [30, 40, 230]),
];

pub fn solid(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb(color)))
}

/// Three solid-colour PNGs and three JSONL passages
pub struct Corpus {
    pub dir: TempDir,
}

impl Corpus {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images)?;
        for (name, color) in COLORS {
            solid(color).save(images.join(name))?;
        }

        let lines: Vec<String> = TEXTS
            .iter()
            .map(|(id, contents)| serde_json::json!({"id": id, "contents": contents}).to_string())
            .collect();
        std::fs::write(dir.path().join("texts.jsonl"), lines.join("\n"))?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn image_folder(&self) -> PathBuf {
        self.root().join("images")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join("cache")
    }

    pub fn image_paths(&self) -> Vec<String> {
        COLORS
            .iter()
            .map(|(name, _)| self.image_folder().join(name).display().to_string())
            .collect()
    }

    /// TOML for the offline hashing model and an LSH index
    pub fn config_toml(&self, top_k: usize, extra: &str) -> String {
        format!(
            r#"
[model]
type = "hashing"
params = {{ dim = {DIM} }}

[indexer]
type = "lsh"
params = {{ dim = {DIM}, nbits = 256 }}

[encoder]
type = "joint"
params = {{ max_token_length = 77, stride = 64 }}

[retriever]
type = "standard"
params = {{ top_k = {top_k} }}

[data]
image_folder = "{images}"
text_jsonl = "{texts}"
cache_dir = "{cache}"
{extra}
"#,
            images = toml_path(&self.image_folder()),
            texts = toml_path(&self.root().join("texts.jsonl")),
            cache = toml_path(&self.cache_dir()),
        )
    }

    pub fn config(&self, top_k: usize) -> Result<PipelineConfig> {
        Ok(PipelineConfig::from_toml_str(&self.config_toml(top_k, ""))?)
    }

    pub fn write_config(&self, top_k: usize, extra: &str) -> Result<PathBuf> {
        let path = self.root().join("pipeline.toml");
        std::fs::write(&path, self.config_toml(top_k, extra))?;
        Ok(path)
    }
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "\\\\")
}

/// A well-formed analyzer reply in chat-transcript form
pub fn analysis_reply(augmented: &str, implicit: &[&str]) -> String {
    let analysis = serde_json::json!({
        "original_query": "what is this",
        "explicit_keywords": ["car"],
        "implicit_keywords": implicit,
        "augmented_query": augmented,
    });
    format!("user\n\nanalyze\nassistant\n\n{analysis}")
}

/// `[query_analyzer]` section replaying `replies`
pub fn analyzer_section(replies: &[String]) -> String {
    let replies = serde_json::to_string(replies).unwrap_or_default();
    format!(
        "[query_analyzer]\nmax_attempts = 3\n[query_analyzer.generator]\ntype = \"scripted\"\nparams = {{ replies = {replies} }}\n"
    )
}
