//! Component registry and factory
//!
//! Maps `(kind, name)` to a constructor taking the component's `params`
//! object. The process-wide registry from [`ComponentRegistry::global`] is
//! filled once at startup and never mutated afterwards; registering
//! components while pipelines are being served is unsupported.

use crate::config::ComponentConfig;
use crate::error::{Result, RetrieverError};
use crate::index::{FlatIndexBuilder, IndexBuilder, IndexParams, LshIndexBuilder};
use futures::FutureExt;
use futures::future::BoxFuture;
use prism_embed::{EmbedConfig, ModelBackend, backends};
use prism_query::{
    Generator, HttpGenerator, HttpGeneratorConfig, ScriptedGenerator, ScriptedGeneratorConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Category of a pluggable component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Model,
    Indexer,
    Generator,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Model,
        ComponentKind::Indexer,
        ComponentKind::Generator,
    ];
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKind::Model => write!(f, "model"),
            ComponentKind::Indexer => write!(f, "indexer"),
            ComponentKind::Generator => write!(f, "generator"),
        }
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "model" | "encoder" => Ok(ComponentKind::Model),
            "indexer" | "index" => Ok(ComponentKind::Indexer),
            "generator" => Ok(ComponentKind::Generator),
            _ => Err(format!(
                "Invalid component kind: '{s}'. Valid values are: model, indexer, generator"
            )),
        }
    }
}

pub type ModelConstructor = fn(Value) -> BoxFuture<'static, anyhow::Result<ModelBackend>>;
pub type IndexerConstructor = fn(Value) -> anyhow::Result<Arc<dyn IndexBuilder>>;
pub type GeneratorConstructor = fn(Value) -> anyhow::Result<Arc<dyn Generator>>;

/// A constructor for one component kind
#[derive(Clone, Copy)]
pub enum Constructor {
    Model(ModelConstructor),
    Indexer(IndexerConstructor),
    Generator(GeneratorConstructor),
}

impl Constructor {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Constructor::Model(_) => ComponentKind::Model,
            Constructor::Indexer(_) => ComponentKind::Indexer,
            Constructor::Generator(_) => ComponentKind::Generator,
        }
    }
}

/// A constructed component
pub enum Component {
    Model(ModelBackend),
    Indexer(Arc<dyn IndexBuilder>),
    Generator(Arc<dyn Generator>),
}

#[derive(Default)]
pub struct ComponentRegistry {
    constructors: HashMap<ComponentKind, BTreeMap<String, Constructor>>,
}

static GLOBAL_REGISTRY: OnceLock<ComponentRegistry> = OnceLock::new();

impl ComponentRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in component
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins = [
            ("fastembed_clip", Constructor::Model(fastembed_clip_model)),
            ("hashing", Constructor::Model(hashing_model)),
            ("lsh", Constructor::Indexer(lsh_indexer)),
            ("flat", Constructor::Indexer(flat_indexer)),
            ("http", Constructor::Generator(http_generator)),
            ("scripted", Constructor::Generator(scripted_generator)),
        ];
        for (name, constructor) in builtins {
            registry.insert(name, constructor);
        }
        registry
    }

    /// Process-wide registry, built with [`Self::with_builtins`] on first use
    pub fn global() -> &'static ComponentRegistry {
        GLOBAL_REGISTRY.get_or_init(Self::with_builtins)
    }

    /// Install a custom registry as the process-wide one.
    ///
    /// Fails once the global registry has been initialized.
    pub fn install_global(registry: ComponentRegistry) -> Result<()> {
        GLOBAL_REGISTRY
            .set(registry)
            .map_err(|_| RetrieverError::config("global component registry is already initialized"))
    }

    fn insert(&mut self, name: &str, constructor: Constructor) {
        self.constructors
            .entry(constructor.kind())
            .or_default()
            .insert(name.to_string(), constructor);
    }

    /// Register a constructor under `kind`, replacing any previous one of that name.
    pub fn register(
        &mut self,
        kind: ComponentKind,
        name: impl Into<String>,
        constructor: Constructor,
    ) -> Result<()> {
        let name = name.into();
        if constructor.kind() != kind {
            return Err(RetrieverError::config(format!(
                "constructor for '{name}' builds a {} component, not a {kind}",
                constructor.kind()
            )));
        }
        tracing::debug!("Registering {} component '{}'", kind, name);
        self.insert(&name, constructor);
        Ok(())
    }

    /// Registered names for a kind, sorted
    pub fn available(&self, kind: ComponentKind) -> Vec<String> {
        self.constructors
            .get(&kind)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lookup(&self, kind: ComponentKind, name: &str) -> Result<Constructor> {
        self.constructors
            .get(&kind)
            .and_then(|names| names.get(name))
            .copied()
            .ok_or_else(|| RetrieverError::ComponentNotFound {
                kind,
                name: name.to_string(),
                available: self.available(kind),
            })
    }

    /// Construct the component `config.name` of `kind`
    pub async fn create(&self, kind: ComponentKind, config: &ComponentConfig) -> Result<Component> {
        let constructor = self.lookup(kind, &config.name)?;
        let wrap = |source: anyhow::Error| RetrieverError::ComponentConstruction {
            kind,
            name: config.name.clone(),
            source,
        };
        tracing::info!("Creating {} component '{}'", kind, config.name);

        let params = config.params.clone();
        Ok(match constructor {
            Constructor::Model(build) => Component::Model(build(params).await.map_err(wrap)?),
            Constructor::Indexer(build) => Component::Indexer(build(params).map_err(wrap)?),
            Constructor::Generator(build) => Component::Generator(build(params).map_err(wrap)?),
        })
    }

    pub async fn create_model(&self, config: &ComponentConfig) -> Result<ModelBackend> {
        match self.create(ComponentKind::Model, config).await? {
            Component::Model(backend) => Ok(backend),
            _ => Err(RetrieverError::config("model constructor returned another kind")),
        }
    }

    pub async fn create_indexer(&self, config: &ComponentConfig) -> Result<Arc<dyn IndexBuilder>> {
        match self.create(ComponentKind::Indexer, config).await? {
            Component::Indexer(builder) => Ok(builder),
            _ => Err(RetrieverError::config("indexer constructor returned another kind")),
        }
    }

    pub async fn create_generator(&self, config: &ComponentConfig) -> Result<Arc<dyn Generator>> {
        match self.create(ComponentKind::Generator, config).await? {
            Component::Generator(generator) => Ok(generator),
            _ => Err(RetrieverError::config("generator constructor returned another kind")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClipParams {
    #[serde(default = "default_model_cache")]
    cache_dir: PathBuf,
    #[serde(default)]
    tokenizer_repo: Option<String>,
    #[serde(default)]
    tokenizer_revision: Option<String>,
    #[serde(default = "default_dim")]
    dim: usize,
}

fn default_model_cache() -> PathBuf {
    PathBuf::from("models")
}

fn default_dim() -> usize {
    prism_embed::config::DEFAULT_DIMENSION
}

#[derive(Debug, Deserialize)]
struct HashingParams {
    #[serde(default = "default_dim")]
    dim: usize,
}

fn fastembed_clip_model(params: Value) -> BoxFuture<'static, anyhow::Result<ModelBackend>> {
    async move {
        let params: ClipParams = serde_json::from_value(params)?;
        let mut config = EmbedConfig::clip_vit_b32(&params.cache_dir);
        config.dimension = params.dim;
        if params.tokenizer_repo.is_some() {
            config.tokenizer_repo = params.tokenizer_repo;
        }
        if params.tokenizer_revision.is_some() {
            config.tokenizer_revision = params.tokenizer_revision;
        }
        Ok(backends::clip_backend(config).await?)
    }
    .boxed()
}

fn hashing_model(params: Value) -> BoxFuture<'static, anyhow::Result<ModelBackend>> {
    async move {
        let params: HashingParams = serde_json::from_value(params)?;
        Ok(backends::hashing_backend(&EmbedConfig::hashing(params.dim))?)
    }
    .boxed()
}

fn lsh_indexer(params: Value) -> anyhow::Result<Arc<dyn IndexBuilder>> {
    let params: IndexParams = serde_json::from_value(params)?;
    Ok(Arc::new(LshIndexBuilder::new(params)?))
}

fn flat_indexer(params: Value) -> anyhow::Result<Arc<dyn IndexBuilder>> {
    let params: IndexParams = serde_json::from_value(params)?;
    Ok(Arc::new(FlatIndexBuilder::new(params)?))
}

fn http_generator(params: Value) -> anyhow::Result<Arc<dyn Generator>> {
    let config: HttpGeneratorConfig = serde_json::from_value(params)?;
    Ok(Arc::new(HttpGenerator::new(config)?))
}

fn scripted_generator(params: Value) -> anyhow::Result<Arc<dyn Generator>> {
    let config: ScriptedGeneratorConfig = serde_json::from_value(params)?;
    Ok(Arc::new(ScriptedGenerator::new(config.replies)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_are_listed_sorted() {
        let registry = ComponentRegistry::with_builtins();
        assert_eq!(
            registry.available(ComponentKind::Model),
            vec!["fastembed_clip", "hashing"]
        );
        assert_eq!(registry.available(ComponentKind::Indexer), vec!["flat", "lsh"]);
        assert_eq!(
            registry.available(ComponentKind::Generator),
            vec!["http", "scripted"]
        );
    }

    #[tokio::test]
    async fn test_unknown_name_enumerates_alternatives() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry
            .create(ComponentKind::Indexer, &ComponentConfig::named("ivf"))
            .await
            .err()
            .unwrap();
        match err {
            RetrieverError::ComponentNotFound {
                kind,
                name,
                available,
            } => {
                assert_eq!(kind, ComponentKind::Indexer);
                assert_eq!(name, "ivf");
                assert_eq!(available, vec!["flat", "lsh"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_kind_reports_no_alternatives() {
        let registry = ComponentRegistry::new();
        let err = registry
            .create_generator(&ComponentConfig::named("http"))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RetrieverError::ComponentNotFound { ref available, .. } if available.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_construction_failure_is_wrapped() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry
            .create_indexer(&ComponentConfig::new("lsh", json!({"dim": 8, "nbits": 0})))
            .await
            .err()
            .unwrap();
        match err {
            RetrieverError::ComponentConstruction { kind, name, source } => {
                assert_eq!(kind, ComponentKind::Indexer);
                assert_eq!(name, "lsh");
                assert!(source.to_string().contains("nbits"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_each_offline_kind() {
        let registry = ComponentRegistry::with_builtins();

        let model = registry
            .create_model(&ComponentConfig::new("hashing", json!({"dim": 16})))
            .await
            .unwrap();
        assert_eq!(model.dimension(), 16);

        let indexer = registry
            .create_indexer(&ComponentConfig::new("flat", json!({"dim": 16})))
            .await
            .unwrap();
        assert_eq!(indexer.dimension(), 16);
        assert_eq!(indexer.name(), "flat");

        let generator = registry
            .create_generator(&ComponentConfig::new("scripted", json!({"replies": ["hi"]})))
            .await
            .unwrap();
        assert_eq!(generator.name(), "scripted");
    }

    fn custom_indexer(_params: Value) -> anyhow::Result<Arc<dyn IndexBuilder>> {
        Ok(Arc::new(FlatIndexBuilder::new(IndexParams {
            dim: 3,
            ..IndexParams::default()
        })?))
    }

    #[tokio::test]
    async fn test_register_custom_component() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentKind::Indexer,
                "exact3",
                Constructor::Indexer(custom_indexer),
            )
            .unwrap();
        assert!(
            registry
                .register(
                    ComponentKind::Model,
                    "wrong",
                    Constructor::Indexer(custom_indexer)
                )
                .is_err()
        );

        let builder = registry
            .create_indexer(&ComponentConfig::named("exact3"))
            .await
            .unwrap();
        assert_eq!(builder.dimension(), 3);
        assert_eq!(registry.available(ComponentKind::Model), Vec::<String>::new());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Indexer".parse::<ComponentKind>().unwrap(), ComponentKind::Indexer);
        assert!("pipeline".parse::<ComponentKind>().is_err());
        assert_eq!(ComponentKind::Generator.to_string(), "generator");
    }

    #[test]
    fn test_global_registry_has_builtins() {
        let registry = ComponentRegistry::global();
        assert!(registry.available(ComponentKind::Model).contains(&"hashing".to_string()));
    }
}
