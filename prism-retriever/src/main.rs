use clap::{Parser, Subcommand};
use prism_retriever::{
    ComponentKind, ComponentRegistry, PipelineConfig,
    retrieval::{
        Pipeline, PipelineKind, PipelineResponse, QueryRequest, RetrievalPipeline,
        RetrievalResult, build_pipeline,
    },
};
use std::path::{Path, PathBuf};
use std::process;
use tracing::Level;

/// Cross-modal retrieval over an image and text corpus.
#[derive(Parser, Debug)]
#[command(name = "prism", author, version, about, long_about = None)]
struct Args {
    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one retrieval query
    Query {
        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// text2image, image2text, text2text or multimodal2text
        #[arg(short, long)]
        mode: String,
        /// Query text
        #[arg(short, long)]
        text: Option<String>,
        /// Query image
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Override retriever.top_k
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Rewrite an image + text query with the generator, then retrieve texts
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        text: String,
        /// Also write the full envelope to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Encode the corpus and write the feature cache
    Preprocess {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List registered components
    Components,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: &Path, top_k: Option<usize>) -> anyhow::Result<PipelineConfig> {
    let config = PipelineConfig::load(path)?;
    Ok(match top_k {
        Some(top_k) => config.with_top_k(top_k),
        None => config,
    })
}

async fn read_image(path: &Path) -> anyhow::Result<image::DynamicImage> {
    Ok(prism_embed::load_image(path).await?)
}

fn print_results(results: &[RetrievalResult]) {
    println!("Found {} results:", results.len());
    for (rank, result) in results.iter().enumerate() {
        match result {
            RetrievalResult::Image { path, similarity } => {
                println!("  {}. [image] {} | similarity: {:.4}", rank + 1, path, similarity);
            }
            RetrievalResult::Text {
                id,
                content,
                similarity,
            } => {
                let preview: String = content.chars().take(80).collect();
                println!(
                    "  {}. [text] {} | similarity: {:.4} | {}",
                    rank + 1,
                    id,
                    similarity,
                    preview
                );
            }
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::Query {
            config,
            mode,
            text,
            image,
            top_k,
            format,
        } => {
            let config = load_config(&config, top_k)?;
            let mut request = QueryRequest::new(mode);
            request.text = text;
            if let Some(path) = image {
                request.image = Some(read_image(&path).await?);
            }

            let pipeline = build_pipeline(PipelineKind::Retrieval, config).await?;
            let response = pipeline.run(request).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                OutputFormat::Summary => print_results(response.results()),
            }
            Ok(())
        }
        Commands::Analyze {
            config,
            image,
            text,
            output,
            top_k,
        } => {
            let config = load_config(&config, top_k)?;
            let label = image
                .file_name()
                .map(|name| name.to_string_lossy().to_string());
            let image = read_image(&image).await?;

            let mut request = QueryRequest::multimodal2text(image, text);
            if let Some(label) = label {
                request = request.with_image_label(label);
            }
            let pipeline = build_pipeline(PipelineKind::QueryAnalysis, config).await?;
            let response = pipeline.run(request).await?;

            if let PipelineResponse::Analyzed(envelope) = &response {
                match &envelope.enhanced_query {
                    Some(enhanced) => println!("Enhanced query: {enhanced}"),
                    None => {
                        let reason = envelope
                            .query_analysis
                            .as_ref()
                            .and_then(|analysis| analysis.error.as_deref())
                            .unwrap_or("not analyzed");
                        println!("Query analysis failed ({reason}); used original query");
                    }
                }
                if !envelope.keywords.explicit.is_empty() {
                    println!("Explicit keywords: {}", envelope.keywords.explicit.join(", "));
                }
                if !envelope.keywords.implicit.is_empty() {
                    println!("Implicit keywords: {}", envelope.keywords.implicit.join(", "));
                }
            }
            print_results(response.results());

            if let Some(path) = output {
                tokio::fs::write(&path, serde_json::to_string_pretty(&response)?).await?;
                println!("Wrote analysis to {}", path.display());
            }
            Ok(())
        }
        Commands::Preprocess { config } => {
            let config = load_config(&config, None)?;
            let cache_dir = config.data.cache_dir.clone();
            let pipeline = RetrievalPipeline::new(config).await?;
            let snapshot = pipeline.snapshot();
            println!(
                "Corpus ready: {} images, {} texts (cache: {}, {:?})",
                snapshot.image_count(),
                snapshot.text_count(),
                cache_dir.display(),
                pipeline.cache_outcome()
            );
            Ok(())
        }
        Commands::Components => {
            let registry = ComponentRegistry::global();
            for kind in ComponentKind::ALL {
                println!("{kind}: {}", registry.available(kind).join(", "));
            }
            Ok(())
        }
    }
}
