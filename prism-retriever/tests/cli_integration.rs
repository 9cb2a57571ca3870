mod common;

use anyhow::Result;
use common::{COLORS, Corpus, analysis_reply, analyzer_section, solid};
use std::process::{Command, Output};

/// Run the `prism` binary built for this test target
fn run_cli(args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_prism"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_components_lists_builtins() -> Result<()> {
    let output = run_cli(&["components"])?;
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("model: fastembed_clip, hashing"));
    assert!(text.contains("indexer: flat, lsh"));
    assert!(text.contains("generator: http, scripted"));
    Ok(())
}

#[test]
fn test_preprocess_then_query_json() -> Result<()> {
    let corpus = Corpus::new()?;
    let config = corpus.write_config(3, "")?.display().to_string();
    let config = config.as_str();

    let output = run_cli(&["preprocess", "--config", config])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("3 images, 3 texts"));

    let output = run_cli(&[
        "query", "--config", config, "--mode", "text2image", "--text", "red car", "--top-k", "2",
        "--format", "json",
    ])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let results: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    let results = results.as_array().expect("result list");
    assert_eq!(results.len(), 2);
    for result in results {
        assert_eq!(result["type"], "image");
        assert!(corpus.image_paths().iter().any(|p| result["path"] == p.as_str()));
    }
    Ok(())
}

#[test]
fn test_unsupported_mode_exits_with_error() -> Result<()> {
    let corpus = Corpus::new()?;
    let config = corpus.write_config(2, "")?.display().to_string();

    let output = run_cli(&[
        "query",
        "--config",
        config.as_str(),
        "--mode",
        "sound2text",
        "--text",
        "x",
    ])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported query type: 'sound2text'"));
    Ok(())
}

#[test]
fn test_analyze_writes_envelope() -> Result<()> {
    let corpus = Corpus::new()?;
    let replies = vec![analysis_reply("a shiny red car", &["paint"])];
    let config = corpus
        .write_config(2, &analyzer_section(&replies))?
        .display()
        .to_string();
    let image = corpus.root().join("query.png");
    solid(COLORS[0].1).save(&image)?;
    let image = image.display().to_string();
    let envelope_path = corpus.root().join("analysis.json");
    let envelope_arg = envelope_path.display().to_string();

    let output = run_cli(&[
        "analyze",
        "--config",
        config.as_str(),
        "--image",
        image.as_str(),
        "--text",
        "what is this",
        "--output",
        envelope_arg.as_str(),
    ])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("Enhanced query: a shiny red car"));

    let envelope: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&envelope_path)?)?;
    assert_eq!(envelope["enhanced_query"], "a shiny red car");
    assert_eq!(envelope["keywords"]["implicit"][0], "paint");
    assert_eq!(envelope["results"].as_array().map(Vec::len), Some(2));
    Ok(())
}
