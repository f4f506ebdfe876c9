use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::error;
use tzun_bucket::{Classification, Classifier};

use super::{load_config, output};
use crate::Cli;

/// Classify titles into buckets.
///
/// Titles are embedded in one batch, then committed one after another in
/// the order given, positional arguments first, then the file.
#[derive(Args)]
pub struct ClassifyCommand {
    /// Titles to classify
    pub titles: Vec<String>,

    /// JSON or YAML file holding an array of titles
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,
}

#[derive(Serialize)]
struct Row {
    title: String,
    #[serde(flatten)]
    result: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ClassifyCommand {
    pub async fn run(&self, cli: &Cli) -> Result<()> {
        let mut titles = self.titles.clone();
        if let Some(path) = &self.file {
            titles.extend(read_titles(Path::new(path))?);
        }
        if titles.is_empty() {
            anyhow::bail!("no titles given (pass them as arguments or with -f)");
        }

        let cfg = load_config(cli)?;
        let classifier = Classifier::new(
            cfg.classifier_config(),
            cfg.build_embedder()?,
            cfg.build_store()?,
        );

        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let results = classifier.classify_batch(&refs).await;

        let mut rows = Vec::with_capacity(titles.len());
        let mut failed = 0;
        for (title, result) in titles.iter().cloned().zip(results) {
            let row = match result {
                Ok(result) => Row {
                    title,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    error!(kind = ?e.kind(), "{e}");
                    failed += 1;
                    Row {
                        title,
                        result: None,
                        error: Some(e.source.to_string()),
                    }
                }
            };
            rows.push(row);
        }

        output(cli).write(&rows)?;
        if failed > 0 {
            anyhow::bail!("{failed} of {} titles failed", rows.len());
        }
        Ok(())
    }
}

fn read_titles(path: &Path) -> Result<Vec<String>> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let titles = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_slice(&data)
            .with_context(|| format!("parse {}", path.display()))?,
        _ => serde_yaml::from_slice(&data)
            .with_context(|| format!("parse {}", path.display()))?,
    };
    Ok(titles)
}
